//! Prelude module for `webpine_internal`.
//!
//! This module provides a convenient way to import commonly used types,
//! traits, and constants.
//!
//! # Examples
//!
//! ```no_run
//! use webpine_internal::prelude::*;
//!
//! # fn main() -> Result<(), WebpError> {
//! let data = std::fs::read("animation.webp").map_err(WebpError::from)?;
//! let mut decoder = WebpDecoder::new();
//! let (frames, features) = decoder.decode_animation(&data)?;
//! println!("{} frames, loops {}", frames.len(), features.loop_count);
//! # Ok(())
//! # }
//! ```

#[doc(inline)]
pub use webpine_codec::prelude::*;

// Re-export the codec crate for advanced usage
#[doc(inline)]
pub use webpine_codec;
