//! Internal crate for `webpine-rs`.
//!
//! This module is separated into its own crate so the facade the root
//! package re-exports stays a single dependency edge, and should not be
//! used directly.
//!
//! # Examples
//!
//! ```rust
//! use webpine_internal::prelude::*;
//!
//! // All commonly used types are available
//! let decoder = WebpDecoder::new();
//! let options = EncoderOptions::default();
//! # let _ = (decoder, options);
//! ```

/// `use webpine_internal::prelude::*;` to import commonly used items.
pub mod prelude;

// Re-export webpine_codec for convenience
pub use webpine_codec;
