//! Prelude module for `webpine_codec`.
//!
//! # Examples
//!
//! ```no_run
//! use webpine_codec::prelude::*;
//!
//! # fn main() -> Result<(), WebpError> {
//! let data = std::fs::read("picture.webp").map_err(WebpError::from)?;
//! let features = get_features(&data)?;
//! println!("{}x{}", features.width, features.height);
//! # Ok(())
//! # }
//! ```

// Decode surface
#[doc(inline)]
pub use crate::{
	// Errors
	LosslessError,
	LossyError,
	MuxError,
	RiffError,

	WebpError,

	// Decode types
	ArgbImage,
	ColorModel,
	Image,
	WebpDecoder,

	decode,
	decode_config,
	get_features,
};

// Encode surface
#[doc(inline)]
pub use crate::{
	AlphaFiltering, EncoderOptions, Metadata, Preset, WebpEncoder, encode,
};

// Container types
#[doc(inline)]
pub use crate::riff::{AnmfHeader, Blend, Demuxer, Dispose, Features, FrameView, Muxer};

// Animation types
#[doc(inline)]
pub use crate::anim::{AnimationEncoder, AnimationFrame, Compositor, FrameOptions};

// Lossy collaborator seam
#[doc(inline)]
pub use crate::vp8::{Vp8BitstreamDecoder, YuvImage};
