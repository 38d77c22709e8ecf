//! This crate provides the WebP container and bitstream codecs for the
//! `webpine-rs` project.
//!
//! # Layers
//!
//! - **RIFF**: chunk-level parsing and building of still and animated files
//! - **VP8L**: the complete lossless decoder and encoder
//! - **VP8**: lossy frame headers plus the trait an external pixel decoder
//!   plugs into
//! - **ALPH**: the alpha-plane codec for lossy frames
//! - **Animation**: frame compositing over a persistent canvas
//!
//! # Examples
//!
//! ```rust
//! use webpine_codec::{EncoderOptions, Image, WebpDecoder, WebpEncoder};
//!
//! let pixels = vec![0xFF80_4020u32; 16 * 16];
//! let mut encoder = WebpEncoder::new();
//! let file = encoder.encode(&pixels, 16, 16, &EncoderOptions::default())?;
//!
//! let mut decoder = WebpDecoder::new();
//! match decoder.decode(&file)? {
//! 	Image::Argb(image) => assert_eq!(image.pixels, pixels),
//! 	Image::Yuv { .. } => unreachable!("lossless input"),
//! }
//! # Ok::<(), webpine_codec::WebpError>(())
//! ```

pub mod alpha;
pub mod anim;
pub mod bitio;
pub mod error;
pub mod riff;
pub mod vp8;
pub mod vp8l;

mod decoder;
mod encoder;

/// `use webpine_codec::prelude::*;` to import commonly used items.
pub mod prelude;

// Re-export commonly used types at the crate root for convenience.
pub use decoder::{ArgbImage, ColorModel, Image, WebpDecoder, decode_config, get_features};
pub use encoder::{AlphaFiltering, EncoderOptions, Metadata, Preset, WebpEncoder};
pub use error::{LosslessError, LossyError, MuxError, RiffError, WebpError};
pub use riff::{Blend, Demuxer, Dispose, Features, FrameView, ImageKind, Muxer, MAX_DIMENSION};

/// Decodes the (first) frame of a WebP file with a one-shot handle.
pub fn decode(data: &[u8]) -> Result<Image, WebpError> {
	WebpDecoder::new().decode(data)
}

/// Encodes packed ARGB pixels into a lossless WebP file.
pub fn encode(
	argb: &[u32],
	width: u32,
	height: u32,
	options: &EncoderOptions,
) -> Result<Vec<u8>, WebpError> {
	WebpEncoder::new().encode(argb, width, height, options)
}
