//! Public encode operations and their option set.

use crate::alpha::{AlphaCompression, AlphaFilter};
use crate::error::{LossyError, WebpError};
use crate::riff::Muxer;
use crate::vp8l::encoder::{Vp8lConfig, Vp8lEncoder};

/// Option bundles tuned for common content classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
	/// General-purpose defaults.
	#[default]
	Default,
	/// Outdoor photographs.
	Picture,
	/// Indoor / close-up photographs.
	Photo,
	/// Line art and drawings with hard edges.
	Drawing,
	/// Small palette-heavy icons.
	Icon,
	/// Rendered text.
	Text,
}

/// Alpha-channel filtering effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaFiltering {
	/// Store the plane unfiltered.
	None,
	/// One cheap filter.
	#[default]
	Fast,
	/// Try every filter and keep the smallest.
	Best,
}

impl AlphaFiltering {
	/// The concrete filter choice handed to the alpha codec; `None` means
	/// "search".
	pub fn filter_choice(self) -> Option<AlphaFilter> {
		match self {
			Self::None => Some(AlphaFilter::None),
			Self::Fast => Some(AlphaFilter::Horizontal),
			Self::Best => None,
		}
	}
}

/// Everything an encode call can be asked to do.
#[derive(Debug, Clone, Copy)]
pub struct EncoderOptions {
	/// Lossless coding; the only built-in pixel path.
	pub lossless: bool,
	/// Quality 0..=100.
	pub quality: u8,
	/// Effort 0..=6.
	pub method: u8,
	/// Preserve RGB under fully transparent pixels (lossless only).
	pub exact: bool,
	/// Near-lossless preprocessing quality; 100 disables it.
	pub near_lossless: u8,
	/// ALPH chunk compression for lossy-with-alpha assembly.
	pub alpha_compression: AlphaCompression,
	/// ALPH chunk filtering effort.
	pub alpha_filtering: AlphaFiltering,
	/// ALPH plane quality (lossy alpha); accepted for API parity.
	pub alpha_quality: u8,
	/// Sharp RGB→YUV conversion (lossy only); accepted for API parity.
	pub use_sharp_yuv: bool,
}

impl Default for EncoderOptions {
	fn default() -> Self {
		Self {
			lossless: true,
			quality: 75,
			method: 4,
			exact: false,
			near_lossless: 100,
			alpha_compression: AlphaCompression::Lossless,
			alpha_filtering: AlphaFiltering::Fast,
			alpha_quality: 100,
			use_sharp_yuv: false,
		}
	}
}

impl EncoderOptions {
	/// Builds options from a content preset.
	pub fn preset(preset: Preset) -> Self {
		let base = Self::default();
		match preset {
			Preset::Default => base,
			Preset::Picture => Self {
				quality: 80,
				..base
			},
			Preset::Photo => Self {
				quality: 75,
				method: 4,
				..base
			},
			Preset::Drawing => Self {
				quality: 85,
				method: 5,
				..base
			},
			Preset::Icon => Self {
				quality: 90,
				method: 6,
				exact: true,
				..base
			},
			Preset::Text => Self {
				quality: 90,
				method: 6,
				..base
			},
		}
	}

	fn vp8l_config(&self) -> Vp8lConfig {
		Vp8lConfig {
			quality: self.quality.min(100),
			method: self.method.min(6),
			exact: self.exact,
			near_lossless: self.near_lossless.min(100),
		}
	}
}

/// Reusable encoder handle; owns the lossless encoder's scratch buffers.
#[derive(Debug, Default)]
pub struct WebpEncoder {
	lossless: Vp8lEncoder,
}

impl WebpEncoder {
	/// Creates an encoder handle.
	pub fn new() -> Self {
		Self::default()
	}

	/// Encodes `argb` into a complete WebP file.
	pub fn encode(
		&mut self,
		argb: &[u32],
		width: u32,
		height: u32,
		options: &EncoderOptions,
	) -> Result<Vec<u8>, WebpError> {
		self.encode_with_metadata(argb, width, height, options, &Metadata::default())
	}

	/// Encodes with optional ICC/EXIF/XMP payloads attached.
	pub fn encode_with_metadata(
		&mut self,
		argb: &[u32],
		width: u32,
		height: u32,
		options: &EncoderOptions,
		metadata: &Metadata,
	) -> Result<Vec<u8>, WebpError> {
		if !options.lossless {
			return Err(LossyError::NoVp8Encoder.into());
		}
		let payload = self.lossless.encode(argb, width, height, &options.vp8l_config())?;
		let has_alpha = argb.iter().any(|&pixel| pixel >> 24 != 0xFF);

		let mut muxer = Muxer::new();
		muxer.set_lossless_image(&payload, width, height, has_alpha);
		if let Some(iccp) = &metadata.iccp {
			muxer.set_iccp(iccp);
		}
		if let Some(exif) = &metadata.exif {
			muxer.set_exif(exif);
		}
		if let Some(xmp) = &metadata.xmp {
			muxer.set_xmp(xmp);
		}
		Ok(muxer.finish()?)
	}
}

/// Optional metadata payloads carried through the container untouched.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
	/// ICC color profile.
	pub iccp: Option<Vec<u8>>,
	/// EXIF block.
	pub exif: Option<Vec<u8>>,
	/// XMP block.
	pub xmp: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::decoder::{Image, WebpDecoder};
	use crate::error::MuxError;
	use crate::vp8l::make_argb;

	#[test]
	fn test_encode_decode_roundtrip() {
		let argb: Vec<u32> = (0..64u32)
			.map(|i| make_argb(255, (i * 4) as u8, (255 - i) as u8, (i * i % 256) as u8))
			.collect();
		let mut encoder = WebpEncoder::new();
		let file = encoder.encode(&argb, 8, 8, &EncoderOptions::default()).unwrap();
		let mut decoder = WebpDecoder::new();
		match decoder.decode(&file).unwrap() {
			Image::Argb(image) => assert_eq!(image.pixels, argb),
			Image::Yuv { .. } => panic!("lossless file"),
		}
	}

	#[test]
	fn test_lossy_encode_unsupported() {
		let mut encoder = WebpEncoder::new();
		let options = EncoderOptions {
			lossless: false,
			..EncoderOptions::default()
		};
		assert!(matches!(
			encoder.encode(&[0xFF00_0000; 4], 2, 2, &options),
			Err(WebpError::Lossy(LossyError::NoVp8Encoder))
		));
	}

	#[test]
	fn test_oversized_rejected_before_work() {
		let mut encoder = WebpEncoder::new();
		let err = encoder
			.encode(&[0u32; 16384], 16384, 1, &EncoderOptions::default())
			.unwrap_err();
		assert!(matches!(
			err,
			WebpError::Mux(MuxError::DimensionsTooLarge { .. })
		));
	}

	#[test]
	fn test_metadata_survives_roundtrip() {
		let argb = vec![make_argb(255, 5, 6, 7); 4];
		let metadata = Metadata {
			iccp: Some(b"fake icc".to_vec()),
			exif: Some(b"fake exif".to_vec()),
			xmp: Some(b"<x:xmpmeta/>".to_vec()),
		};
		let mut encoder = WebpEncoder::new();
		let file = encoder
			.encode_with_metadata(&argb, 2, 2, &EncoderOptions::default(), &metadata)
			.unwrap();
		let demuxer = crate::riff::Demuxer::from_bytes(&file).unwrap();
		assert_eq!(demuxer.iccp(), Some(&b"fake icc"[..]));
		assert_eq!(demuxer.exif(), Some(&b"fake exif"[..]));
		assert_eq!(demuxer.xmp(), Some(&b"<x:xmpmeta/>"[..]));
		let mut decoder = WebpDecoder::new();
		match decoder.decode(&file).unwrap() {
			Image::Argb(image) => assert_eq!(image.pixels, argb),
			Image::Yuv { .. } => panic!("lossless file"),
		}
	}

	#[test]
	fn test_presets_all_roundtrip() {
		let argb: Vec<u32> = (0..100u32).map(|i| make_argb(255, 0, (i % 5 * 50) as u8, 0)).collect();
		for preset in [
			Preset::Default,
			Preset::Picture,
			Preset::Photo,
			Preset::Drawing,
			Preset::Icon,
			Preset::Text,
		] {
			let options = EncoderOptions::preset(preset);
			let mut encoder = WebpEncoder::new();
			let file = encoder.encode(&argb, 10, 10, &options).unwrap();
			let mut decoder = WebpDecoder::new();
			match decoder.decode(&file).unwrap() {
				Image::Argb(image) => assert_eq!(image.pixels, argb, "{preset:?}"),
				Image::Yuv { .. } => panic!("lossless file"),
			}
		}
	}
}
