//! Public decode operations: still images, feature probing, animations.

use crate::alpha;
use crate::anim::{AnimationFrame, Compositor};
use crate::error::{LossyError, WebpError};
use crate::riff::{Demuxer, Features, FrameView};
use crate::vp8::{Vp8BitstreamDecoder, YuvImage};
use crate::vp8l::decoder::Vp8lDecoder;

/// Pixel layout a decode will produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorModel {
	/// Interleaved RGBA with straight alpha (delivered as packed ARGB).
	Nrgba,
	/// Planar YCbCr 4:2:0, the native layout of lossy frames without alpha.
	Ycbcr420,
}

/// A decoded ARGB image.
#[derive(Debug, Clone)]
pub struct ArgbImage {
	/// Width in pixels.
	pub width: u32,
	/// Height in pixels.
	pub height: u32,
	/// Packed ARGB pixels, row-major.
	pub pixels: Vec<u32>,
}

/// Decode output: lossless and alpha-bearing frames come back as ARGB,
/// plain lossy frames in their native YCbCr planes.
#[derive(Debug, Clone)]
pub enum Image {
	/// Packed ARGB pixels.
	Argb(ArgbImage),
	/// Y/U/V planes straight from the VP8 collaborator, with the decoded
	/// alpha plane when an `ALPH` chunk was present.
	Yuv {
		/// The lossy frame.
		frame: YuvImage,
		/// Straight alpha plane, `width * height` bytes.
		alpha: Option<Vec<u8>>,
	},
}

/// Reusable decoder handle.
///
/// Owns the lossless decoder's table slab and buffers; repeated decodes
/// through one handle reuse them. Reuse is single-threaded per handle.
#[derive(Default)]
pub struct WebpDecoder {
	lossless: Vp8lDecoder,
	vp8: Option<Box<dyn Vp8BitstreamDecoder>>,
}

impl std::fmt::Debug for WebpDecoder {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WebpDecoder")
			.field("has_vp8_decoder", &self.vp8.is_some())
			.finish()
	}
}

impl WebpDecoder {
	/// Creates a decoder without a VP8 pixel collaborator.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an external VP8 bitstream decoder for lossy pixel data.
	pub fn set_vp8_decoder(&mut self, decoder: Box<dyn Vp8BitstreamDecoder>) {
		self.vp8 = Some(decoder);
	}

	/// Decodes the (first) frame of a WebP file.
	pub fn decode(&mut self, data: &[u8]) -> Result<Image, WebpError> {
		let demuxer = Demuxer::from_bytes(data)?;
		let features = *demuxer.features();
		let frame = &demuxer.frames()[0];

		if features.has_animation {
			// The first frame composited onto the canvas.
			let pixels = self.decode_frame_argb(frame)?;
			let mut compositor =
				Compositor::new(features.width, features.height, features.background_color);
			let canvas = compositor.render(&frame.header, &pixels).to_vec();
			return Ok(Image::Argb(ArgbImage {
				width: features.width,
				height: features.height,
				pixels: canvas,
			}));
		}

		if frame.is_lossless {
			let image = self.lossless.decode(frame.bitstream)?;
			return Ok(Image::Argb(ArgbImage {
				width: image.width,
				height: image.height,
				pixels: image.pixels,
			}));
		}

		let vp8 = self.vp8.as_mut().ok_or(LossyError::NoVp8Decoder)?;
		let yuv = vp8.decode_frame(frame.bitstream)?;
		let alpha = match frame.alpha {
			Some(payload) => Some(alpha::decode_alpha(
				payload,
				yuv.width,
				yuv.height,
				&mut self.lossless,
			)?),
			None => None,
		};
		Ok(Image::Yuv {
			frame: yuv,
			alpha,
		})
	}

	/// Decodes every frame of an animation, composited onto the canvas.
	///
	/// Still images come back as a single-frame sequence.
	pub fn decode_animation(
		&mut self,
		data: &[u8],
	) -> Result<(Vec<AnimationFrame>, Features), WebpError> {
		let demuxer = Demuxer::from_bytes(data)?;
		let features = *demuxer.features();
		let mut compositor =
			Compositor::new(features.width, features.height, features.background_color);
		let mut frames = Vec::with_capacity(demuxer.frames().len());
		for frame in demuxer.frames() {
			let pixels = self.decode_frame_argb(frame)?;
			let canvas = compositor.render(&frame.header, &pixels).to_vec();
			frames.push(AnimationFrame {
				pixels: canvas,
				duration_ms: frame.header.duration_ms,
			});
		}
		Ok((frames, features))
	}

	/// Decodes one frame's rectangle to ARGB. Lossy frames need both a VP8
	/// collaborator and color conversion, which live outside this crate.
	fn decode_frame_argb(&mut self, frame: &FrameView<'_>) -> Result<Vec<u32>, WebpError> {
		if !frame.is_lossless {
			return Err(LossyError::NoVp8Decoder.into());
		}
		Ok(self.lossless.decode(frame.bitstream)?.pixels)
	}
}

/// Reports a file's dimensions and the color model a decode would produce.
pub fn decode_config(data: &[u8]) -> Result<(u32, u32, ColorModel), WebpError> {
	let demuxer = Demuxer::from_bytes(data)?;
	let features = demuxer.features();
	let lossy_still = !features.has_animation
		&& demuxer.frames().first().is_some_and(|frame| !frame.is_lossless);
	let model = if lossy_still && !features.has_alpha {
		ColorModel::Ycbcr420
	} else {
		ColorModel::Nrgba
	};
	Ok((features.width, features.height, model))
}

/// Parses container-level features without touching pixel data.
pub fn get_features(data: &[u8]) -> Result<Features, WebpError> {
	Ok(*Demuxer::from_bytes(data)?.features())
}
