//! RIFF building: assembles still and animated WebP files.

use crate::error::MuxError;

use super::{
	AnmfHeader, FourCc, CHUNK_HEADER_SIZE, MAX_CANVAS_AREA, MAX_DIMENSION, MAX_DURATION,
	RIFF_HEADER_SIZE, write_le24, vp8x_flags,
};

#[derive(Debug)]
struct StillImage {
	bitstream: Vec<u8>,
	is_lossless: bool,
	width: u32,
	height: u32,
	has_alpha: bool,
	alpha: Option<Vec<u8>>,
}

#[derive(Debug)]
struct MuxFrame {
	header: AnmfHeader,
	bitstream: Vec<u8>,
	is_lossless: bool,
	alpha: Option<Vec<u8>>,
	has_alpha: bool,
}

/// Assembles WebP files chunk by chunk.
///
/// The builder accepts already-encoded bitstream payloads and emits chunks
/// in canonical order: `VP8X`, `ICCP`, `ANIM`, `ANMF`… (or the single image
/// chunks), `EXIF`, `XMP `. A plain still image without extended features
/// collapses to the simple `RIFF` + `VP8 `/`VP8L` form.
#[derive(Debug, Default)]
pub struct Muxer {
	canvas: Option<(u32, u32)>,
	image: Option<StillImage>,
	frames: Vec<MuxFrame>,
	loop_count: u16,
	background_color: u32,
	iccp: Option<Vec<u8>>,
	exif: Option<Vec<u8>>,
	xmp: Option<Vec<u8>>,
}

impl Muxer {
	/// Creates an empty builder.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the canvas size; required for animations, optional for stills.
	pub fn set_canvas(&mut self, width: u32, height: u32) -> Result<(), MuxError> {
		check_dimensions(width, height)?;
		self.canvas = Some((width, height));
		Ok(())
	}

	/// Sets the still image to a VP8L payload.
	pub fn set_lossless_image(&mut self, bitstream: &[u8], width: u32, height: u32, has_alpha: bool) {
		self.image = Some(StillImage {
			bitstream: bitstream.to_vec(),
			is_lossless: true,
			width,
			height,
			has_alpha,
			alpha: None,
		});
	}

	/// Sets the still image to a VP8 payload with an optional alpha chunk.
	pub fn set_lossy_image(
		&mut self,
		bitstream: &[u8],
		width: u32,
		height: u32,
		alpha: Option<&[u8]>,
	) {
		self.image = Some(StillImage {
			bitstream: bitstream.to_vec(),
			is_lossless: false,
			width,
			height,
			has_alpha: alpha.is_some(),
			alpha: alpha.map(<[u8]>::to_vec),
		});
	}

	/// Attaches an ICC profile.
	pub fn set_iccp(&mut self, payload: &[u8]) {
		self.iccp = Some(payload.to_vec());
	}

	/// Attaches EXIF metadata.
	pub fn set_exif(&mut self, payload: &[u8]) {
		self.exif = Some(payload.to_vec());
	}

	/// Attaches XMP metadata.
	pub fn set_xmp(&mut self, payload: &[u8]) {
		self.xmp = Some(payload.to_vec());
	}

	/// Sets the animation loop count; values above 65535 are clamped.
	pub fn set_loop_count(&mut self, loop_count: u32) {
		self.loop_count = loop_count.min(u32::from(u16::MAX)) as u16;
	}

	/// Sets the animation background color (BGRA byte order as stored).
	pub fn set_background_color(&mut self, color: u32) {
		self.background_color = color;
	}

	/// Appends an animation frame.
	///
	/// Durations outside the 24-bit range are clamped; offsets must be even
	/// and the frame rectangle must fit inside the canvas.
	pub fn push_frame(
		&mut self,
		mut header: AnmfHeader,
		bitstream: &[u8],
		is_lossless: bool,
		alpha: Option<&[u8]>,
		has_alpha: bool,
	) -> Result<(), MuxError> {
		if header.offset_x % 2 != 0 || header.offset_y % 2 != 0 {
			return Err(MuxError::OddFrameOffset {
				x: header.offset_x,
				y: header.offset_y,
			});
		}
		check_dimensions(header.width, header.height)?;
		if let Some((canvas_width, canvas_height)) = self.canvas {
			if u64::from(header.offset_x) + u64::from(header.width) > u64::from(canvas_width)
				|| u64::from(header.offset_y) + u64::from(header.height)
					> u64::from(canvas_height)
			{
				return Err(MuxError::FrameOutsideCanvas);
			}
		}
		header.duration_ms = header.duration_ms.min(MAX_DURATION);
		self.frames.push(MuxFrame {
			header,
			bitstream: bitstream.to_vec(),
			is_lossless,
			alpha: alpha.map(<[u8]>::to_vec),
			has_alpha,
		});
		Ok(())
	}

	/// Serializes the file.
	pub fn finish(&self) -> Result<Vec<u8>, MuxError> {
		let animated = !self.frames.is_empty();
		if !animated && self.image.is_none() {
			return Err(MuxError::EmptyAnimation);
		}

		let (canvas_width, canvas_height) = match self.canvas {
			Some(canvas) => canvas,
			None => match &self.image {
				Some(image) => (image.width, image.height),
				None => return Err(MuxError::EmptyAnimation),
			},
		};
		check_dimensions(canvas_width, canvas_height)?;

		let has_alpha = self.image.as_ref().is_some_and(|image| image.has_alpha)
			|| self.frames.iter().any(|frame| frame.has_alpha);
		let has_metadata = self.iccp.is_some() || self.exif.is_some() || self.xmp.is_some();
		let lossy_alpha_chunk = self
			.image
			.as_ref()
			.is_some_and(|image| image.alpha.is_some());
		let need_vp8x = animated || has_metadata || lossy_alpha_chunk;

		let mut body = Vec::new();
		if need_vp8x {
			let mut flags = 0u8;
			if self.iccp.is_some() {
				flags |= vp8x_flags::ICCP;
			}
			if has_alpha {
				flags |= vp8x_flags::ALPHA;
			}
			if self.exif.is_some() {
				flags |= vp8x_flags::EXIF;
			}
			if self.xmp.is_some() {
				flags |= vp8x_flags::XMP;
			}
			if animated {
				flags |= vp8x_flags::ANIMATION;
			}
			let mut vp8x = [0u8; 10];
			vp8x[0] = flags;
			write_le24(&mut vp8x[4..7], canvas_width - 1);
			write_le24(&mut vp8x[7..10], canvas_height - 1);
			push_chunk(&mut body, FourCc::VP8X, &vp8x);

			if let Some(iccp) = &self.iccp {
				push_chunk(&mut body, FourCc::ICCP, iccp);
			}
			if animated {
				let mut anim = [0u8; 6];
				anim[0..4].copy_from_slice(&self.background_color.to_le_bytes());
				anim[4..6].copy_from_slice(&self.loop_count.to_le_bytes());
				push_chunk(&mut body, FourCc::ANIM, &anim);
				for frame in &self.frames {
					push_chunk(&mut body, FourCc::ANMF, &serialize_frame(frame));
				}
			} else if let Some(image) = &self.image {
				if let Some(alpha) = &image.alpha {
					push_chunk(&mut body, FourCc::ALPH, alpha);
				}
				push_chunk(&mut body, image_fourcc(image.is_lossless), &image.bitstream);
			}
			if let Some(exif) = &self.exif {
				push_chunk(&mut body, FourCc::EXIF, exif);
			}
			if let Some(xmp) = &self.xmp {
				push_chunk(&mut body, FourCc::XMP, xmp);
			}
		} else if let Some(image) = &self.image {
			push_chunk(&mut body, image_fourcc(image.is_lossless), &image.bitstream);
		}

		let mut out = Vec::with_capacity(RIFF_HEADER_SIZE + body.len());
		out.extend_from_slice(b"RIFF");
		out.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
		out.extend_from_slice(b"WEBP");
		out.extend_from_slice(&body);
		Ok(out)
	}
}

fn image_fourcc(is_lossless: bool) -> FourCc {
	if is_lossless {
		FourCc::VP8L
	} else {
		FourCc::VP8
	}
}

fn serialize_frame(frame: &MuxFrame) -> Vec<u8> {
	let mut payload = Vec::with_capacity(
		super::ANMF_HEADER_SIZE + CHUNK_HEADER_SIZE + frame.bitstream.len(),
	);
	payload.extend_from_slice(&frame.header.to_bytes());
	if let Some(alpha) = &frame.alpha {
		push_chunk(&mut payload, FourCc::ALPH, alpha);
	}
	push_chunk(&mut payload, image_fourcc(frame.is_lossless), &frame.bitstream);
	payload
}

fn push_chunk(out: &mut Vec<u8>, id: FourCc, payload: &[u8]) {
	out.extend_from_slice(&id.0);
	out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
	out.extend_from_slice(payload);
	if payload.len() % 2 == 1 {
		out.push(0);
	}
}

fn check_dimensions(width: u32, height: u32) -> Result<(), MuxError> {
	if width == 0
		|| height == 0
		|| width > MAX_DIMENSION
		|| height > MAX_DIMENSION
		|| u64::from(width) * u64::from(height) > MAX_CANVAS_AREA
	{
		return Err(MuxError::DimensionsTooLarge {
			width,
			height,
		});
	}
	Ok(())
}
