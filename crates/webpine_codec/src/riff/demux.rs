//! RIFF parsing: chunk walk, feature extraction, frame table.

use crate::error::{RiffError, WebpError};
use crate::vp8;
use crate::vp8l;

use super::{
	AnmfHeader, Blend, Chunk, ChunkIter, Dispose, FourCc, ANMF_HEADER_SIZE, MAX_CANVAS_AREA,
	RIFF_HEADER_SIZE, read_le24, vp8x_flags,
};

/// Kind of image data the container carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
	/// Bare `VP8 ` chunk.
	Lossy,
	/// Bare `VP8L` chunk.
	Lossless,
	/// `VP8X` extended file.
	Extended,
}

/// File-level features, the result of a `GetFeatures` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
	/// Canvas width in pixels.
	pub width: u32,
	/// Canvas height in pixels.
	pub height: u32,
	/// Container flavor.
	pub kind: ImageKind,
	/// Whether any frame carries alpha.
	pub has_alpha: bool,
	/// Whether the file is animated.
	pub has_animation: bool,
	/// Animation loop count; zero means loop forever.
	pub loop_count: u16,
	/// Animation background color (BGRA byte order as stored).
	pub background_color: u32,
	/// Number of frames; one for still images.
	pub frame_count: u32,
}

/// A single frame's chunks, viewed in place inside the source buffer.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
	/// Placement and timing; synthesized for still images.
	pub header: AnmfHeader,
	/// Optional `ALPH` payload for lossy frames.
	pub alpha: Option<&'a [u8]>,
	/// The `VP8 ` or `VP8L` payload.
	pub bitstream: &'a [u8],
	/// `true` when `bitstream` is VP8L.
	pub is_lossless: bool,
	/// Whether this frame produces alpha pixels.
	pub has_alpha: bool,
}

/// Parsed WebP container: features, frame table, metadata views.
///
/// All slices borrow from the input buffer; nothing is copied.
#[derive(Debug)]
pub struct Demuxer<'a> {
	features: Features,
	frames: Vec<FrameView<'a>>,
	iccp: Option<&'a [u8]>,
	exif: Option<&'a [u8]>,
	xmp: Option<&'a [u8]>,
	unknown: Vec<Chunk<'a>>,
}

impl<'a> Demuxer<'a> {
	/// Parses a complete WebP file.
	pub fn from_bytes(data: &'a [u8]) -> Result<Self, WebpError> {
		if data.len() < RIFF_HEADER_SIZE {
			return Err(RiffError::insufficient(RIFF_HEADER_SIZE, data.len()).into());
		}
		if &data[0..4] != b"RIFF" {
			return Err(RiffError::InvalidRiffSignature([data[0], data[1], data[2], data[3]]).into());
		}
		if &data[8..12] != b"WEBP" {
			return Err(RiffError::InvalidWebpForm([data[8], data[9], data[10], data[11]]).into());
		}
		let declared = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
		// The RIFF size counts everything after its own field. A buffer
		// shorter than declared is a truncation; trailing garbage past the
		// declared end is ignored.
		if declared < 4 || data.len() < 8 + declared {
			return Err(RiffError::insufficient(8 + declared.max(4), data.len()).into());
		}
		let body = &data[RIFF_HEADER_SIZE..8 + declared];

		let mut iter = ChunkIter::new(body);
		let first = match iter.next() {
			Some(chunk) => chunk?,
			None => return Err(RiffError::MissingImageData.into()),
		};

		match first.id {
			FourCc::VP8 => Self::from_simple(first, false),
			FourCc::VP8L => Self::from_simple(first, true),
			FourCc::VP8X => Self::from_extended(first, iter),
			other => Err(RiffError::UnsupportedLeadingChunk(other.0).into()),
		}
	}

	fn from_simple(chunk: Chunk<'a>, is_lossless: bool) -> Result<Self, WebpError> {
		let (width, height, has_alpha) = if is_lossless {
			let header = vp8l::StreamHeader::from_bytes(chunk.payload)?;
			(header.width, header.height, header.has_alpha)
		} else {
			let header = vp8::FrameHeader::from_bytes(chunk.payload)?;
			(u32::from(header.width), u32::from(header.height), false)
		};
		let frame = FrameView {
			header: still_frame_header(width, height),
			alpha: None,
			bitstream: chunk.payload,
			is_lossless,
			has_alpha,
		};
		Ok(Self {
			features: Features {
				width,
				height,
				kind: if is_lossless {
					ImageKind::Lossless
				} else {
					ImageKind::Lossy
				},
				has_alpha,
				has_animation: false,
				loop_count: 0,
				background_color: 0,
				frame_count: 1,
			},
			frames: vec![frame],
			iccp: None,
			exif: None,
			xmp: None,
			unknown: Vec::new(),
		})
	}

	fn from_extended(vp8x: Chunk<'a>, iter: ChunkIter<'a>) -> Result<Self, WebpError> {
		if vp8x.payload.len() < 10 {
			return Err(RiffError::insufficient(10, vp8x.payload.len()).into());
		}
		let flags = vp8x.payload[0];
		if flags & vp8x_flags::RESERVED != 0 {
			return Err(RiffError::ReservedBitsSet("VP8X").into());
		}
		let canvas_width = read_le24(&vp8x.payload[4..7]) + 1;
		let canvas_height = read_le24(&vp8x.payload[7..10]) + 1;
		if u64::from(canvas_width) * u64::from(canvas_height) > MAX_CANVAS_AREA {
			return Err(RiffError::InvalidCanvas {
				width: canvas_width,
				height: canvas_height,
			}
			.into());
		}
		let animated = flags & vp8x_flags::ANIMATION != 0;

		let mut features = Features {
			width: canvas_width,
			height: canvas_height,
			kind: ImageKind::Extended,
			has_alpha: flags & vp8x_flags::ALPHA != 0,
			has_animation: animated,
			loop_count: 0,
			background_color: 0,
			frame_count: 0,
		};
		let mut frames = Vec::new();
		let mut iccp = None;
		let mut exif = None;
		let mut xmp = None;
		let mut unknown = Vec::new();
		let mut anim_seen = false;
		let mut pending_alpha: Option<&'a [u8]> = None;

		for chunk in iter {
			let chunk = chunk?;
			match chunk.id {
				FourCc::VP8X => return Err(RiffError::DuplicateChunk(*b"VP8X").into()),
				FourCc::ICCP => {
					if iccp.replace(chunk.payload).is_some() {
						return Err(RiffError::DuplicateChunk(*b"ICCP").into());
					}
				}
				FourCc::EXIF => {
					if exif.replace(chunk.payload).is_some() {
						return Err(RiffError::DuplicateChunk(*b"EXIF").into());
					}
				}
				FourCc::XMP => {
					if xmp.replace(chunk.payload).is_some() {
						return Err(RiffError::DuplicateChunk(*b"XMP ").into());
					}
				}
				FourCc::ANIM => {
					if anim_seen {
						return Err(RiffError::DuplicateChunk(*b"ANIM").into());
					}
					if chunk.payload.len() < 6 {
						return Err(RiffError::insufficient(6, chunk.payload.len()).into());
					}
					anim_seen = true;
					features.background_color = u32::from_le_bytes([
						chunk.payload[0],
						chunk.payload[1],
						chunk.payload[2],
						chunk.payload[3],
					]);
					features.loop_count =
						u16::from_le_bytes([chunk.payload[4], chunk.payload[5]]);
				}
				FourCc::ANMF => {
					if !animated {
						return Err(RiffError::MultipleFrames.into());
					}
					let frame = parse_anmf(chunk.payload, canvas_width, canvas_height)?;
					frames.push(frame);
				}
				FourCc::ALPH => {
					pending_alpha = Some(chunk.payload);
				}
				FourCc::VP8 | FourCc::VP8L => {
					if animated || !frames.is_empty() {
						return Err(RiffError::MultipleFrames.into());
					}
					let is_lossless = chunk.id == FourCc::VP8L;
					let frame = parse_still(
						chunk.payload,
						is_lossless,
						pending_alpha.take(),
						canvas_width,
						canvas_height,
					)?;
					frames.push(frame);
				}
				_ => unknown.push(chunk),
			}
		}

		if frames.is_empty() {
			return Err(RiffError::MissingImageData.into());
		}
		if animated && !anim_seen {
			return Err(RiffError::MissingImageData.into());
		}
		features.frame_count = frames.len() as u32;
		features.has_alpha =
			features.has_alpha || frames.iter().any(|frame| frame.has_alpha);
		Ok(Self {
			features,
			frames,
			iccp,
			exif,
			xmp,
			unknown,
		})
	}

	/// File-level features.
	pub fn features(&self) -> &Features {
		&self.features
	}

	/// Frames in file order; exactly one for still images.
	pub fn frames(&self) -> &[FrameView<'a>] {
		&self.frames
	}

	/// ICC profile payload, if present.
	pub fn iccp(&self) -> Option<&'a [u8]> {
		self.iccp
	}

	/// EXIF payload, if present.
	pub fn exif(&self) -> Option<&'a [u8]> {
		self.exif
	}

	/// XMP payload, if present.
	pub fn xmp(&self) -> Option<&'a [u8]> {
		self.xmp
	}

	/// Chunks with FourCCs this parser does not know, preserved in order.
	pub fn unknown_chunks(&self) -> &[Chunk<'a>] {
		&self.unknown
	}
}

fn still_frame_header(width: u32, height: u32) -> AnmfHeader {
	AnmfHeader {
		offset_x: 0,
		offset_y: 0,
		width,
		height,
		duration_ms: 0,
		dispose: Dispose::None,
		blend: Blend::None,
	}
}

fn parse_still<'a>(
	payload: &'a [u8],
	is_lossless: bool,
	alpha: Option<&'a [u8]>,
	canvas_width: u32,
	canvas_height: u32,
) -> Result<FrameView<'a>, WebpError> {
	let (width, height, stream_alpha) = if is_lossless {
		let header = vp8l::StreamHeader::from_bytes(payload)?;
		(header.width, header.height, header.has_alpha)
	} else {
		let header = vp8::FrameHeader::from_bytes(payload)?;
		(u32::from(header.width), u32::from(header.height), false)
	};
	if width > canvas_width || height > canvas_height {
		return Err(RiffError::FrameOutsideCanvas {
			x: 0,
			y: 0,
			width,
			height,
			canvas_width,
			canvas_height,
		}
		.into());
	}
	Ok(FrameView {
		header: still_frame_header(width, height),
		alpha,
		bitstream: payload,
		is_lossless,
		has_alpha: stream_alpha || alpha.is_some(),
	})
}

fn parse_anmf<'a>(
	payload: &'a [u8],
	canvas_width: u32,
	canvas_height: u32,
) -> Result<FrameView<'a>, WebpError> {
	let header = AnmfHeader::from_bytes(payload)?;
	if u64::from(header.offset_x) + u64::from(header.width) > u64::from(canvas_width)
		|| u64::from(header.offset_y) + u64::from(header.height) > u64::from(canvas_height)
	{
		return Err(RiffError::FrameOutsideCanvas {
			x: header.offset_x,
			y: header.offset_y,
			width: header.width,
			height: header.height,
			canvas_width,
			canvas_height,
		}
		.into());
	}

	let mut alpha = None;
	let mut bitstream = None;
	let mut is_lossless = false;
	let mut stream_alpha = false;
	for sub in ChunkIter::new(&payload[ANMF_HEADER_SIZE..]) {
		let sub = sub?;
		match sub.id {
			FourCc::ALPH if bitstream.is_none() => alpha = Some(sub.payload),
			FourCc::VP8 if bitstream.is_none() => {
				let frame_header = vp8::FrameHeader::from_bytes(sub.payload)?;
				check_frame_size(&header, u32::from(frame_header.width), u32::from(frame_header.height))?;
				bitstream = Some(sub.payload);
			}
			FourCc::VP8L if bitstream.is_none() => {
				let stream = vp8l::StreamHeader::from_bytes(sub.payload)?;
				check_frame_size(&header, stream.width, stream.height)?;
				stream_alpha = stream.has_alpha;
				bitstream = Some(sub.payload);
				is_lossless = true;
			}
			// Later chunks inside the frame are ignored, matching the
			// container rule that readers skip what they don't need.
			_ => {}
		}
	}
	// A frame holding only an ALPH chunk has nothing to display; treat it
	// as malformed rather than synthesizing a transparent frame.
	let bitstream = bitstream.ok_or(RiffError::FrameWithoutBitstream)?;
	Ok(FrameView {
		header,
		alpha,
		bitstream,
		is_lossless,
		has_alpha: stream_alpha || alpha.is_some(),
	})
}

fn check_frame_size(header: &AnmfHeader, width: u32, height: u32) -> Result<(), RiffError> {
	if header.width != width || header.height != height {
		return Err(RiffError::FrameSizeMismatch {
			header_width: header.width,
			header_height: header.height,
			bitstream_width: width,
			bitstream_height: height,
		});
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::riff::Muxer;

	fn tiny_vp8l_payload() -> Vec<u8> {
		// Signature + 14/14/1/3-bit header for a 1x1 opaque image, plus a
		// minimal literal-coded pixel; only the header matters here.
		let mut writer = crate::bitio::BitWriter::new();
		writer.write_bits(0x2F, 8);
		writer.write_bits(0, 14); // width - 1
		writer.write_bits(0, 14); // height - 1
		writer.write_bits(0, 1); // alpha hint
		writer.write_bits(0, 3); // version
		writer.finish()
	}

	#[test]
	fn test_simple_lossless_features() {
		let payload = tiny_vp8l_payload();
		let mut data = Vec::new();
		data.extend_from_slice(b"RIFF");
		data.extend_from_slice(&((4 + 8 + payload.len()) as u32).to_le_bytes());
		data.extend_from_slice(b"WEBP");
		data.extend_from_slice(b"VP8L");
		data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
		data.extend_from_slice(&payload);

		let demuxer = Demuxer::from_bytes(&data).unwrap();
		let features = demuxer.features();
		assert_eq!(features.width, 1);
		assert_eq!(features.height, 1);
		assert_eq!(features.kind, ImageKind::Lossless);
		assert!(!features.has_animation);
		assert_eq!(features.frame_count, 1);
	}

	#[test]
	fn test_bad_riff_magic() {
		let err = Demuxer::from_bytes(b"JUNKxxxxWEBP").unwrap_err();
		assert!(matches!(
			err,
			WebpError::Riff(RiffError::InvalidRiffSignature(_))
		));
	}

	#[test]
	fn test_bad_form_type() {
		let err = Demuxer::from_bytes(b"RIFF\x04\x00\x00\x00WAVE").unwrap_err();
		assert!(matches!(err, WebpError::Riff(RiffError::InvalidWebpForm(_))));
	}

	#[test]
	fn test_metadata_roundtrip() {
		let payload = tiny_vp8l_payload();
		let mut muxer = Muxer::new();
		muxer.set_lossless_image(&payload, 1, 1, false);
		muxer.set_iccp(b"icc profile bytes");
		muxer.set_exif(b"exif!");
		muxer.set_xmp(b"<xmp/>");
		let file = muxer.finish().unwrap();

		let demuxer = Demuxer::from_bytes(&file).unwrap();
		assert_eq!(demuxer.iccp(), Some(&b"icc profile bytes"[..]));
		assert_eq!(demuxer.exif(), Some(&b"exif!"[..]));
		assert_eq!(demuxer.xmp(), Some(&b"<xmp/>"[..]));
		assert_eq!(demuxer.features().kind, ImageKind::Extended);
	}
}
