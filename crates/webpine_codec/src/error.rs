//! Error types for WebP container parsing and bitstream coding.

use thiserror::Error;

/// Errors that can occur when parsing or building the RIFF container
#[derive(Debug, Error)]
pub enum RiffError {
	/// Not enough data to parse
	#[error("Insufficient data: expected {expected} bytes, got {actual} bytes")]
	InsufficientData {
		/// Expected number of bytes
		expected: usize,
		/// Actual number of bytes
		actual: usize,
	},

	/// First four bytes are not `RIFF`
	#[error("Invalid RIFF signature: {0:02X?}")]
	InvalidRiffSignature([u8; 4]),

	/// Form type is not `WEBP`
	#[error("Invalid WEBP form type: {0:02X?}")]
	InvalidWebpForm([u8; 4]),

	/// A chunk header declares more payload than the buffer holds
	#[error("Truncated chunk {id:02X?}: payload of {declared} bytes, {available} available")]
	TruncatedChunk {
		/// FourCC of the offending chunk
		id: [u8; 4],
		/// Payload size declared in the chunk header
		declared: u32,
		/// Bytes remaining in the buffer
		available: usize,
	},

	/// The first chunk is not one of `VP8 `, `VP8L` or `VP8X`
	#[error("Unsupported leading chunk: {0:02X?}")]
	UnsupportedLeadingChunk([u8; 4]),

	/// A chunk that must appear at most once appeared again
	#[error("Duplicate chunk: {0:02X?}")]
	DuplicateChunk([u8; 4]),

	/// Reserved VP8X or ANMF bits were set
	#[error("Reserved bits set in {0} header")]
	ReservedBitsSet(&'static str),

	/// Canvas width or height of zero, or above the format limit
	#[error("Invalid canvas dimensions: {width}x{height}")]
	InvalidCanvas {
		/// Canvas width
		width: u32,
		/// Canvas height
		height: u32,
	},

	/// A frame rectangle does not fit inside the canvas
	#[error(
		"Frame at ({x},{y}) sized {width}x{height} exceeds {canvas_width}x{canvas_height} canvas"
	)]
	FrameOutsideCanvas {
		/// Frame x offset
		x: u32,
		/// Frame y offset
		y: u32,
		/// Frame width
		width: u32,
		/// Frame height
		height: u32,
		/// Canvas width
		canvas_width: u32,
		/// Canvas height
		canvas_height: u32,
	},

	/// The file contains no image data chunk
	#[error("No image data chunk found")]
	MissingImageData,

	/// ANMF-declared frame size disagrees with the bitstream header
	#[error("Frame header says {header_width}x{header_height}, bitstream says {bitstream_width}x{bitstream_height}")]
	FrameSizeMismatch {
		/// Width from the ANMF header
		header_width: u32,
		/// Height from the ANMF header
		header_height: u32,
		/// Width from the VP8/VP8L header
		bitstream_width: u32,
		/// Height from the VP8/VP8L header
		bitstream_height: u32,
	},

	/// A non-animated file carried more than one frame
	#[error("Multiple image chunks in a non-animated file")]
	MultipleFrames,

	/// An ANMF payload held an ALPH chunk but no bitstream chunk
	#[error("Animation frame has no bitstream chunk")]
	FrameWithoutBitstream,

	/// IO error
	#[error(transparent)]
	IOError(#[from] std::io::Error),
}

/// Errors raised by the VP8L lossless decoder and encoder
#[derive(Debug, Error)]
pub enum LosslessError {
	/// Leading byte is not the 0x2F signature
	#[error("Invalid VP8L signature: {0:#04x}")]
	InvalidSignature(u8),

	/// Version field must be zero
	#[error("Unsupported VP8L version: {0}")]
	UnsupportedVersion(u8),

	/// The bitstream ended while more symbols were required
	#[error("Truncated VP8L bitstream")]
	Truncated,

	/// A transform kind appeared twice, or the sequence was malformed
	#[error("Invalid transform sequence")]
	InvalidTransform,

	/// Color cache bits outside the 1..=11 decoder range
	#[error("Invalid color cache bits: {0}")]
	InvalidColorCacheBits(u8),

	/// Code length array does not describe a valid prefix code
	#[error("Invalid Huffman code")]
	InvalidHuffmanCode,

	/// A backward reference pointed before the start of the image,
	/// past its end, or carried a zero distance
	#[error("Invalid backward reference: distance {distance} at pixel {position}")]
	InvalidBackwardReference {
		/// Decoded pixel distance
		distance: u64,
		/// Pixel index the reference was read at
		position: usize,
	},

	/// Any other unrecoverable bitstream corruption
	#[error("Corrupt VP8L bitstream")]
	BitstreamCorrupt,
}

/// Errors raised by the VP8 (lossy) frame-header layer and the ALPH codec
#[derive(Debug, Error)]
pub enum LossyError {
	/// VP8 keyframe start code `0x9D 0x01 0x2A` not found
	#[error("Invalid VP8 start code: {0:02X?}")]
	InvalidStartCode([u8; 3]),

	/// The frame is an interframe; WebP stills must be keyframes
	#[error("VP8 frame is not a keyframe")]
	NotAKeyFrame,

	/// Profile outside 0..=3
	#[error("Invalid VP8 profile: {0}")]
	InvalidProfile(u8),

	/// Header was shorter than the fixed keyframe preamble
	#[error("Truncated VP8 frame header")]
	TruncatedHeader,

	/// No external VP8 pixel decoder is registered
	#[error("No VP8 bitstream decoder registered; only header data is available")]
	NoVp8Decoder,

	/// Lossy encoding needs an external VP8 encoder
	#[error("No VP8 encoder available; only lossless encoding is built in")]
	NoVp8Encoder,

	/// ALPH chunk header carried an unknown compression or filter method
	#[error("Invalid alpha header byte: {0:#04x}")]
	InvalidAlphaHeader(u8),

	/// The lossless-coded alpha plane failed to decode
	#[error("Corrupt alpha bitstream")]
	AlphaBitstream,

	/// Alpha plane size did not match the frame
	#[error("Alpha plane size mismatch: expected {expected} bytes, got {actual}")]
	AlphaSizeMismatch {
		/// width * height of the frame
		expected: usize,
		/// decoded plane size
		actual: usize,
	},
}

/// Errors raised when assembling a WebP file or animation
#[derive(Debug, Error)]
pub enum MuxError {
	/// Width or height outside (0, 16383]
	#[error("Dimensions too large: {width}x{height}")]
	DimensionsTooLarge {
		/// Requested width
		width: u32,
		/// Requested height
		height: u32,
	},

	/// Pixel buffer length does not match width * height
	#[error("Pixel buffer size mismatch: expected {expected}, got {actual}")]
	BufferSizeMismatch {
		/// width * height
		expected: usize,
		/// supplied length
		actual: usize,
	},

	/// Frame offsets must be even in the stored representation
	#[error("Frame offset ({x},{y}) is not even")]
	OddFrameOffset {
		/// Frame x offset
		x: u32,
		/// Frame y offset
		y: u32,
	},

	/// A frame rectangle does not fit inside the canvas
	#[error("Frame exceeds canvas bounds")]
	FrameOutsideCanvas,

	/// Animation encoder was asked to finish without any frames
	#[error("Animation has no frames")]
	EmptyAnimation,
}

/// Unified error type covering every WebP operation.
///
/// Concrete modules return their own error enums; the public API surfaces
/// this unified type so callers match on a single error.
#[derive(Debug, Error)]
pub enum WebpError {
	/// Container-level error
	#[error(transparent)]
	Riff(#[from] RiffError),

	/// VP8L bitstream error
	#[error(transparent)]
	Lossless(#[from] LosslessError),

	/// VP8 / alpha error
	#[error(transparent)]
	Lossy(#[from] LossyError),

	/// Mux / encode assembly error
	#[error(transparent)]
	Mux(#[from] MuxError),

	/// IO error at the library boundary
	#[error(transparent)]
	IOError(#[from] std::io::Error),
}

impl RiffError {
	/// Shorthand used by parsers that ran out of bytes.
	pub fn insufficient(expected: usize, actual: usize) -> Self {
		Self::InsufficientData {
			expected,
			actual,
		}
	}
}
