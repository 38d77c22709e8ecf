//! The four VP8L pixel transforms.
//!
//! Transforms are recorded in the stream in the order the encoder applied
//! them and undone in reverse order by the decoder. Each kind may appear at
//! most once per image:
//!
//! | Kind           | Payload                                        |
//! |----------------|------------------------------------------------|
//! | Predictor      | tile-size exponent + per-tile mode sub-image   |
//! | Cross-color    | tile-size exponent + per-tile multiplier image |
//! | Subtract-green | none                                           |
//! | Color-indexing | palette size + delta-coded palette image       |

pub mod forward;
pub mod inverse;
pub mod predictor;

use crate::error::LosslessError;

use super::subsample_size;

/// Transform kinds, with their 2-bit stream encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransformKind {
	/// Per-tile spatial prediction.
	Predictor = 0,
	/// Per-tile green→red/blue and red→blue decorrelation.
	CrossColor = 1,
	/// Green channel subtracted from red and blue.
	SubtractGreen = 2,
	/// Palette lookup with sub-byte pixel packing.
	ColorIndexing = 3,
}

impl TransformKind {
	/// Decodes the 2-bit kind field.
	pub fn from_bits(bits: u32) -> Result<Self, LosslessError> {
		match bits {
			0 => Ok(Self::Predictor),
			1 => Ok(Self::CrossColor),
			2 => Ok(Self::SubtractGreen),
			3 => Ok(Self::ColorIndexing),
			_ => Err(LosslessError::InvalidTransform),
		}
	}
}

/// A parsed (or planned) transform instance.
#[derive(Debug, Clone)]
pub struct Transform {
	/// Which transform.
	pub kind: TransformKind,
	/// Tile-size exponent (2..=5 on encode) for tiled kinds; pixel-packing
	/// width bits for color indexing; unused for subtract-green.
	pub bits: u8,
	/// Image width this transform applies to (output width).
	pub xsize: u32,
	/// Image height.
	pub ysize: u32,
	/// Sub-image pixels (tile modes, multipliers) or the decoded palette.
	pub data: Vec<u32>,
}

impl Transform {
	/// Number of tiles across for the tiled transforms.
	pub fn tiles_x(&self) -> u32 {
		subsample_size(self.xsize, u32::from(self.bits))
	}

	/// Width of the packed image a color-indexing transform produces.
	pub fn packed_width(&self) -> u32 {
		subsample_size(self.xsize, u32::from(self.bits))
	}
}

/// Width-packing exponent for a palette of the given size: palettes of at
/// most 2, 4 or 16 colors pack 8, 4 or 2 indices per stored pixel.
pub fn palette_pack_bits(palette_size: usize) -> u8 {
	if palette_size <= 2 {
		3
	} else if palette_size <= 4 {
		2
	} else if palette_size <= 16 {
		1
	} else {
		0
	}
}
