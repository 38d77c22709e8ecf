//! ALPH chunk codec: the alpha plane of lossy frames.
//!
//! ## Header Byte
//!
//! | Bits | Field         | Values                                  |
//! |------|---------------|-----------------------------------------|
//! | 0-1  | compression   | 0 = raw bytes, 1 = lossless-coded plane |
//! | 2-3  | filter        | none / horizontal / vertical / gradient |
//! | 4-5  | preprocessing | 0 = none, 1 = level reduction           |
//! | 6-7  | reserved      | must be zero                            |
//!
//! The lossless-coded form wraps each alpha byte into the green channel of
//! a headerless VP8L stream at the frame's dimensions. Filters are applied
//! per row before compression and undone after decompression.

use crate::error::LossyError;
use crate::vp8l::decoder::Vp8lDecoder;
use crate::vp8l::encoder::{Vp8lConfig, Vp8lEncoder};

/// Row filter applied to the plane before compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AlphaFilter {
	/// Store values as they are.
	#[default]
	None = 0,
	/// Predict from the left neighbor (row start predicts from above).
	Horizontal = 1,
	/// Predict from the pixel above (first row predicts from the left).
	Vertical = 2,
	/// Gradient predictor `clamp(left + top - top_left)`.
	Gradient = 3,
}

impl AlphaFilter {
	fn from_bits(bits: u8) -> Self {
		match bits {
			1 => Self::Horizontal,
			2 => Self::Vertical,
			3 => Self::Gradient,
			_ => Self::None,
		}
	}
}

/// How the plane payload is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AlphaCompression {
	/// Uncompressed bytes.
	Raw = 0,
	/// Headerless VP8L green-channel image.
	#[default]
	Lossless = 1,
}

#[inline]
fn gradient_predictor(left: i32, top: i32, top_left: i32) -> u8 {
	(left + top - top_left).clamp(0, 255) as u8
}

fn unfilter(plane: &mut [u8], width: usize, height: usize, filter: AlphaFilter) {
	if filter == AlphaFilter::None || width == 0 {
		return;
	}
	for y in 0..height {
		let row = y * width;
		match filter {
			AlphaFilter::Horizontal => {
				let mut pred = if y == 0 { 0u8 } else { plane[row - width] };
				for x in 0..width {
					pred = pred.wrapping_add(plane[row + x]);
					plane[row + x] = pred;
				}
			}
			AlphaFilter::Vertical => {
				if y == 0 {
					let mut pred = 0u8;
					for x in 0..width {
						pred = pred.wrapping_add(plane[x]);
						plane[x] = pred;
					}
				} else {
					for x in 0..width {
						plane[row + x] = plane[row + x].wrapping_add(plane[row - width + x]);
					}
				}
			}
			AlphaFilter::Gradient => {
				if y == 0 {
					let mut pred = 0u8;
					for x in 0..width {
						pred = pred.wrapping_add(plane[x]);
						plane[x] = pred;
					}
				} else {
					let mut left = plane[row - width];
					let mut top_left = i32::from(left);
					for x in 0..width {
						let top = i32::from(plane[row - width + x]);
						let predicted =
							gradient_predictor(i32::from(left), top, top_left);
						left = plane[row + x].wrapping_add(predicted);
						plane[row + x] = left;
						top_left = top;
					}
				}
			}
			AlphaFilter::None => unreachable!(),
		}
	}
}

fn filter(plane: &[u8], width: usize, height: usize, method: AlphaFilter) -> Vec<u8> {
	let mut out = plane.to_vec();
	if method == AlphaFilter::None || width == 0 {
		return out;
	}
	for y in (0..height).rev() {
		let row = y * width;
		match method {
			AlphaFilter::Horizontal => {
				for x in (0..width).rev() {
					let pred = if x > 0 {
						plane[row + x - 1]
					} else if y > 0 {
						plane[row - width]
					} else {
						0
					};
					out[row + x] = plane[row + x].wrapping_sub(pred);
				}
			}
			AlphaFilter::Vertical => {
				for x in (0..width).rev() {
					let pred = if y > 0 {
						plane[row - width + x]
					} else if x > 0 {
						plane[x - 1]
					} else {
						0
					};
					out[row + x] = plane[row + x].wrapping_sub(pred);
				}
			}
			AlphaFilter::Gradient => {
				for x in (0..width).rev() {
					let pred = if y == 0 {
						if x > 0 { plane[x - 1] } else { 0 }
					} else if x == 0 {
						plane[row - width]
					} else {
						gradient_predictor(
							i32::from(plane[row + x - 1]),
							i32::from(plane[row - width + x]),
							i32::from(plane[row - width + x - 1]),
						)
					};
					out[row + x] = plane[row + x].wrapping_sub(pred);
				}
			}
			AlphaFilter::None => unreachable!(),
		}
	}
	out
}

/// Decodes an ALPH payload into a `width * height` alpha plane.
pub fn decode_alpha(
	payload: &[u8],
	width: u32,
	height: u32,
	lossless: &mut Vp8lDecoder,
) -> Result<Vec<u8>, LossyError> {
	let (&header, body) = payload.split_first().ok_or(LossyError::TruncatedHeader)?;
	if header & 0xC0 != 0 {
		return Err(LossyError::InvalidAlphaHeader(header));
	}
	let compression = header & 0x3;
	let filter_method = AlphaFilter::from_bits(header >> 2 & 0x3);
	let expected = width as usize * height as usize;

	let mut plane = match compression {
		0 => {
			if body.len() < expected {
				return Err(LossyError::AlphaSizeMismatch {
					expected,
					actual: body.len(),
				});
			}
			body[..expected].to_vec()
		}
		1 => {
			let pixels = lossless
				.decode_headerless(width, height, body)
				.map_err(|_| LossyError::AlphaBitstream)?;
			if pixels.len() != expected {
				return Err(LossyError::AlphaSizeMismatch {
					expected,
					actual: pixels.len(),
				});
			}
			pixels.iter().map(|&pixel| (pixel >> 8) as u8).collect()
		}
		_ => return Err(LossyError::InvalidAlphaHeader(header)),
	};

	unfilter(&mut plane, width as usize, height as usize, filter_method);
	Ok(plane)
}

/// Encodes an alpha plane into an ALPH payload.
///
/// `filter_choice` of `None` tries every filter and keeps the smallest
/// output.
pub fn encode_alpha(
	plane: &[u8],
	width: u32,
	height: u32,
	compression: AlphaCompression,
	filter_choice: Option<AlphaFilter>,
	encoder: &mut Vp8lEncoder,
) -> Result<Vec<u8>, LossyError> {
	debug_assert_eq!(plane.len(), width as usize * height as usize);
	let single_storage;
	let candidates: &[AlphaFilter] = match filter_choice {
		Some(single) => {
			single_storage = [single];
			&single_storage
		}
		None => &[
			AlphaFilter::None,
			AlphaFilter::Horizontal,
			AlphaFilter::Vertical,
			AlphaFilter::Gradient,
		],
	};

	let mut best: Option<Vec<u8>> = None;
	for &method in candidates {
		let filtered = filter(plane, width as usize, height as usize, method);
		let body = match compression {
			AlphaCompression::Raw => filtered,
			AlphaCompression::Lossless => {
				let pixels: Vec<u32> = filtered
					.iter()
					.map(|&value| 0xFF00_0000 | u32::from(value) << 8)
					.collect();
				let config = Vp8lConfig {
					quality: 75,
					method: 4,
					exact: true,
					near_lossless: 100,
				};
				encoder
					.encode_headerless(&pixels, width, height, &config)
					.map_err(|_| LossyError::AlphaSizeMismatch {
						expected: plane.len(),
						actual: 0,
					})?
			}
		};
		let mut payload = Vec::with_capacity(body.len() + 1);
		payload.push(compression as u8 | (method as u8) << 2);
		payload.extend_from_slice(&body);
		if best.as_ref().is_none_or(|current| payload.len() < current.len()) {
			best = Some(payload);
		}
	}
	Ok(best.expect("at least one candidate"))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn gradient_plane(width: usize, height: usize) -> Vec<u8> {
		let mut plane = Vec::with_capacity(width * height);
		for y in 0..height {
			for x in 0..width {
				plane.push(((x * 3 + y * 7) % 256) as u8);
			}
		}
		plane
	}

	#[test]
	fn test_filter_unfilter_roundtrip() {
		let plane = gradient_plane(13, 9);
		for method in [
			AlphaFilter::None,
			AlphaFilter::Horizontal,
			AlphaFilter::Vertical,
			AlphaFilter::Gradient,
		] {
			let mut filtered = filter(&plane, 13, 9, method);
			unfilter(&mut filtered, 13, 9, method);
			assert_eq!(filtered, plane, "{method:?}");
		}
	}

	#[test]
	fn test_raw_alpha_roundtrip() {
		let plane = gradient_plane(16, 8);
		let mut encoder = Vp8lEncoder::new();
		let payload = encode_alpha(
			&plane,
			16,
			8,
			AlphaCompression::Raw,
			Some(AlphaFilter::Horizontal),
			&mut encoder,
		)
		.unwrap();
		let mut decoder = Vp8lDecoder::new();
		let decoded = decode_alpha(&payload, 16, 8, &mut decoder).unwrap();
		assert_eq!(decoded, plane);
	}

	#[test]
	fn test_lossless_alpha_roundtrip_all_filters() {
		let plane = gradient_plane(24, 17);
		let mut encoder = Vp8lEncoder::new();
		let mut decoder = Vp8lDecoder::new();
		let payload = encode_alpha(
			&plane,
			24,
			17,
			AlphaCompression::Lossless,
			None,
			&mut encoder,
		)
		.unwrap();
		let decoded = decode_alpha(&payload, 24, 17, &mut decoder).unwrap();
		assert_eq!(decoded, plane);
	}

	#[test]
	fn test_reserved_bits_rejected() {
		let mut decoder = Vp8lDecoder::new();
		assert!(matches!(
			decode_alpha(&[0x80, 1, 2], 1, 1, &mut decoder),
			Err(LossyError::InvalidAlphaHeader(0x80))
		));
	}

	#[test]
	fn test_short_raw_payload_rejected() {
		let mut decoder = Vp8lDecoder::new();
		assert!(matches!(
			decode_alpha(&[0x00, 1, 2], 2, 2, &mut decoder),
			Err(LossyError::AlphaSizeMismatch { .. })
		));
	}

	#[test]
	fn test_empty_payload_rejected() {
		let mut decoder = Vp8lDecoder::new();
		assert!(decode_alpha(&[], 4, 4, &mut decoder).is_err());
	}
}
