//! Inverse transforms, applied by the decoder in reverse insertion order.

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::vp8l::{add_pixels, green};

use super::predictor::predict;
use super::{Transform, TransformKind};

/// Row-independent passes go parallel above this pixel count.
#[cfg(feature = "rayon")]
pub(crate) const PARALLEL_THRESHOLD_PIXELS: usize = 100_000;

/// Applies one inverse transform; color indexing swaps the buffer for a
/// wider one, the other kinds work in place.
pub fn apply_inverse(transform: &Transform, pixels: Vec<u32>) -> Vec<u32> {
	match transform.kind {
		TransformKind::SubtractGreen => {
			let mut pixels = pixels;
			add_green(&mut pixels);
			pixels
		}
		TransformKind::Predictor => {
			let mut pixels = pixels;
			inverse_predictor(transform, &mut pixels);
			pixels
		}
		TransformKind::CrossColor => {
			let mut pixels = pixels;
			inverse_cross_color(transform, &mut pixels);
			pixels
		}
		TransformKind::ColorIndexing => inverse_color_indexing(transform, &pixels),
	}
}

#[inline]
fn add_green_pixel(argb: u32) -> u32 {
	let green = (argb >> 8) & 0xFF;
	let red_blue = (argb & 0x00FF_00FF).wrapping_add(green << 16 | green);
	(argb & 0xFF00_FF00) | (red_blue & 0x00FF_00FF)
}

/// Adds the green channel back into red and blue, modulo 256.
pub fn add_green(pixels: &mut [u32]) {
	#[cfg(feature = "rayon")]
	if pixels.len() >= PARALLEL_THRESHOLD_PIXELS {
		pixels.par_iter_mut().for_each(|pixel| *pixel = add_green_pixel(*pixel));
		return;
	}
	for pixel in pixels.iter_mut() {
		*pixel = add_green_pixel(*pixel);
	}
}

/// Undoes spatial prediction. Sequential by nature: every pixel depends on
/// its decoded left and top neighbors.
pub fn inverse_predictor(transform: &Transform, pixels: &mut [u32]) {
	let width = transform.xsize as usize;
	let height = transform.ysize as usize;
	if width == 0 || height == 0 {
		return;
	}
	let bits = u32::from(transform.bits);
	let tiles_x = transform.tiles_x() as usize;

	pixels[0] = add_pixels(pixels[0], 0xFF00_0000);
	for x in 1..width {
		pixels[x] = add_pixels(pixels[x], pixels[x - 1]);
	}
	for y in 1..height {
		let row = y * width;
		pixels[row] = add_pixels(pixels[row], pixels[row - width]);
		let tile_row = (y >> bits) * tiles_x;
		let mut x = 1usize;
		while x < width {
			let tile_end = (((x >> bits) + 1) << bits).min(width);
			let mode = green(transform.data[tile_row + (x >> bits)]);
			for xi in x..tile_end {
				let left = pixels[row + xi - 1];
				let top = pixels[row - width + xi];
				let top_left = pixels[row - width + xi - 1];
				// At the last column this reads the first pixel of the
				// current row, which is already reconstructed.
				let top_right = pixels[row - width + xi + 1];
				let predicted = predict(mode, left, top, top_left, top_right);
				pixels[row + xi] = add_pixels(pixels[row + xi], predicted);
			}
			x = tile_end;
		}
	}
}

#[inline]
pub(crate) fn color_transform_delta(t: i8, c: i8) -> i32 {
	(i32::from(t) * i32::from(c)) >> 5
}

#[inline]
fn inverse_cross_color_pixel(argb: u32, g2r: i8, g2b: i8, r2b: i8) -> u32 {
	let green = (argb >> 8) as u8 as i8;
	let mut red = ((argb >> 16) & 0xFF) as i32;
	red = (red + color_transform_delta(g2r, green)) & 0xFF;
	let mut blue = (argb & 0xFF) as i32;
	blue = (blue + color_transform_delta(g2b, green)) & 0xFF;
	blue = (blue + color_transform_delta(r2b, red as u8 as i8)) & 0xFF;
	(argb & 0xFF00_FF00) | ((red as u32) << 16) | blue as u32
}

fn inverse_cross_color_row(transform: &Transform, y: usize, row: &mut [u32]) {
	let bits = u32::from(transform.bits);
	let tiles_x = transform.tiles_x() as usize;
	let tile_row = (y >> bits) * tiles_x;
	for (x, pixel) in row.iter_mut().enumerate() {
		let code = transform.data[tile_row + (x >> bits)];
		let g2r = code as u8 as i8;
		let g2b = (code >> 8) as u8 as i8;
		let r2b = (code >> 16) as u8 as i8;
		*pixel = inverse_cross_color_pixel(*pixel, g2r, g2b, r2b);
	}
}

/// Undoes the cross-color decorrelation. Rows are independent.
pub fn inverse_cross_color(transform: &Transform, pixels: &mut [u32]) {
	let width = transform.xsize as usize;
	#[cfg(feature = "rayon")]
	if pixels.len() >= PARALLEL_THRESHOLD_PIXELS {
		pixels
			.par_chunks_mut(width)
			.enumerate()
			.for_each(|(y, row)| inverse_cross_color_row(transform, y, row));
		return;
	}
	for (y, row) in pixels.chunks_mut(width).enumerate() {
		inverse_cross_color_row(transform, y, row);
	}
}

/// Expands packed palette indices to full pixels. The input buffer has the
/// reduced "packed width"; the output is `xsize` wide again.
pub fn inverse_color_indexing(transform: &Transform, packed: &[u32]) -> Vec<u32> {
	let width = transform.xsize as usize;
	let height = transform.ysize as usize;
	let xbits = u32::from(transform.bits);
	let packed_width = transform.packed_width() as usize;
	let bits_per_pixel = 8u32 >> xbits;
	let count_mask = (1usize << xbits) - 1;
	let index_mask = (1u32 << bits_per_pixel) - 1;

	// Indices past the palette read as transparent zero rather than failing;
	// packed streams can address slots the palette never defined.
	let table_len = transform.data.len().max(1 << bits_per_pixel.min(8));
	let mut table = vec![0u32; table_len];
	table[..transform.data.len()].copy_from_slice(&transform.data);

	let mut out = vec![0u32; width * height];
	for y in 0..height {
		let src_row = y * packed_width;
		let dst_row = y * width;
		for x in 0..width {
			let packed_pixel = packed[src_row + (x >> xbits)];
			let shift = (x & count_mask) as u32 * bits_per_pixel;
			let index = (u32::from(green(packed_pixel)) >> shift) & index_mask;
			out[dst_row + x] = table[index as usize];
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::vp8l::make_argb;

	#[test]
	fn test_add_green() {
		let mut pixels = [make_argb(255, 10, 20, 30)];
		add_green(&mut pixels);
		assert_eq!(pixels[0], make_argb(255, 30, 20, 50));

		// Wraps modulo 256.
		let mut pixels = [make_argb(255, 250, 20, 250)];
		add_green(&mut pixels);
		assert_eq!(pixels[0], make_argb(255, 14, 20, 14));
	}

	#[test]
	fn test_inverse_predictor_black_tile() {
		// All-zero residuals with mode 0 tiles: first pixel becomes opaque
		// black, row 0 copies it leftward, further rows copy it downward.
		let transform = Transform {
			kind: TransformKind::Predictor,
			bits: 4,
			xsize: 3,
			ysize: 2,
			data: vec![0xFF00_0000], // green byte 0 → mode 0
		};
		let mut pixels = vec![0u32; 6];
		inverse_predictor(&transform, &mut pixels);
		assert!(pixels.iter().all(|&pixel| pixel == 0xFF00_0000));
	}

	#[test]
	fn test_inverse_color_indexing_two_colors() {
		// 1-bit indices, 8 per packed pixel; pattern 0b0110 in the low bits.
		let palette = vec![make_argb(255, 0, 0, 0), make_argb(255, 255, 255, 255)];
		let transform = Transform {
			kind: TransformKind::ColorIndexing,
			bits: 3,
			xsize: 4,
			ysize: 1,
			data: palette.clone(),
		};
		let packed = vec![make_argb(0, 0, 0b0110, 0)];
		let out = inverse_color_indexing(&transform, &packed);
		assert_eq!(out, vec![palette[0], palette[1], palette[1], palette[0]]);
	}

	#[test]
	fn test_out_of_range_palette_index_reads_zero() {
		let transform = Transform {
			kind: TransformKind::ColorIndexing,
			bits: 2,
			xsize: 1,
			ysize: 1,
			data: vec![make_argb(255, 1, 2, 3)], // single color, 2-bit indices
		};
		let packed = vec![make_argb(0, 0, 0b11, 0)]; // index 3: undefined
		let out = inverse_color_indexing(&transform, &packed);
		assert_eq!(out, vec![0]);
	}
}
