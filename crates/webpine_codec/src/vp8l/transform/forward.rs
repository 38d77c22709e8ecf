//! Forward transforms: the encoder-side searches and applications.

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::vp8l::histogram::fast_slog2;
use crate::vp8l::{green, make_argb, sub_pixels, subsample_size};

use super::inverse::color_transform_delta;
use super::predictor::{predict, NUM_PREDICTORS};
use super::{Transform, TransformKind, palette_pack_bits};

#[cfg(feature = "rayon")]
use super::inverse::PARALLEL_THRESHOLD_PIXELS;

/// Subtracts green from red and blue, in place.
pub fn subtract_green(pixels: &mut [u32]) {
	for pixel in pixels.iter_mut() {
		let argb = *pixel;
		let green = (argb >> 8) & 0xFF;
		let new_red = ((argb >> 16) & 0xFF).wrapping_sub(green) & 0xFF;
		let new_blue = (argb & 0xFF).wrapping_sub(green) & 0xFF;
		*pixel = (argb & 0xFF00_FF00) | (new_red << 16) | new_blue;
	}
}

/// Bits needed to entropy-code one channel histogram.
fn estimate_bits(histogram: &[u32; 256]) -> f64 {
	let total: u64 = histogram.iter().map(|&count| u64::from(count)).sum();
	let mut bits = fast_slog2(total);
	for &count in histogram.iter() {
		bits -= fast_slog2(u64::from(count));
	}
	bits
}

fn residual_at(pixels: &[u32], width: usize, x: usize, y: usize, mode: u8) -> u32 {
	let pos = y * width + x;
	let predicted = if x == 0 && y == 0 {
		0xFF00_0000
	} else if y == 0 {
		pixels[pos - 1]
	} else if x == 0 {
		pixels[pos - width]
	} else {
		let left = pixels[pos - 1];
		let top = pixels[pos - width];
		let top_left = pixels[pos - width - 1];
		// At the last column this is the first pixel of the current row,
		// matching what the decoder has reconstructed by then.
		let top_right = pixels[pos - width + 1];
		predict(mode, left, top, top_left, top_right)
	};
	sub_pixels(pixels[pos], predicted)
}

fn select_tile_mode(
	pixels: &[u32],
	width: usize,
	height: usize,
	bits: u32,
	tile_x: usize,
	tile_y: usize,
	num_modes: usize,
) -> u8 {
	let x0 = tile_x << bits;
	let y0 = tile_y << bits;
	let x1 = (x0 + (1 << bits)).min(width);
	let y1 = (y0 + (1 << bits)).min(height);

	let mut best_mode = 0u8;
	let mut best_bits = f64::MAX;
	for mode in 0..num_modes as u8 {
		let mut histograms = [[0u32; 256]; 4];
		for y in y0..y1 {
			for x in x0..x1 {
				let residual = residual_at(pixels, width, x, y, mode);
				histograms[0][(residual >> 24) as usize] += 1;
				histograms[1][(residual >> 16 & 0xFF) as usize] += 1;
				histograms[2][(residual >> 8 & 0xFF) as usize] += 1;
				histograms[3][(residual & 0xFF) as usize] += 1;
			}
		}
		let total: f64 = histograms.iter().map(estimate_bits).sum();
		if total < best_bits {
			best_bits = total;
			best_mode = mode;
		}
	}
	best_mode
}

/// Chooses a prediction mode per tile and produces the residual image plus
/// the mode sub-image. Selection only reads original pixels, so tile rows
/// are evaluated independently.
pub fn apply_predictor_transform(
	pixels: &[u32],
	width: u32,
	height: u32,
	bits: u8,
	num_modes: usize,
) -> (Vec<u32>, Transform) {
	let num_modes = num_modes.clamp(1, NUM_PREDICTORS);
	let tiles_x = subsample_size(width, u32::from(bits)) as usize;
	let tiles_y = subsample_size(height, u32::from(bits)) as usize;
	let w = width as usize;
	let h = height as usize;

	let select_row = |tile_y: usize| -> Vec<u8> {
		(0..tiles_x)
			.map(|tile_x| {
				select_tile_mode(pixels, w, h, u32::from(bits), tile_x, tile_y, num_modes)
			})
			.collect()
	};
	#[cfg(feature = "rayon")]
	let mode_rows: Vec<Vec<u8>> = if w * h >= PARALLEL_THRESHOLD_PIXELS {
		(0..tiles_y).into_par_iter().map(select_row).collect()
	} else {
		(0..tiles_y).map(select_row).collect()
	};
	#[cfg(not(feature = "rayon"))]
	let mode_rows: Vec<Vec<u8>> = (0..tiles_y).map(select_row).collect();

	let tile_image: Vec<u32> = mode_rows
		.iter()
		.flat_map(|row| row.iter().map(|&mode| 0xFF00_0000 | u32::from(mode) << 8))
		.collect();

	let mut residuals = vec![0u32; w * h];
	for y in 0..h {
		let tile_row = &mode_rows[y >> bits];
		for x in 0..w {
			let mode = tile_row[x >> bits];
			residuals[y * w + x] = residual_at(pixels, w, x, y, mode);
		}
	}

	let transform = Transform {
		kind: TransformKind::Predictor,
		bits,
		xsize: width,
		ysize: height,
		data: tile_image,
	};
	(residuals, transform)
}

/// Per-tile cross-color multipliers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Multipliers {
	green_to_red: i8,
	green_to_blue: i8,
	red_to_blue: i8,
}

fn multipliers_to_code(m: Multipliers) -> u32 {
	0xFF00_0000
		| u32::from(m.red_to_blue as u8) << 16
		| u32::from(m.green_to_blue as u8) << 8
		| u32::from(m.green_to_red as u8)
}

#[inline]
fn wrap_abs(byte: u8) -> u64 {
	(byte as i8).unsigned_abs() as u64
}

/// Signed delta of `multiplier` against every possible channel value,
/// computed once per candidate so the tile scan is a table walk.
fn delta_row(multiplier: i8) -> [i32; 256] {
	let mut row = [0i32; 256];
	for (value, slot) in row.iter_mut().enumerate() {
		*slot = color_transform_delta(multiplier, value as u8 as i8);
	}
	row
}

fn search_multiplier(cost: impl Fn(i8) -> u64) -> i8 {
	let mut best = 0i16;
	let mut best_cost = cost(0);
	let mut candidate = -128i16;
	while candidate < 128 {
		if candidate != 0 {
			let c = cost(candidate as i8);
			if c < best_cost {
				best_cost = c;
				best = candidate;
			}
		}
		candidate += 8;
	}
	for offset in -7i16..=7 {
		let candidate = best + offset;
		if offset != 0 && (-128..=127).contains(&candidate) {
			let c = cost(candidate as i8);
			if c < best_cost {
				best_cost = c;
				best = candidate;
			}
		}
	}
	best as i8
}

fn select_tile_multipliers(
	pixels: &[u32],
	width: usize,
	height: usize,
	bits: u32,
	tile_x: usize,
	tile_y: usize,
) -> Multipliers {
	let x0 = tile_x << bits;
	let y0 = tile_y << bits;
	let x1 = (x0 + (1 << bits)).min(width);
	let y1 = (y0 + (1 << bits)).min(height);

	let tile_cost = |f: &dyn Fn(u32, &[i32; 256]) -> u64, deltas: &[i32; 256]| -> u64 {
		let mut sum = 0u64;
		for y in y0..y1 {
			for x in x0..x1 {
				sum += f(pixels[y * width + x], deltas);
			}
		}
		sum
	};

	let green_to_red = search_multiplier(|m| {
		let deltas = delta_row(m);
		tile_cost(
			&|argb, deltas| {
				let red = (argb >> 16) & 0xFF;
				let residual = (red as i32 - deltas[(argb >> 8 & 0xFF) as usize]) & 0xFF;
				wrap_abs(residual as u8)
			},
			&deltas,
		)
	});
	let green_to_blue = search_multiplier(|m| {
		let deltas = delta_row(m);
		tile_cost(
			&|argb, deltas| {
				let blue = argb & 0xFF;
				let residual = (blue as i32 - deltas[(argb >> 8 & 0xFF) as usize]) & 0xFF;
				wrap_abs(residual as u8)
			},
			&deltas,
		)
	});
	let g2b_deltas = delta_row(green_to_blue);
	let red_to_blue = search_multiplier(|m| {
		let deltas = delta_row(m);
		let mut sum = 0u64;
		for y in y0..y1 {
			for x in x0..x1 {
				let argb = pixels[y * width + x];
				let blue = (argb & 0xFF) as i32;
				let residual = (blue
					- g2b_deltas[(argb >> 8 & 0xFF) as usize]
					- deltas[(argb >> 16 & 0xFF) as usize])
					& 0xFF;
				sum += wrap_abs(residual as u8);
			}
		}
		sum
	});

	Multipliers {
		green_to_red,
		green_to_blue,
		red_to_blue,
	}
}

#[inline]
fn forward_cross_color_pixel(argb: u32, m: Multipliers) -> u32 {
	let green = (argb >> 8) as u8 as i8;
	let red = (argb >> 16) as u8 as i8;
	let new_red =
		(((argb >> 16) & 0xFF) as i32 - color_transform_delta(m.green_to_red, green)) & 0xFF;
	let mut new_blue =
		(argb & 0xFF) as i32 - color_transform_delta(m.green_to_blue, green);
	new_blue -= color_transform_delta(m.red_to_blue, red);
	new_blue &= 0xFF;
	(argb & 0xFF00_FF00) | ((new_red as u32) << 16) | new_blue as u32
}

/// Searches per-tile multipliers, applies them, and returns the transform.
pub fn apply_cross_color_transform(
	pixels: &mut [u32],
	width: u32,
	height: u32,
	bits: u8,
) -> Transform {
	let tiles_x = subsample_size(width, u32::from(bits)) as usize;
	let tiles_y = subsample_size(height, u32::from(bits)) as usize;
	let w = width as usize;
	let h = height as usize;

	let snapshot: &[u32] = pixels;
	let select_row = |tile_y: usize| -> Vec<Multipliers> {
		(0..tiles_x)
			.map(|tile_x| select_tile_multipliers(snapshot, w, h, u32::from(bits), tile_x, tile_y))
			.collect()
	};
	#[cfg(feature = "rayon")]
	let rows: Vec<Vec<Multipliers>> = if w * h >= PARALLEL_THRESHOLD_PIXELS {
		(0..tiles_y).into_par_iter().map(select_row).collect()
	} else {
		(0..tiles_y).map(select_row).collect()
	};
	#[cfg(not(feature = "rayon"))]
	let rows: Vec<Vec<Multipliers>> = (0..tiles_y).map(select_row).collect();

	for y in 0..h {
		let tile_row = &rows[y >> bits];
		for x in 0..w {
			let pixel = &mut pixels[y * w + x];
			*pixel = forward_cross_color_pixel(*pixel, tile_row[x >> bits]);
		}
	}

	let tile_image: Vec<u32> = rows
		.iter()
		.flat_map(|row| row.iter().map(|&m| multipliers_to_code(m)))
		.collect();
	Transform {
		kind: TransformKind::CrossColor,
		bits,
		xsize: width,
		ysize: height,
		data: tile_image,
	}
}

/// Collects the distinct colors of an image, sorted ascending.
///
/// Returns `None` when more than 256 colors are present.
pub fn build_palette(pixels: &[u32]) -> Option<Vec<u32>> {
	let mut seen = std::collections::HashSet::with_capacity(257);
	for &pixel in pixels {
		if seen.insert(pixel) && seen.len() > 256 {
			return None;
		}
	}
	let mut palette: Vec<u32> = seen.into_iter().collect();
	palette.sort_unstable();
	Some(palette)
}

/// Replaces pixels by palette indices packed 8/4/2/1 to a stored pixel.
///
/// Returns the packed image and its reduced width.
pub fn apply_palette(
	pixels: &[u32],
	width: u32,
	height: u32,
	palette: &[u32],
) -> (Vec<u32>, u32, u8) {
	let xbits = palette_pack_bits(palette.len());
	let packed_width = subsample_size(width, u32::from(xbits));
	let bits_per_pixel = 8u32 >> xbits;
	let w = width as usize;

	let mut packed = vec![0u32; packed_width as usize * height as usize];
	for y in 0..height as usize {
		let dst_row = y * packed_width as usize;
		for x in 0..w {
			let index = palette
				.binary_search(&pixels[y * w + x])
				.expect("pixel is in its own palette") as u32;
			let slot = dst_row + (x >> xbits);
			let shift = (x as u32 & ((1 << xbits) - 1)) * bits_per_pixel;
			let green = green(packed[slot]);
			packed[slot] = make_argb(0xFF, 0, green | (index << shift) as u8, 0);
		}
	}
	(packed, packed_width, xbits)
}

/// Palette entries are stored delta-coded per channel; the first entry is
/// stored raw.
pub fn delta_encode_palette(palette: &[u32]) -> Vec<u32> {
	let mut stored = Vec::with_capacity(palette.len());
	let mut previous = 0u32;
	for &color in palette {
		stored.push(sub_pixels(color, previous));
		previous = color;
	}
	stored
}
