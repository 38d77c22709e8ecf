//! VP8L bitstream encoder.
//!
//! The pipeline follows the stream layout: analyze the image (palette
//! feasibility, transform selection, tile sizes), apply forward transforms
//! while writing their declarations, then compress the residual image:
//! hash chain, backward references with cache-size search, per-tile
//! histograms clustered into tree groups, canonical prefix codes, and the
//! entropy-coded token stream.
//!
//! Transform parameter images and the tile map are written through the
//! same machinery as plain single-group images without transforms.

use log::debug;

use crate::bitio::BitWriter;
use crate::error::MuxError;

use super::backward_refs::{self, PixOrCopy};
use super::hash_chain::HashChain;
use super::histogram::{self, Histogram};
use super::huffman::{HuffmanTreeCode, create_huffman_tree, store_huffman_code};
use super::transform::TransformKind;
use super::transform::forward;
use super::{
	MAX_ALLOWED_CODE_LENGTH, NUM_LITERAL_CODES, StreamHeader, prefix_encode, subsample_size,
};

/// Tuning knobs of one lossless encode.
#[derive(Debug, Clone, Copy)]
pub struct Vp8lConfig {
	/// Compression quality 0..=100; drives search effort and transform use.
	pub quality: u8,
	/// Encoder method 0..=6; trades speed for density.
	pub method: u8,
	/// Preserve RGB values under fully transparent pixels.
	pub exact: bool,
	/// Near-lossless preprocessing quality; 100 disables it.
	pub near_lossless: u8,
}

impl Default for Vp8lConfig {
	fn default() -> Self {
		Self {
			quality: 75,
			method: 4,
			exact: false,
			near_lossless: 100,
		}
	}
}

/// Reusable lossless encoder handle; owns the hash chain and scratch
/// buffers across calls.
#[derive(Debug, Default)]
pub struct Vp8lEncoder {
	chain: HashChain,
}

/// Largest tile count the per-tile histogram image may reach.
const MAX_HUFF_IMAGE_SIZE: u32 = 2600;
/// Tile-size exponent bounds for the histogram image.
const MIN_HUFFMAN_BITS: u8 = 2;
const MAX_HUFFMAN_BITS: u8 = 9;

impl Vp8lEncoder {
	/// Creates an encoder handle.
	pub fn new() -> Self {
		Self::default()
	}

	/// Encodes `argb` into a complete VP8L payload, header included.
	///
	/// The input is copied, never mutated.
	pub fn encode(
		&mut self,
		argb: &[u32],
		width: u32,
		height: u32,
		config: &Vp8lConfig,
	) -> Result<Vec<u8>, MuxError> {
		check_dimensions(width, height, argb.len())?;
		let has_alpha = argb.iter().any(|&pixel| pixel >> 24 != 0xFF);
		let mut writer = BitWriter::with_capacity(argb.len() / 2 + 64);
		StreamHeader {
			width,
			height,
			has_alpha,
		}
		.write(&mut writer);
		self.encode_stream(argb, width, height, config, &mut writer)?;
		Ok(writer.finish())
	}

	/// Encodes a headerless stream (the ALPH codec's lossless payload).
	pub fn encode_headerless(
		&mut self,
		argb: &[u32],
		width: u32,
		height: u32,
		config: &Vp8lConfig,
	) -> Result<Vec<u8>, MuxError> {
		check_dimensions(width, height, argb.len())?;
		let mut writer = BitWriter::with_capacity(argb.len() / 4 + 64);
		self.encode_stream(argb, width, height, config, &mut writer)?;
		Ok(writer.finish())
	}

	fn encode_stream(
		&mut self,
		argb: &[u32],
		width: u32,
		height: u32,
		config: &Vp8lConfig,
		writer: &mut BitWriter,
	) -> Result<(), MuxError> {
		let quality = config.quality.min(100);
		let method = config.method.min(6);

		// The input is never mutated.
		let mut pixels = argb.to_vec();
		if !config.exact {
			clear_invisible_pixels(&mut pixels);
		}

		let palette = forward::build_palette(&pixels);
		let use_palette = palette.is_some();

		if !use_palette && config.near_lossless < 100 {
			near_lossless_preprocess(&mut pixels, width as usize, height as usize, config.near_lossless);
		}

		// Analysis: which transforms, which tile sizes.
		let use_subtract_green = !use_palette && quality >= 25;
		let use_predict =
			(!use_palette && quality >= 10) || (use_palette && method >= 5 && quality >= 75);
		let use_cross_color = !use_palette && quality >= 50;
		let mut histo_bits = histo_bits_for(method, use_palette, width, height);
		let transform_bits = transform_bits_for(method, histo_bits);
		debug!(
			"analysis: palette={use_palette} subtract_green={use_subtract_green} \
			 predict={use_predict} cross_color={use_cross_color} histo_bits={histo_bits}"
		);

		let mut cur_width = width;

		if let Some(palette) = &palette {
			// Color indexing: declared first, then pixels shrink to the
			// packed width for everything downstream.
			let (packed, packed_width, xbits) =
				forward::apply_palette(&pixels, width, height, palette);
			writer.write_bits(1, 1);
			writer.write_bits(TransformKind::ColorIndexing as u32, 2);
			writer.write_bits(palette.len() as u32 - 1, 8);
			let stored = forward::delta_encode_palette(palette);
			self.encode_plain_image(&stored, palette.len() as u32, 1, writer);
			debug_assert_eq!(packed_width, subsample_size(width, u32::from(xbits)));
			pixels = packed;
			cur_width = packed_width;
		}

		if use_subtract_green {
			forward::subtract_green(&mut pixels);
			writer.write_bits(1, 1);
			writer.write_bits(TransformKind::SubtractGreen as u32, 2);
		}

		if use_predict {
			let num_modes = predictor_modes_for(quality);
			let (residuals, transform) = forward::apply_predictor_transform(
				&pixels,
				cur_width,
				height,
				transform_bits,
				num_modes,
			);
			pixels = residuals;
			writer.write_bits(1, 1);
			writer.write_bits(TransformKind::Predictor as u32, 2);
			writer.write_bits(u32::from(transform.bits) - 2, 3);
			self.encode_plain_image(&transform.data, transform.tiles_x(), tiles_of(height, transform.bits), writer);
		}

		if use_cross_color {
			let transform =
				forward::apply_cross_color_transform(&mut pixels, cur_width, height, transform_bits);
			writer.write_bits(1, 1);
			writer.write_bits(TransformKind::CrossColor as u32, 2);
			writer.write_bits(u32::from(transform.bits) - 2, 3);
			self.encode_plain_image(&transform.data, transform.tiles_x(), tiles_of(height, transform.bits), writer);
		}

		// End of transforms.
		writer.write_bits(0, 1);

		// Backward references over the residual image.
		let max_cache_bits = if method == 0 { 0 } else { super::MAX_COLOR_CACHE_BITS };
		self.chain.fill(&pixels, quality, cur_width as usize, height as usize);
		let (refs, cache_bits) = backward_refs::get_backward_references(
			&pixels,
			cur_width,
			height,
			quality,
			max_cache_bits,
			&self.chain,
		);

		// Color cache configuration.
		if cache_bits > 0 {
			writer.write_bits(1, 1);
			writer.write_bits(u32::from(cache_bits), 4);
		} else {
			writer.write_bits(0, 1);
		}

		// Histogram clustering into tree groups.
		let tile_histograms =
			histogram::build_tile_histograms(&refs, cur_width, height, histo_bits, cache_bits);
		let mut clustered = histogram::cluster_histograms(tile_histograms, quality);

		if clustered.groups.len() > 1 {
			// Larger tiles are cheaper to signal when the map allows it.
			histo_bits = optimize_sampling(&mut clustered.symbols, cur_width, height, histo_bits);
			writer.write_bits(1, 1);
			writer.write_bits(u32::from(histo_bits) - 2, 3);
			let tiles_x = subsample_size(cur_width, u32::from(histo_bits));
			let tiles_y = subsample_size(height, u32::from(histo_bits));
			let meta_image: Vec<u32> = clustered
				.symbols
				.iter()
				.map(|&symbol| 0xFF00_0000 | u32::from(symbol) << 8)
				.collect();
			debug_assert_eq!(meta_image.len(), (tiles_x * tiles_y) as usize);
			self.encode_plain_image(&meta_image, tiles_x, tiles_y, writer);
		} else {
			writer.write_bits(0, 1);
		}

		// Prefix codes per group, then the token stream.
		let group_codes: Vec<GroupCodes> =
			clustered.groups.iter().map(GroupCodes::from_histogram).collect();
		for codes in &group_codes {
			codes.store(writer);
		}
		write_tokens(
			writer,
			&refs,
			cur_width,
			if clustered.groups.len() > 1 {
				Some((histo_bits, clustered.symbols.as_slice()))
			} else {
				None
			},
			&group_codes,
		);
		Ok(())
	}

	/// Encodes a parameter sub-image: no transforms, no meta codes, no
	/// color cache, a single tree group.
	fn encode_plain_image(&mut self, pixels: &[u32], width: u32, height: u32, writer: &mut BitWriter) {
		writer.write_bits(0, 1); // no color cache

		let mut refs = backward_refs::lz77_rle(pixels, width as usize, 0);
		backward_refs::refs_to_plane_codes(&mut refs, width);
		let mut histogram = Histogram::new(0);
		for token in &refs {
			histogram.add(token, None);
		}
		let codes = GroupCodes::from_histogram(&histogram);
		codes.store(writer);
		write_tokens(writer, &refs, width, None, std::slice::from_ref(&codes));
	}
}

/// The five stored prefix codes of one tree group.
#[derive(Debug)]
struct GroupCodes {
	green: HuffmanTreeCode,
	red: HuffmanTreeCode,
	blue: HuffmanTreeCode,
	alpha: HuffmanTreeCode,
	distance: HuffmanTreeCode,
}

impl GroupCodes {
	fn from_histogram(histogram: &Histogram) -> Self {
		Self {
			green: create_huffman_tree(&histogram.literal, MAX_ALLOWED_CODE_LENGTH),
			red: create_huffman_tree(&histogram.red, MAX_ALLOWED_CODE_LENGTH),
			blue: create_huffman_tree(&histogram.blue, MAX_ALLOWED_CODE_LENGTH),
			alpha: create_huffman_tree(&histogram.alpha, MAX_ALLOWED_CODE_LENGTH),
			distance: create_huffman_tree(&histogram.distance, MAX_ALLOWED_CODE_LENGTH),
		}
	}

	fn store(&self, writer: &mut BitWriter) {
		store_huffman_code(writer, &self.green);
		store_huffman_code(writer, &self.red);
		store_huffman_code(writer, &self.blue);
		store_huffman_code(writer, &self.alpha);
		store_huffman_code(writer, &self.distance);
	}
}

/// Writes the token stream; `meta` selects the tree group per start pixel.
fn write_tokens(
	writer: &mut BitWriter,
	refs: &[PixOrCopy],
	width: u32,
	meta: Option<(u8, &[u16])>,
	group_codes: &[GroupCodes],
) {
	let tiles_x = meta.map(|(bits, _)| subsample_size(width, u32::from(bits)) as usize);
	let mut x = 0usize;
	let mut y = 0usize;
	for token in refs {
		let codes = match meta {
			Some((bits, symbols)) => {
				let tile = (y >> bits) * tiles_x.expect("tiles when meta") + (x >> bits);
				&group_codes[symbols[tile] as usize]
			}
			None => &group_codes[0],
		};
		match *token {
			PixOrCopy::Literal(argb) => {
				codes.green.write_symbol(writer, (argb >> 8 & 0xFF) as usize);
				codes.red.write_symbol(writer, (argb >> 16 & 0xFF) as usize);
				codes.blue.write_symbol(writer, (argb & 0xFF) as usize);
				codes.alpha.write_symbol(writer, (argb >> 24) as usize);
			}
			PixOrCopy::CacheIdx(index) => {
				codes.green.write_symbol(
					writer,
					NUM_LITERAL_CODES + super::NUM_LENGTH_CODES + index as usize,
				);
			}
			PixOrCopy::Copy {
				length,
				distance,
			} => {
				let (length_code, length_extra_bits, length_extra) = prefix_encode(length);
				codes
					.green
					.write_symbol(writer, NUM_LITERAL_CODES + length_code as usize);
				if length_extra_bits > 0 {
					writer.write_bits(length_extra, length_extra_bits);
				}
				let (distance_code, distance_extra_bits, distance_extra) =
					prefix_encode(distance);
				codes.distance.write_symbol(writer, distance_code as usize);
				if distance_extra_bits > 0 {
					writer.write_bits(distance_extra, distance_extra_bits);
				}
			}
		}
		let mut advance = token.pixel_span();
		while advance > 0 {
			let step = advance.min(width as usize - x);
			x += step;
			advance -= step;
			if x == width as usize {
				x = 0;
				y += 1;
			}
		}
	}
}

fn check_dimensions(width: u32, height: u32, len: usize) -> Result<(), MuxError> {
	if width == 0 || height == 0 || width > 16383 || height > 16383 {
		return Err(MuxError::DimensionsTooLarge {
			width,
			height,
		});
	}
	let expected = width as usize * height as usize;
	if len != expected {
		return Err(MuxError::BufferSizeMismatch {
			expected,
			actual: len,
		});
	}
	Ok(())
}

/// RGB under fully transparent pixels is free; zeroing it compresses best.
fn clear_invisible_pixels(pixels: &mut [u32]) {
	for pixel in pixels.iter_mut() {
		if *pixel >> 24 == 0 {
			*pixel = 0;
		}
	}
}

fn histo_bits_for(method: u8, use_palette: bool, width: u32, height: u32) -> u8 {
	let base: i32 = if use_palette { 9 } else { 7 };
	let mut bits = (base - i32::from(method)).clamp(
		i32::from(MIN_HUFFMAN_BITS),
		i32::from(MAX_HUFFMAN_BITS),
	) as u8;
	while bits < MAX_HUFFMAN_BITS {
		let tiles = subsample_size(width, u32::from(bits)) * subsample_size(height, u32::from(bits));
		if tiles <= MAX_HUFF_IMAGE_SIZE {
			break;
		}
		bits += 1;
	}
	bits
}

fn transform_bits_for(method: u8, histo_bits: u8) -> u8 {
	let max_bits = if method < 4 {
		6
	} else if method > 4 {
		4
	} else {
		5
	};
	histo_bits.min(max_bits).clamp(2, 5)
}

fn predictor_modes_for(quality: u8) -> usize {
	if quality >= 75 {
		14
	} else if quality >= 25 {
		10
	} else {
		4
	}
}

fn tiles_of(size: u32, bits: u8) -> u32 {
	subsample_size(size, u32::from(bits))
}

/// Tries doubling the tile size while the tile → group map stays uniform
/// within every doubled tile; rewrites `symbols` and returns the final
/// tile-size exponent.
fn optimize_sampling(symbols: &mut Vec<u16>, width: u32, height: u32, mut histo_bits: u8) -> u8 {
	while histo_bits < MAX_HUFFMAN_BITS {
		let old_tiles_x = subsample_size(width, u32::from(histo_bits)) as usize;
		let old_tiles_y = subsample_size(height, u32::from(histo_bits)) as usize;
		let new_tiles_x = subsample_size(width, u32::from(histo_bits) + 1) as usize;
		let new_tiles_y = subsample_size(height, u32::from(histo_bits) + 1) as usize;
		if new_tiles_x == old_tiles_x && new_tiles_y == old_tiles_y {
			break;
		}
		let mut merged = vec![0u16; new_tiles_x * new_tiles_y];
		let mut uniform = true;
		'scan: for new_ty in 0..new_tiles_y {
			for new_tx in 0..new_tiles_x {
				let mut symbol: Option<u16> = None;
				for dy in 0..2 {
					for dx in 0..2 {
						let ty = new_ty * 2 + dy;
						let tx = new_tx * 2 + dx;
						if ty >= old_tiles_y || tx >= old_tiles_x {
							continue;
						}
						let value = symbols[ty * old_tiles_x + tx];
						match symbol {
							None => symbol = Some(value),
							Some(existing) if existing != value => {
								uniform = false;
								break 'scan;
							}
							Some(_) => {}
						}
					}
				}
				merged[new_ty * new_tiles_x + new_tx] = symbol.unwrap_or(0);
			}
		}
		if !uniform {
			break;
		}
		*symbols = merged;
		histo_bits += 1;
	}
	histo_bits
}

/// Multi-pass near-lossless quantization: values snap to a coarser grid
/// with carry-aware rounding unless the pixel sits in a smooth
/// 4-neighborhood that quantization would visibly disturb.
fn near_lossless_preprocess(pixels: &mut [u32], width: usize, height: usize, quality: u8) {
	let limit_bits = 5u8.saturating_sub(quality / 20).min(5);
	if limit_bits == 0 || width < 3 || height < 3 {
		return;
	}
	for bits in (1..=limit_bits).rev() {
		near_lossless_pass(pixels, width, height, bits);
	}
}

fn near_lossless_pass(pixels: &mut [u32], width: usize, height: usize, bits: u8) {
	let limit = 1i32 << bits;
	let source = pixels.to_vec();
	for y in 1..height - 1 {
		for x in 1..width - 1 {
			let pos = y * width + x;
			let center = source[pos];
			let smooth = [source[pos - 1], source[pos + 1], source[pos - width], source[pos + width]]
				.iter()
				.all(|&neighbor| is_near(center, neighbor, limit));
			if !smooth {
				pixels[pos] = closest_discretized(center, bits);
			}
		}
	}
}

fn is_near(a: u32, b: u32, limit: i32) -> bool {
	for shift in [24, 16, 8, 0] {
		let diff = (a >> shift & 0xFF) as i32 - (b >> shift & 0xFF) as i32;
		if diff.abs() >= limit {
			return false;
		}
	}
	true
}

fn closest_discretized(argb: u32, bits: u8) -> u32 {
	let mask = (1u32 << bits) - 1;
	let mut result = 0u32;
	for shift in [24, 16, 8, 0] {
		let channel = argb >> shift & 0xFF;
		let biased = channel + (mask >> 1) + (channel >> bits & 1);
		let snapped = if biased > 0xFF { 0xFF } else { biased & !mask };
		result |= snapped << shift;
	}
	result
}
