//! VP8L bitstream decoder.
//!
//! Decoding walks the stream in layers: fixed header, transform list,
//! color-cache configuration, the meta-prefix tile map, five prefix codes
//! per tree group, then the entropy-coded pixel loop. Transform parameter
//! images and the tile map are themselves entropy-coded images and are
//! decoded through the same routine, minus transforms and meta codes.
//!
//! The decoder owns reusable storage (the Huffman table slab and the tree
//! group vector) so repeated decodes through one handle avoid
//! reallocation. Corrupt or truncated input surfaces as an error; the
//! pixel loop checks the reader's end-of-stream latch and every backward
//! reference before touching the buffer.

use crate::bitio::BitReader;
use crate::error::LosslessError;

use super::color_cache::ColorCache;
use super::huffman::{self, HuffmanTables};
use super::transform::inverse::apply_inverse;
use super::transform::{Transform, TransformKind, palette_pack_bits};
use super::{
	CODES_PER_GROUP, MAX_CACHE_BITS_DECODE, NUM_DISTANCE_CODES, NUM_LENGTH_CODES,
	NUM_LITERAL_CODES, StreamHeader, add_pixels, plane_code_to_distance, prefix_decode,
	prefix_extra_bits, subsample_size,
};

/// A fully decoded lossless image.
#[derive(Debug, Clone)]
pub struct DecodedImage {
	/// Width in pixels.
	pub width: u32,
	/// Height in pixels.
	pub height: u32,
	/// ARGB pixels, row-major.
	pub pixels: Vec<u32>,
	/// The header's alpha hint.
	pub has_alpha: bool,
}

/// One meta-prefix tree group: five decode-table roots plus fast-path
/// precomputation.
#[derive(Debug, Clone, Default)]
struct HTreeGroup {
	roots: [usize; CODES_PER_GROUP],
	/// Red, blue and alpha are each a single symbol.
	is_trivial_literal: bool,
	/// Alpha/red/blue of the trivial literal, green slot zero.
	literal_arb: u32,
	/// Green is also a single literal symbol: pixels cost zero bits.
	is_trivial_code: bool,
	/// All green code lengths fit six bits; use the 64-entry packed table.
	use_packed_table: bool,
	packed_table: Vec<PackedEntry>,
}

/// Packed-table entry: either a complete ARGB literal or a deferred symbol.
#[derive(Debug, Clone, Copy, Default)]
struct PackedEntry {
	bits: u8,
	/// Symbol when not a literal.
	symbol: u16,
	is_literal: bool,
	argb: u32,
}

const PACKED_TABLE_BITS: u32 = 6;
const PACKED_TABLE_SIZE: usize = 1 << PACKED_TABLE_BITS;

/// Reusable lossless decoder handle.
#[derive(Debug, Default)]
pub struct Vp8lDecoder {
	tables: HuffmanTables,
	groups: Vec<HTreeGroup>,
}

impl Vp8lDecoder {
	/// Creates a decoder with pre-sized scratch storage.
	pub fn new() -> Self {
		Self {
			tables: HuffmanTables::new(),
			groups: Vec::new(),
		}
	}

	/// Decodes a complete VP8L payload (header included).
	pub fn decode(&mut self, data: &[u8]) -> Result<DecodedImage, LosslessError> {
		let header = StreamHeader::from_bytes(data)?;
		let mut reader = BitReader::new(data);
		// Skip the 40 header bits re-validated above.
		reader.read_bits(8);
		reader.read_bits(14);
		reader.read_bits(14);
		reader.read_bits(1);
		reader.read_bits(3);

		self.tables.clear();
		let pixels =
			self.decode_image_stream(header.width, header.height, &mut reader, true)?;
		Ok(DecodedImage {
			width: header.width,
			height: header.height,
			pixels,
			has_alpha: header.has_alpha,
		})
	}

	/// Decodes a headerless stream at known dimensions; the ALPH codec
	/// stores its lossless-compressed plane this way.
	pub fn decode_headerless(
		&mut self,
		width: u32,
		height: u32,
		data: &[u8],
	) -> Result<Vec<u32>, LosslessError> {
		let mut reader = BitReader::new(data);
		self.tables.clear();
		self.decode_image_stream(width, height, &mut reader, true)
	}

	/// Decodes one entropy-coded image; `is_level0` enables transforms and
	/// the meta-prefix map.
	fn decode_image_stream(
		&mut self,
		width: u32,
		height: u32,
		reader: &mut BitReader<'_>,
		is_level0: bool,
	) -> Result<Vec<u32>, LosslessError> {
		let mut cur_width = width;
		let mut transforms: Vec<Transform> = Vec::new();
		if is_level0 {
			let mut seen = 0u8;
			while reader.read_bit() {
				if reader.is_eos() || transforms.len() >= super::MAX_TRANSFORMS {
					return Err(LosslessError::InvalidTransform);
				}
				let kind = TransformKind::from_bits(reader.read_bits(2))?;
				if seen & (1 << kind as u8) != 0 {
					return Err(LosslessError::InvalidTransform);
				}
				seen |= 1 << kind as u8;
				let transform = self.read_transform(kind, cur_width, height, reader)?;
				if kind == TransformKind::ColorIndexing {
					cur_width = transform.packed_width();
				}
				transforms.push(transform);
			}
			if reader.is_eos() {
				return Err(LosslessError::Truncated);
			}
		}

		// Color cache configuration.
		let cache_bits = if reader.read_bit() {
			let bits = reader.read_bits(4) as u8;
			if !(1..=MAX_CACHE_BITS_DECODE).contains(&bits) {
				return Err(LosslessError::InvalidColorCacheBits(bits));
			}
			bits
		} else {
			0
		};

		// Meta-prefix map (level 0 only).
		let mut meta: Option<(Vec<u32>, u32)> = None;
		let mut num_groups = 1usize;
		if is_level0 && reader.read_bit() {
			let huffman_bits = reader.read_bits(3) + 2;
			let meta_width = subsample_size(cur_width, huffman_bits);
			let meta_height = subsample_size(height, huffman_bits);
			let image = self.decode_image_stream(meta_width, meta_height, reader, false)?;
			let mut max_index = 0usize;
			for pixel in &image {
				max_index = max_index.max((pixel >> 8 & 0xFFFF) as usize);
			}
			num_groups = max_index + 1;
			meta = Some((image, huffman_bits));
		}
		if reader.is_eos() {
			return Err(LosslessError::Truncated);
		}

		let groups = self.read_htree_groups(num_groups, cache_bits, reader)?;
		let pixels =
			self.decode_pixels(cur_width, height, cache_bits, &groups, meta.as_ref(), reader);
		// Hand the group storage back to the handle for the next decode.
		self.groups = groups;
		let mut pixels = pixels?;
		for transform in transforms.iter().rev() {
			pixels = apply_inverse(transform, pixels);
		}
		Ok(pixels)
	}

	fn read_transform(
		&mut self,
		kind: TransformKind,
		cur_width: u32,
		height: u32,
		reader: &mut BitReader<'_>,
	) -> Result<Transform, LosslessError> {
		match kind {
			TransformKind::Predictor | TransformKind::CrossColor => {
				let bits = (reader.read_bits(3) + 2) as u8;
				let tiles_x = subsample_size(cur_width, u32::from(bits));
				let tiles_y = subsample_size(height, u32::from(bits));
				let data = self.decode_image_stream(tiles_x, tiles_y, reader, false)?;
				Ok(Transform {
					kind,
					bits,
					xsize: cur_width,
					ysize: height,
					data,
				})
			}
			TransformKind::SubtractGreen => Ok(Transform {
				kind,
				bits: 0,
				xsize: cur_width,
				ysize: height,
				data: Vec::new(),
			}),
			TransformKind::ColorIndexing => {
				let num_colors = reader.read_bits(8) as usize + 1;
				let stored = self.decode_image_stream(num_colors as u32, 1, reader, false)?;
				// Palette entries are delta-coded against their predecessor.
				let mut palette = Vec::with_capacity(num_colors);
				let mut previous = 0u32;
				for &delta in &stored {
					previous = add_pixels(delta, previous);
					palette.push(previous);
				}
				Ok(Transform {
					kind,
					bits: palette_pack_bits(num_colors),
					xsize: cur_width,
					ysize: height,
					data: palette,
				})
			}
		}
	}

	fn read_htree_groups(
		&mut self,
		num_groups: usize,
		cache_bits: u8,
		reader: &mut BitReader<'_>,
	) -> Result<Vec<HTreeGroup>, LosslessError> {
		let cache_size = if cache_bits > 0 { 1usize << cache_bits } else { 0 };
		let alphabet_sizes = [
			NUM_LITERAL_CODES + NUM_LENGTH_CODES + cache_size,
			NUM_LITERAL_CODES,
			NUM_LITERAL_CODES,
			NUM_LITERAL_CODES,
			NUM_DISTANCE_CODES,
		];
		self.groups.clear();
		let mut groups = std::mem::take(&mut self.groups);
		for _ in 0..num_groups {
			let mut group = HTreeGroup::default();
			for (slot, &alphabet) in alphabet_sizes.iter().enumerate() {
				group.roots[slot] = huffman::read_huffman_code(alphabet, reader, &mut self.tables)?;
			}
			self.classify_group(&mut group);
			groups.push(group);
		}
		Ok(groups)
	}

	/// Single-symbol probe: a zero-bit root entry means the whole tree is
	/// one symbol.
	fn single_symbol(&self, root: usize) -> Option<u16> {
		let entry = self.tables.entries()[root];
		if entry.bits == 0 { Some(entry.value) } else { None }
	}

	fn classify_group(&self, group: &mut HTreeGroup) {
		let red = self.single_symbol(group.roots[1]);
		let blue = self.single_symbol(group.roots[2]);
		let alpha = self.single_symbol(group.roots[3]);
		if let (Some(red), Some(blue), Some(alpha)) = (red, blue, alpha) {
			group.is_trivial_literal = true;
			group.literal_arb =
				u32::from(alpha) << 24 | u32::from(red) << 16 | u32::from(blue);
			if let Some(green) = self.single_symbol(group.roots[0]) {
				if green < NUM_LITERAL_CODES as u16 {
					group.is_trivial_code = true;
					group.literal_arb |= u32::from(green) << 8;
					return;
				}
			}
			// Packed fast path: every green code resolves within six bits.
			let entries = self.tables.entries();
			let root = group.roots[0];
			let all_short = (0..1usize << huffman::HUFFMAN_TABLE_BITS)
				.all(|key| (1..=PACKED_TABLE_BITS as u8).contains(&entries[root + key].bits));
			if all_short {
				group.use_packed_table = true;
				group.packed_table = (0..PACKED_TABLE_SIZE)
					.map(|key| {
						let entry = entries[root + key];
						let symbol = entry.value;
						if (symbol as usize) < NUM_LITERAL_CODES {
							PackedEntry {
								bits: entry.bits,
								symbol,
								is_literal: true,
								argb: group.literal_arb | u32::from(symbol) << 8,
							}
						} else {
							PackedEntry {
								bits: entry.bits,
								symbol,
								is_literal: false,
								argb: 0,
							}
						}
					})
					.collect();
			}
		}
	}

	#[allow(clippy::too_many_arguments)]
	fn decode_pixels(
		&mut self,
		width: u32,
		height: u32,
		cache_bits: u8,
		groups: &[HTreeGroup],
		meta: Option<&(Vec<u32>, u32)>,
		reader: &mut BitReader<'_>,
	) -> Result<Vec<u32>, LosslessError> {
		let total = width as usize * height as usize;
		let mut pixels = vec![0u32; total];
		let mut cache = if cache_bits > 0 { Some(ColorCache::new(cache_bits)) } else { None };
		let cache_limit =
			NUM_LITERAL_CODES + NUM_LENGTH_CODES + cache.as_ref().map_or(0, ColorCache::len);

		let meta_width = meta.map(|(_, bits)| subsample_size(width, *bits));
		let mut group = &groups[0];
		let mut pos = 0usize;
		let mut x = 0usize;
		let mut y = 0usize;
		while pos < total {
			if let Some((image, bits)) = meta {
				let meta_pixel =
					image[(y >> bits) * meta_width.expect("meta width") as usize + (x >> bits)];
				let index = (meta_pixel >> 8 & 0xFFFF) as usize;
				group = &groups[index];
			}

			if group.is_trivial_code {
				pixels[pos] = group.literal_arb;
				if let Some(cache) = &mut cache {
					cache.insert(group.literal_arb);
				}
				pos += 1;
				x += 1;
				if x == width as usize {
					x = 0;
					y += 1;
				}
				continue;
			}

			let code = if group.use_packed_table {
				let key = (reader.prefetch_bits() & (PACKED_TABLE_SIZE as u32 - 1)) as usize;
				let entry = group.packed_table[key];
				reader.set_bit_pos(u32::from(entry.bits));
				if entry.is_literal {
					if reader.is_eos() {
						return Err(LosslessError::Truncated);
					}
					pixels[pos] = entry.argb;
					if let Some(cache) = &mut cache {
						cache.insert(entry.argb);
					}
					pos += 1;
					x += 1;
					if x == width as usize {
						x = 0;
						y += 1;
					}
					continue;
				}
				entry.symbol as usize
			} else {
				self.tables.read_symbol(group.roots[0], reader) as usize
			};
			if reader.is_eos() {
				return Err(LosslessError::Truncated);
			}

			if code < NUM_LITERAL_CODES {
				let (red, blue, alpha) = if group.is_trivial_literal {
					(
						group.literal_arb >> 16 & 0xFF,
						group.literal_arb & 0xFF,
						group.literal_arb >> 24,
					)
				} else {
					let red = u32::from(self.tables.read_symbol(group.roots[1], reader));
					let blue = u32::from(self.tables.read_symbol(group.roots[2], reader));
					let alpha = u32::from(self.tables.read_symbol(group.roots[3], reader));
					(red, blue, alpha)
				};
				if reader.is_eos() {
					return Err(LosslessError::Truncated);
				}
				let argb = alpha << 24 | red << 16 | (code as u32) << 8 | blue;
				pixels[pos] = argb;
				if let Some(cache) = &mut cache {
					cache.insert(argb);
				}
				pos += 1;
				x += 1;
				if x == width as usize {
					x = 0;
					y += 1;
				}
			} else if code < NUM_LITERAL_CODES + NUM_LENGTH_CODES {
				let length_symbol = (code - NUM_LITERAL_CODES) as u32;
				let length_extra = reader.read_bits(prefix_extra_bits(length_symbol));
				let length = prefix_decode(length_symbol, length_extra) as usize;

				let distance_symbol =
					u32::from(self.tables.read_symbol(group.roots[4], reader));
				let distance_extra = reader.read_bits(prefix_extra_bits(distance_symbol));
				let distance_code = prefix_decode(distance_symbol, distance_extra);
				if reader.is_eos() {
					return Err(LosslessError::Truncated);
				}
				let distance = plane_code_to_distance(width, distance_code) as usize;
				if distance == 0 || distance > pos || length > total - pos {
					return Err(LosslessError::InvalidBackwardReference {
						distance: distance as u64,
						position: pos,
					});
				}

				copy_block(&mut pixels, pos, distance, length);
				if let Some(cache) = &mut cache {
					for offset in 0..length {
						cache.insert(pixels[pos + offset]);
					}
				}
				pos += length;
				x += length;
				while x >= width as usize {
					x -= width as usize;
					y += 1;
				}
			} else {
				if code >= cache_limit {
					return Err(LosslessError::BitstreamCorrupt);
				}
				let cache_ref = cache.as_mut().ok_or(LosslessError::BitstreamCorrupt)?;
				let key = (code - NUM_LITERAL_CODES - NUM_LENGTH_CODES) as u32;
				pixels[pos] = cache_ref.lookup(key);
				pos += 1;
				x += 1;
				if x == width as usize {
					x = 0;
					y += 1;
				}
			}
		}
		if reader.is_eos() {
			return Err(LosslessError::Truncated);
		}
		Ok(pixels)
	}
}

/// Backward copy with the three shapes the reference layouts need:
/// repeated fill at distance one, plain copy when ranges are disjoint,
/// doubling copy when they overlap.
fn copy_block(pixels: &mut [u32], pos: usize, distance: usize, length: usize) {
	if distance == 1 {
		let value = pixels[pos - 1];
		pixels[pos..pos + length].fill(value);
	} else if distance >= length {
		pixels.copy_within(pos - distance..pos - distance + length, pos);
	} else {
		for offset in 0..length {
			pixels[pos + offset] = pixels[pos + offset - distance];
		}
	}
}
