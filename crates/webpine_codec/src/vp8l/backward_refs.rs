//! Backward-reference token streams and the strategy selection around them.
//!
//! Three LZ77 flavors produce candidate token streams: the standard
//! hash-chain walk, a run-length-only coder, and a "box" coder restricted
//! to distances with small plane codes. Each candidate is priced with a
//! histogram estimate; the winner then gets a brute-force color-cache-size
//! search and, at higher qualities, the cost-model TraceBackwards rewrite.
//!
//! Distances stay raw pixel offsets through every comparison; the final
//! pass converts them to plane codes.

use log::debug;

use super::color_cache::ColorCache;
use super::cost_model;
use super::hash_chain::HashChain;
use super::histogram::{Histogram, cache_key_max};
use super::{MAX_LENGTH, MIN_LENGTH, distance_to_plane_code};

/// One token of the entropy-coded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixOrCopy {
	/// A literal ARGB pixel.
	Literal(u32),
	/// A color-cache hit.
	CacheIdx(u32),
	/// A backward copy; `distance` is a raw pixel offset until the final
	/// plane-code pass.
	Copy {
		/// Number of pixels copied, 1..=4095.
		length: u32,
		/// Backward distance in pixels, >= 1.
		distance: u32,
	},
}

impl PixOrCopy {
	/// Number of pixels this token emits.
	#[inline]
	pub fn pixel_span(&self) -> usize {
		match *self {
			PixOrCopy::Copy {
				length, ..
			} => length as usize,
			_ => 1,
		}
	}
}

fn match_length(argb: &[u32], pos1: usize, pos2: usize, max_len: usize) -> usize {
	let mut len = 0usize;
	while len < max_len && argb[pos1 + len] == argb[pos2 + len] {
		len += 1;
	}
	len
}

/// Emits a single pixel as cache hit or literal and tracks the cache the
/// decoder will maintain.
fn push_pixel(refs: &mut Vec<PixOrCopy>, cache: &mut Option<ColorCache>, argb: u32) {
	if let Some(cache) = cache {
		if let Some(key) = cache.contains(argb) {
			refs.push(PixOrCopy::CacheIdx(key));
		} else {
			refs.push(PixOrCopy::Literal(argb));
		}
		cache.insert(argb);
	} else {
		refs.push(PixOrCopy::Literal(argb));
	}
}

fn insert_copied_pixels(cache: &mut Option<ColorCache>, argb: &[u32], start: usize, len: usize) {
	if let Some(cache) = cache {
		for &pixel in &argb[start..start + len] {
			cache.insert(pixel);
		}
	}
}

fn new_cache(cache_bits: u8) -> Option<ColorCache> {
	if cache_bits > 0 { Some(ColorCache::new(cache_bits)) } else { None }
}

/// Standard LZ77 over the hash chain.
pub fn lz77_standard(argb: &[u32], chain: &HashChain, cache_bits: u8) -> Vec<PixOrCopy> {
	let size = argb.len();
	let mut refs = Vec::new();
	let mut cache = new_cache(cache_bits);
	let mut i = 0usize;
	while i < size {
		let len = chain.length_at(i);
		if len >= MIN_LENGTH {
			let distance = chain.distance_at(i) as u32;
			refs.push(PixOrCopy::Copy {
				length: len as u32,
				distance,
			});
			insert_copied_pixels(&mut cache, argb, i, len);
			i += len;
		} else {
			push_pixel(&mut refs, &mut cache, argb[i]);
			i += 1;
		}
	}
	refs
}

/// Run-length coder: distance-1 runs plus vertical repeats of the row above.
pub fn lz77_rle(argb: &[u32], xsize: usize, cache_bits: u8) -> Vec<PixOrCopy> {
	let size = argb.len();
	let mut refs = Vec::new();
	let mut cache = new_cache(cache_bits);
	if size == 0 {
		return refs;
	}
	push_pixel(&mut refs, &mut cache, argb[0]);
	let mut i = 1usize;
	while i < size {
		let max_len = (size - i).min(MAX_LENGTH);
		let rle_len = match_length(argb, i, i - 1, max_len);
		let prev_row_len = if i < xsize {
			0
		} else {
			match_length(argb, i, i - xsize, max_len)
		};
		if rle_len >= prev_row_len && rle_len >= MIN_LENGTH {
			refs.push(PixOrCopy::Copy {
				length: rle_len as u32,
				distance: 1,
			});
			insert_copied_pixels(&mut cache, argb, i, rle_len);
			i += rle_len;
		} else if prev_row_len >= MIN_LENGTH {
			refs.push(PixOrCopy::Copy {
				length: prev_row_len as u32,
				distance: xsize as u32,
			});
			insert_copied_pixels(&mut cache, argb, i, prev_row_len);
			i += prev_row_len;
		} else {
			push_pixel(&mut refs, &mut cache, argb[i]);
			i += 1;
		}
	}
	refs
}

/// Distances whose plane code lands in the cheap low range.
fn box_candidate_distances(xsize: usize) -> Vec<usize> {
	let mut candidates = Vec::new();
	let upper = 7 * xsize + 9;
	for distance in 1..=upper {
		if distance_to_plane_code(xsize as u32, distance as u32) <= 32 {
			candidates.push(distance);
		}
	}
	candidates
}

/// Box LZ77: matches restricted to the 2D neighborhood whose plane codes
/// entropy-code cheaply.
pub fn lz77_box(argb: &[u32], xsize: usize, cache_bits: u8) -> Vec<PixOrCopy> {
	let size = argb.len();
	let candidates = box_candidate_distances(xsize);
	let mut refs = Vec::new();
	let mut cache = new_cache(cache_bits);
	let mut i = 0usize;
	while i < size {
		let max_len = (size - i).min(MAX_LENGTH);
		let mut best_len = 0usize;
		let mut best_distance = 0usize;
		for &distance in &candidates {
			if distance > i {
				break;
			}
			let len = match_length(argb, i - distance, i, max_len);
			if len > best_len {
				best_len = len;
				best_distance = distance;
			}
		}
		if best_len >= MIN_LENGTH {
			refs.push(PixOrCopy::Copy {
				length: best_len as u32,
				distance: best_distance as u32,
			});
			insert_copied_pixels(&mut cache, argb, i, best_len);
			i += best_len;
		} else {
			push_pixel(&mut refs, &mut cache, argb[i]);
			i += 1;
		}
	}
	refs
}

/// Histogram-estimated cost of a token stream, pricing distances as the
/// plane codes they will become.
pub fn estimate_refs_bits(refs: &[PixOrCopy], xsize: u32, cache_bits: u8) -> f64 {
	let mut histogram = Histogram::new(cache_bits);
	for token in refs {
		histogram.add(token, Some(xsize));
	}
	histogram.update_cost();
	histogram.bit_cost
}

/// Brute-force search of the best color-cache size over `refs`, which must
/// have been built without a cache.
///
/// Keys for every cache size derive from the deepest key by right shifts,
/// and one histogram per candidate size is maintained incrementally.
fn calculate_best_cache_size(
	argb: &[u32],
	refs: &[PixOrCopy],
	xsize: u32,
	max_cache_bits: u8,
) -> u8 {
	if max_cache_bits == 0 {
		return 0;
	}
	let max = max_cache_bits;
	let mut histograms: Vec<Histogram> = (0..=max).map(Histogram::new).collect();
	let mut caches: Vec<ColorCache> = (1..=max).map(ColorCache::new).collect();

	let mut pos = 0usize;
	for token in refs {
		match *token {
			PixOrCopy::Literal(pixel) => {
				debug_assert_eq!(pixel, argb[pos]);
				histograms[0].add(token, Some(xsize));
				let key_max = cache_key_max(pixel, max);
				for bits in 1..=max as usize {
					let key = key_max >> (usize::from(max) - bits);
					if caches[bits - 1].lookup(key) == pixel {
						histograms[bits].add(&PixOrCopy::CacheIdx(key), Some(xsize));
					} else {
						histograms[bits].add(token, Some(xsize));
					}
					caches[bits - 1].insert(pixel);
				}
				pos += 1;
			}
			PixOrCopy::Copy {
				length, ..
			} => {
				for histogram in histograms.iter_mut() {
					histogram.add(token, Some(xsize));
				}
				for cache in caches.iter_mut() {
					for &pixel in &argb[pos..pos + length as usize] {
						cache.insert(pixel);
					}
				}
				pos += length as usize;
			}
			PixOrCopy::CacheIdx(_) => {
				debug_assert!(false, "cache-size search expects cache-free refs");
			}
		}
	}

	let mut best_bits = 0u8;
	let mut best_cost = f64::MAX;
	for (bits, histogram) in histograms.iter_mut().enumerate() {
		histogram.update_cost();
		if histogram.bit_cost < best_cost {
			best_cost = histogram.bit_cost;
			best_bits = bits as u8;
		}
	}
	best_bits
}

/// Rewrites literal tokens as cache hits under a `cache_bits`-deep cache.
pub fn apply_cache_to_refs(argb: &[u32], refs: &[PixOrCopy], cache_bits: u8) -> Vec<PixOrCopy> {
	let mut out = Vec::with_capacity(refs.len());
	let mut cache = new_cache(cache_bits);
	let mut pos = 0usize;
	for token in refs {
		match *token {
			PixOrCopy::Literal(pixel) => {
				push_pixel(&mut out, &mut cache, pixel);
				pos += 1;
			}
			PixOrCopy::Copy {
				length, ..
			} => {
				out.push(*token);
				insert_copied_pixels(&mut cache, argb, pos, length as usize);
				pos += length as usize;
			}
			PixOrCopy::CacheIdx(_) => {
				debug_assert!(false, "refs already carry cache hits");
			}
		}
	}
	out
}

/// Final pass: converts raw copy distances to stored plane codes.
pub fn refs_to_plane_codes(refs: &mut [PixOrCopy], xsize: u32) {
	for token in refs.iter_mut() {
		if let PixOrCopy::Copy {
			distance, ..
		} = token
		{
			*distance = distance_to_plane_code(xsize, *distance);
		}
	}
}

/// Selects the cheapest token stream for the image and the cache size to
/// code it with. Distances in the result are already plane codes.
pub fn get_backward_references(
	argb: &[u32],
	xsize: u32,
	ysize: u32,
	quality: u8,
	max_cache_bits: u8,
	chain: &HashChain,
) -> (Vec<PixOrCopy>, u8) {
	let _ = ysize;
	let mut best_refs = lz77_standard(argb, chain, 0);
	let mut best_cost = estimate_refs_bits(&best_refs, xsize, 0);
	let mut best_is_rle = false;

	let rle = lz77_rle(argb, xsize as usize, 0);
	let rle_cost = estimate_refs_bits(&rle, xsize, 0);
	if rle_cost < best_cost {
		best_refs = rle;
		best_cost = rle_cost;
		best_is_rle = true;
	}

	if quality >= 25 {
		let boxed = lz77_box(argb, xsize as usize, 0);
		let box_cost = estimate_refs_bits(&boxed, xsize, 0);
		if box_cost < best_cost {
			best_refs = boxed;
			best_cost = box_cost;
			best_is_rle = false;
		}
	}

	let cache_bits = calculate_best_cache_size(argb, &best_refs, xsize, max_cache_bits);
	if cache_bits > 0 {
		best_refs = apply_cache_to_refs(argb, &best_refs, cache_bits);
		best_cost = estimate_refs_bits(&best_refs, xsize, cache_bits);
	}

	if quality >= 25 && !best_is_rle {
		if let Some(traced) =
			cost_model::trace_backwards(argb, xsize as usize, chain, cache_bits)
		{
			let traced_cost = estimate_refs_bits(&traced, xsize, cache_bits);
			if traced_cost < best_cost {
				debug!(
					"trace backwards pass won: {traced_cost:.0} bits vs {best_cost:.0}"
				);
				best_refs = traced;
			}
		}
	}

	refs_to_plane_codes(&mut best_refs, xsize);
	(best_refs, cache_bits)
}

/// Replays a token stream into pixels; the encoder's own sanity check and
/// the reference semantics the decoder mirrors.
#[cfg(test)]
pub fn replay_refs(refs: &[PixOrCopy], cache_bits: u8, plane_coded: bool, xsize: u32) -> Vec<u32> {
	use super::plane_code_to_distance;
	let mut out: Vec<u32> = Vec::new();
	let mut cache = new_cache(cache_bits);
	for token in refs {
		match *token {
			PixOrCopy::Literal(pixel) => {
				if let Some(cache) = &mut cache {
					cache.insert(pixel);
				}
				out.push(pixel);
			}
			PixOrCopy::CacheIdx(key) => {
				let pixel = cache.as_ref().expect("cache enabled").lookup(key);
				out.push(pixel);
			}
			PixOrCopy::Copy {
				length,
				distance,
			} => {
				let distance = if plane_coded {
					plane_code_to_distance(xsize, distance)
				} else {
					distance
				} as usize;
				for _ in 0..length {
					let pixel = out[out.len() - distance];
					if let Some(cache) = &mut cache {
						cache.insert(pixel);
					}
					out.push(pixel);
				}
			}
		}
	}
	out
}
