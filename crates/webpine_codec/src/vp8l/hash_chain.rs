//! Pair-hash chain and the LZ77 match search over it.
//!
//! The chain hashes two consecutive ARGB pixels down to 18 bits, links each
//! position to the previous occurrence of the same hash, then performs a
//! right-to-left search that records the best `(distance, length)` per
//! position packed as `distance << 12 | length`. Runs of identical pixels
//! hash `(color, run length)` instead so monochrome stretches do not send
//! every position into one bucket.
//!
//! Distances stored here are raw pixel offsets; conversion to the stored
//! plane codes happens in a later pass, after all cost comparisons.

use super::{MAX_LENGTH, WINDOW_SIZE};

/// Bits reserved for the length in a packed `offset_length` entry.
pub const MAX_LENGTH_BITS: u32 = 12;

const HASH_BITS: u32 = 18;
const HASH_SIZE: usize = 1 << HASH_BITS;
const HASH_MULTIPLIER_HI: u32 = 0xC6A4_A793;
const HASH_MULTIPLIER_LO: u32 = 0x5BD1_E996;

#[inline]
fn pix_pair_hash(first: u32, second: u32) -> usize {
	let key = second
		.wrapping_mul(HASH_MULTIPLIER_HI)
		.wrapping_add(first.wrapping_mul(HASH_MULTIPLIER_LO));
	(key >> (32 - HASH_BITS)) as usize
}

/// Longest usable copy at a position, bounded by the pixels remaining.
#[inline]
fn max_find_copy_length(remaining: usize) -> usize {
	remaining.min(MAX_LENGTH)
}

fn find_match_length(argb: &[u32], pos1: usize, pos2: usize, best_len: usize, max_len: usize) -> usize {
	// Quick reject: a longer match must agree where the current best ends.
	if best_len < max_len && argb[pos1 + best_len] != argb[pos2 + best_len] {
		return 0;
	}
	let mut len = 0;
	while len < max_len && argb[pos1 + len] == argb[pos2 + len] {
		len += 1;
	}
	len
}

/// Search effort as a function of encoder quality.
fn iter_max_for_quality(quality: u8) -> u32 {
	let q = u32::from(quality);
	if quality <= 75 { 8 + q / 3 } else { 8 + q * q / 128 }
}

/// Search window as a function of quality; below top quality the window
/// narrows to a few hundred rows.
fn window_size_for_quality(quality: u8, xsize: usize) -> usize {
	let window = if quality > 75 {
		WINDOW_SIZE
	} else if quality > 50 {
		xsize << 8
	} else if quality > 25 {
		xsize << 6
	} else {
		xsize << 4
	};
	window.min(WINDOW_SIZE)
}

/// Per-pixel best backward match, packed `(distance << 12) | length`.
#[derive(Debug, Default)]
pub struct HashChain {
	offset_length: Vec<u32>,
}

impl HashChain {
	/// Creates an empty chain; [`Self::fill`] sizes it.
	pub fn new() -> Self {
		Self::default()
	}

	/// Best match length at `pos`, zero when no match was found.
	#[inline]
	pub fn length_at(&self, pos: usize) -> usize {
		(self.offset_length[pos] & ((1 << MAX_LENGTH_BITS) - 1)) as usize
	}

	/// Raw pixel distance of the best match at `pos`.
	#[inline]
	pub fn distance_at(&self, pos: usize) -> usize {
		(self.offset_length[pos] >> MAX_LENGTH_BITS) as usize
	}

	/// Builds the chain and runs the match search over `argb`.
	pub fn fill(&mut self, argb: &[u32], quality: u8, xsize: usize, ysize: usize) {
		let size = xsize * ysize;
		debug_assert_eq!(argb.len(), size);
		self.offset_length.clear();
		self.offset_length.resize(size, 0);
		if size <= 2 {
			return;
		}

		let mut hash_to_first_index = vec![-1i64; HASH_SIZE];
		let mut chain = vec![-1i64; size];

		// Pass 1: link each position to the previous same-hash position.
		// Runs of one color hash (color, remaining run length) instead of
		// the degenerate (color, color) pair.
		let mut pos = 0usize;
		let mut argb_comp = argb[0] == argb[1];
		while pos + 2 < size {
			let argb_comp_next = argb[pos + 1] == argb[pos + 2];
			if argb_comp && argb_comp_next {
				let color = argb[pos];
				let mut len = 1usize;
				while pos + len + 2 < size && argb[pos + len + 2] == color {
					len += 1;
				}
				if len > MAX_LENGTH {
					// Positions inside an over-long run are found through
					// the distance-1 heuristic anyway.
					pos += len - MAX_LENGTH;
					len = MAX_LENGTH;
				}
				while len > 0 {
					let hash = pix_pair_hash(color, len as u32);
					len -= 1;
					chain[pos] = hash_to_first_index[hash];
					hash_to_first_index[hash] = pos as i64;
					pos += 1;
				}
				argb_comp = false;
			} else {
				let hash = pix_pair_hash(argb[pos], argb[pos + 1]);
				chain[pos] = hash_to_first_index[hash];
				hash_to_first_index[hash] = pos as i64;
				pos += 1;
				argb_comp = argb_comp_next;
			}
		}
		if pos < size - 1 {
			let hash = pix_pair_hash(argb[pos], argb[pos + 1]);
			chain[pos] = hash_to_first_index[hash];
		}

		// Pass 2: right-to-left search with spatial heuristics.
		let iter_max = iter_max_for_quality(quality);
		let window_size = window_size_for_quality(quality, xsize);
		let mut base = size - 2;
		while base > 0 {
			let max_len = max_find_copy_length(size - 1 - base);
			let min_pos = base.saturating_sub(window_size);
			let length_max = max_len.min(256);
			let mut iter = iter_max;
			let mut best_length = 0usize;
			let mut best_distance = 0usize;

			// The pixel directly above.
			if base >= xsize {
				let len = find_match_length(argb, base - xsize, base, best_length, max_len);
				if len > best_length {
					best_length = len;
					best_distance = xsize;
				}
				iter = iter.saturating_sub(1);
			}
			// The pixel directly to the left.
			let len = find_match_length(argb, base - 1, base, best_length, max_len);
			if len > best_length {
				best_length = len;
				best_distance = 1;
			}
			iter = iter.saturating_sub(1);

			if best_length < MAX_LENGTH {
				let mut candidate = chain[base];
				while candidate >= min_pos as i64 && iter > 0 {
					iter -= 1;
					let cpos = candidate as usize;
					let len = find_match_length(argb, cpos, base, best_length, max_len);
					if len > best_length {
						best_length = len;
						best_distance = base - cpos;
						if best_length >= length_max {
							break;
						}
					}
					candidate = chain[cpos];
				}
			}

			// Left-extend: adjacent positions reuse the match one longer.
			loop {
				debug_assert!(best_length <= MAX_LENGTH);
				debug_assert!(best_distance <= WINDOW_SIZE);
				self.offset_length[base] =
					(best_distance as u32) << MAX_LENGTH_BITS | best_length as u32;
				if best_distance == 0 {
					base = base.saturating_sub(1);
					break;
				}
				base -= 1;
				if base == 0 {
					break;
				}
				if base < best_distance
					|| argb[base - best_distance] != argb[base]
					|| best_length == MAX_LENGTH
				{
					break;
				}
				best_length += 1;
			}
		}
		self.offset_length[0] = 0;
		if size >= 2 {
			self.offset_length[size - 1] = 0;
		}
	}
}
