//! Per-tile symbol histograms and their clustering into entropy groups.
//!
//! The encoder builds one histogram per tile, estimates the bit cost of
//! each, then merges histograms in three stages: an entropy-bin pre-sort
//! that combines obviously similar tiles, stochastic pair sampling feeding
//! a small merge queue, and a final greedy pass over whatever remains.
//! A remap pass then assigns every tile to its cheapest surviving cluster.

use std::sync::OnceLock;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use super::backward_refs::PixOrCopy;
use super::color_cache::HASH_MUL;
use super::{
	NUM_DISTANCE_CODES, NUM_LENGTH_CODES, NUM_LITERAL_CODES, distance_to_plane_code, prefix_encode,
	prefix_extra_bits, subsample_size,
};

/// `n * log2(n)`, the workhorse of every entropy estimate.
pub fn fast_slog2(n: u64) -> f64 {
	const LUT_SIZE: u64 = 4096;
	static LUT: OnceLock<Vec<f64>> = OnceLock::new();
	if n < LUT_SIZE {
		let lut = LUT.get_or_init(|| {
			(0..LUT_SIZE)
				.map(|v| if v == 0 { 0.0 } else { v as f64 * (v as f64).log2() })
				.collect()
		});
		lut[n as usize]
	} else {
		n as f64 * (n as f64).log2()
	}
}

/// Refined Shannon estimate of one population, biased toward what a real
/// prefix code achieves on few-symbol distributions.
fn bits_entropy(population: &[u32]) -> f64 {
	let mut sum = 0u64;
	let mut nonzeros = 0usize;
	let mut max_val = 0u64;
	let mut entropy = 0.0f64;
	for &count in population {
		if count > 0 {
			sum += u64::from(count);
			nonzeros += 1;
			max_val = max_val.max(u64::from(count));
			entropy -= fast_slog2(u64::from(count));
		}
	}
	entropy += fast_slog2(sum);

	let mix = match nonzeros {
		0 | 1 => return 0.0,
		2 => return 0.99 * sum as f64 + 0.01 * entropy,
		3 => 0.95,
		4 => 0.7,
		_ => 0.627,
	};
	let min_limit = 2.0 * sum as f64 - max_val as f64;
	let min_limit = mix * min_limit + (1.0 - mix) * entropy;
	entropy.max(min_limit)
}

/// Cost of storing the code itself, estimated from streaks of zero and
/// non-zero counts with empirical per-streak coefficients.
fn huffman_cost(population: &[u32]) -> f64 {
	let mut streaks = [[0u64; 2]; 2]; // [is_nonzero][is_long]
	let mut counts = [0u64; 2]; // long-streak count per value class
	let mut i = 0usize;
	while i < population.len() {
		let value = population[i];
		let mut streak = 1usize;
		while i + streak < population.len() && population[i + streak] == value {
			streak += 1;
		}
		i += streak;
		let nonzero = usize::from(value != 0);
		let long = usize::from(streak > 3);
		streaks[nonzero][long] += streak as u64;
		if long == 1 {
			counts[nonzero] += 1;
		}
	}

	// Initial cost of the code-length code, minus a small bias because
	// lengths are rarely stored in full.
	let mut cost = 19.0 * 3.0 - 9.1;
	cost += counts[0] as f64 * 1.5625 + 0.234_375 * streaks[0][1] as f64;
	cost += counts[1] as f64 * 2.578_125 + 0.703_125 * streaks[1][1] as f64;
	cost += 1.796_875 * streaks[0][0] as f64;
	cost += 3.28125 * streaks[1][0] as f64;
	cost
}

/// Storage plus entropy cost of one symbol population.
pub fn population_cost(population: &[u32]) -> f64 {
	bits_entropy(population) + huffman_cost(population)
}

/// Symbol statistics of one entropy group.
#[derive(Debug, Clone)]
pub struct Histogram {
	/// Green literals, length prefix codes, then cache indices.
	pub literal: Vec<u32>,
	/// Red channel.
	pub red: Vec<u32>,
	/// Blue channel.
	pub blue: Vec<u32>,
	/// Alpha channel.
	pub alpha: Vec<u32>,
	/// Distance prefix codes.
	pub distance: Vec<u32>,
	/// Color-cache depth these statistics were collected at.
	pub cache_bits: u8,
	/// Cached total cost; stale after merges until updated.
	pub bit_cost: f64,
	literal_cost: f64,
	red_cost: f64,
	blue_cost: f64,
}

/// Size of the green/length/cache alphabet at a cache depth.
pub fn literal_alphabet_size(cache_bits: u8) -> usize {
	NUM_LITERAL_CODES + NUM_LENGTH_CODES + if cache_bits > 0 { 1 << cache_bits } else { 0 }
}

impl Histogram {
	/// Creates an all-zero histogram for the given cache depth.
	pub fn new(cache_bits: u8) -> Self {
		Self {
			literal: vec![0; literal_alphabet_size(cache_bits)],
			red: vec![0; 256],
			blue: vec![0; 256],
			alpha: vec![0; 256],
			distance: vec![0; NUM_DISTANCE_CODES],
			cache_bits,
			bit_cost: 0.0,
			literal_cost: 0.0,
			red_cost: 0.0,
			blue_cost: 0.0,
		}
	}

	/// Zeroes every bucket, keeping the allocation.
	pub fn clear(&mut self) {
		self.literal.fill(0);
		self.red.fill(0);
		self.blue.fill(0);
		self.alpha.fill(0);
		self.distance.fill(0);
		self.bit_cost = 0.0;
		self.literal_cost = 0.0;
		self.red_cost = 0.0;
		self.blue_cost = 0.0;
	}

	/// Accounts one token. When `plane_xsize` is given, raw copy distances
	/// are converted to plane codes first, matching what will be written.
	pub fn add(&mut self, token: &PixOrCopy, plane_xsize: Option<u32>) {
		match *token {
			PixOrCopy::Literal(argb) => {
				self.alpha[(argb >> 24) as usize] += 1;
				self.red[(argb >> 16 & 0xFF) as usize] += 1;
				self.literal[(argb >> 8 & 0xFF) as usize] += 1;
				self.blue[(argb & 0xFF) as usize] += 1;
			}
			PixOrCopy::CacheIdx(index) => {
				self.literal[NUM_LITERAL_CODES + NUM_LENGTH_CODES + index as usize] += 1;
			}
			PixOrCopy::Copy {
				length,
				distance,
			} => {
				let (length_code, _, _) = prefix_encode(length);
				self.literal[NUM_LITERAL_CODES + length_code as usize] += 1;
				let distance = match plane_xsize {
					Some(xsize) => distance_to_plane_code(xsize, distance),
					None => distance,
				};
				let (distance_code, _, _) = prefix_encode(distance);
				self.distance[distance_code as usize] += 1;
			}
		}
	}

	/// Extra (raw) bits implied by the stored length and distance codes.
	fn extra_cost(&self) -> f64 {
		let mut bits = 0u64;
		for code in 0..NUM_LENGTH_CODES {
			bits += u64::from(self.literal[NUM_LITERAL_CODES + code])
				* u64::from(prefix_extra_bits(code as u32));
		}
		for (code, &count) in self.distance.iter().enumerate() {
			bits += u64::from(count) * u64::from(prefix_extra_bits(code as u32));
		}
		bits as f64
	}

	/// Recomputes and caches the total bit cost.
	pub fn update_cost(&mut self) {
		self.literal_cost = population_cost(&self.literal);
		self.red_cost = population_cost(&self.red);
		self.blue_cost = population_cost(&self.blue);
		self.bit_cost = self.literal_cost
			+ self.red_cost
			+ self.blue_cost
			+ population_cost(&self.alpha)
			+ population_cost(&self.distance)
			+ self.extra_cost();
	}

	/// Adds `other` into `self`; costs become stale.
	pub fn merge(&mut self, other: &Histogram) {
		debug_assert_eq!(self.literal.len(), other.literal.len());
		for (a, b) in self.literal.iter_mut().zip(&other.literal) {
			*a += b;
		}
		for (a, b) in self.red.iter_mut().zip(&other.red) {
			*a += b;
		}
		for (a, b) in self.blue.iter_mut().zip(&other.blue) {
			*a += b;
		}
		for (a, b) in self.alpha.iter_mut().zip(&other.alpha) {
			*a += b;
		}
		for (a, b) in self.distance.iter_mut().zip(&other.distance) {
			*a += b;
		}
	}

	/// Cost of the union of two histograms.
	fn merged_cost(&self, other: &Histogram) -> f64 {
		let mut merged = self.clone();
		merged.merge(other);
		merged.update_cost();
		merged.bit_cost
	}

	/// Total number of accounted symbols, a cheap emptiness probe.
	pub fn total_count(&self) -> u64 {
		self.literal.iter().map(|&c| u64::from(c)).sum::<u64>()
			+ self.distance.iter().map(|&c| u64::from(c)).sum::<u64>()
	}
}

/// Cache key of `argb` for the deepest cache, right-shiftable to any
/// shallower depth.
#[inline]
pub fn cache_key_max(argb: u32, max_bits: u8) -> u32 {
	argb.wrapping_mul(HASH_MUL) >> (32 - u32::from(max_bits))
}

// ---------------------------------------------------------------------------
// Building per-tile histograms
// ---------------------------------------------------------------------------

/// Builds one histogram per `histo_bits` tile; each token lands in the tile
/// of its start pixel.
pub fn build_tile_histograms(
	refs: &[PixOrCopy],
	xsize: u32,
	ysize: u32,
	histo_bits: u8,
	cache_bits: u8,
) -> Vec<Histogram> {
	let tiles_x = subsample_size(xsize, u32::from(histo_bits)) as usize;
	let tiles_y = subsample_size(ysize, u32::from(histo_bits)) as usize;
	let mut histograms = vec![Histogram::new(cache_bits); tiles_x * tiles_y];

	let mut x = 0usize;
	let mut y = 0usize;
	for token in refs {
		let tile =
			(y >> histo_bits) * tiles_x + (x >> histo_bits);
		histograms[tile].add(token, None);
		let mut advance = token.pixel_span();
		while advance > 0 {
			let step = advance.min(xsize as usize - x);
			x += step;
			advance -= step;
			if x == xsize as usize {
				x = 0;
				y += 1;
			}
		}
	}
	histograms
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

const NUM_PARTITIONS: usize = 4;
const BIN_SIZE: usize = NUM_PARTITIONS * NUM_PARTITIONS * NUM_PARTITIONS;
/// Above this many survivors the exhaustive greedy pass is skipped.
const MAX_HISTO_GREEDY: usize = 100;
/// Merge-queue depth during the stochastic stage.
const STOCHASTIC_QUEUE: usize = 9;

/// Result of clustering: the surviving group histograms and, per tile, the
/// index of its group.
#[derive(Debug)]
pub struct ClusteredHistograms {
	/// Group histograms with up-to-date costs.
	pub groups: Vec<Histogram>,
	/// Tile → group index.
	pub symbols: Vec<u16>,
}

fn bin_index(value: f64, min: f64, max: f64) -> usize {
	if max <= min {
		return 0;
	}
	let norm = (value - min) / (max - min);
	((norm * NUM_PARTITIONS as f64) as usize).min(NUM_PARTITIONS - 1)
}

/// Phase 3 of clustering: histograms sharing a coarse cost bin merge when
/// the union is cheaper (always, in low-effort mode).
fn combine_entropy_bin(live: &mut Vec<Option<Histogram>>, low_effort: bool) {
	let costs: Vec<(f64, f64, f64)> = live
		.iter()
		.map(|h| {
			let h = h.as_ref().expect("all alive before binning");
			(h.literal_cost, h.red_cost, h.blue_cost)
		})
		.collect();
	let min = costs.iter().fold((f64::MAX, f64::MAX, f64::MAX), |acc, c| {
		(acc.0.min(c.0), acc.1.min(c.1), acc.2.min(c.2))
	});
	let max = costs.iter().fold((f64::MIN, f64::MIN, f64::MIN), |acc, c| {
		(acc.0.max(c.0), acc.1.max(c.1), acc.2.max(c.2))
	});

	let mut bin_first: [Option<usize>; BIN_SIZE] = [None; BIN_SIZE];
	for i in 0..live.len() {
		let (literal, red, blue) = costs[i];
		let bin = (bin_index(literal, min.0, max.0) * NUM_PARTITIONS
			+ bin_index(red, min.1, max.1))
			* NUM_PARTITIONS
			+ bin_index(blue, min.2, max.2);
		match bin_first[bin] {
			None => bin_first[bin] = Some(i),
			Some(first) => {
				let (left, right) = live.split_at_mut(i);
				let target = left[first].as_mut().expect("bin head alive");
				let candidate = right[0].as_ref().expect("candidate alive");
				let cost_new = target.merged_cost(candidate);
				let cost_old = target.bit_cost + candidate.bit_cost;
				// A small threshold keeps dissimilar histograms apart at
				// higher effort.
				if low_effort || cost_new < cost_old - 0.1 * cost_old.abs() {
					target.merge(candidate);
					target.update_cost();
					live[i] = None;
				}
			}
		}
	}
}

fn live_indices(live: &[Option<Histogram>]) -> Vec<usize> {
	live.iter()
		.enumerate()
		.filter_map(|(i, h)| h.as_ref().map(|_| i))
		.collect()
}

fn merge_cost_diff(live: &[Option<Histogram>], a: usize, b: usize) -> f64 {
	let ha = live[a].as_ref().expect("a alive");
	let hb = live[b].as_ref().expect("b alive");
	ha.merged_cost(hb) - ha.bit_cost - hb.bit_cost
}

fn apply_merge(live: &mut [Option<Histogram>], a: usize, b: usize) {
	let taken = live[b].take().expect("b alive");
	let target = live[a].as_mut().expect("a alive");
	target.merge(&taken);
	target.update_cost();
}

/// Phase 4a: random pair sampling with a small queue of merge candidates.
fn combine_stochastic(live: &mut Vec<Option<Histogram>>, min_cluster_size: usize) {
	let mut rng = SmallRng::seed_from_u64(0x9E37_79B9);
	let mut indices = live_indices(live);
	if indices.len() <= min_cluster_size {
		return;
	}
	let outer_iters = indices.len();
	let mut tries_without_success = 0usize;
	let max_failures = outer_iters / 2 + 4;

	while indices.len() > min_cluster_size && tries_without_success < max_failures {
		// Sample a burst of random pairs, keeping the best few.
		let mut queue: Vec<(usize, usize, f64)> = Vec::with_capacity(STOCHASTIC_QUEUE);
		let samples = indices.len().min(outer_iters);
		for _ in 0..samples {
			let pick_a = indices[rng.random_range(0..indices.len())];
			let pick_b = indices[rng.random_range(0..indices.len())];
			if pick_a == pick_b {
				continue;
			}
			let (a, b) = (pick_a.min(pick_b), pick_a.max(pick_b));
			if queue.iter().any(|&(qa, qb, _)| qa == a && qb == b) {
				continue;
			}
			let diff = merge_cost_diff(live, a, b);
			if diff < 0.0 {
				queue.push((a, b, diff));
				queue.sort_by(|x, y| x.2.partial_cmp(&y.2).expect("finite costs"));
				queue.truncate(STOCHASTIC_QUEUE);
			}
		}
		if queue.is_empty() {
			tries_without_success += 1;
			continue;
		}
		tries_without_success = 0;
		let mut merged_into: Vec<usize> = Vec::new();
		for (a, b, _) in queue {
			if live[a].is_none() || live[b].is_none() || merged_into.contains(&a) {
				continue;
			}
			apply_merge(live, a, b);
			merged_into.push(a);
			if live_count_hint(&indices, live) <= min_cluster_size {
				break;
			}
		}
		indices = live_indices(live);
	}
}

fn live_count_hint(indices: &[usize], live: &[Option<Histogram>]) -> usize {
	indices.iter().filter(|&&i| live[i].is_some()).count()
}

/// Phase 4b: exhaustive greedy merging while any pair is cheaper together.
fn combine_greedy(live: &mut [Option<Histogram>]) {
	loop {
		let indices = live_indices(live);
		if indices.len() < 2 {
			return;
		}
		let mut best: Option<(usize, usize, f64)> = None;
		for (slot, &a) in indices.iter().enumerate() {
			for &b in &indices[slot + 1..] {
				let diff = merge_cost_diff(live, a, b);
				if diff < 0.0 && best.is_none_or(|(_, _, best_diff)| diff < best_diff) {
					best = Some((a, b, diff));
				}
			}
		}
		match best {
			Some((a, b, _)) => apply_merge(live, a, b),
			None => return,
		}
	}
}

/// Bits a cluster grows by when it absorbs `tile`.
fn remap_cost(cluster: &Histogram, tile: &Histogram) -> f64 {
	cluster.merged_cost(tile) - cluster.bit_cost
}

/// Clusters tile histograms into entropy groups.
///
/// `quality` controls effort: below 25 the entropy-bin stage merges
/// unconditionally and the stochastic stage is skipped.
pub fn cluster_histograms(
	tile_histograms: Vec<Histogram>,
	quality: u8,
) -> ClusteredHistograms {
	let num_tiles = tile_histograms.len();
	let low_effort = quality < 25;
	let mut live: Vec<Option<Histogram>> = tile_histograms
		.iter()
		.map(|h| {
			let mut h = h.clone();
			h.update_cost();
			Some(h)
		})
		.collect();

	if live.len() > 1 {
		combine_entropy_bin(&mut live, low_effort);
		if !low_effort {
			let min_cluster_size = 1;
			combine_stochastic(&mut live, min_cluster_size);
		}
		if live_indices(&live).len() <= MAX_HISTO_GREEDY {
			combine_greedy(&mut live);
		}
	}

	let mut groups: Vec<Histogram> = Vec::new();
	for slot in live.into_iter().flatten() {
		groups.push(slot);
	}
	debug_assert!(!groups.is_empty() || num_tiles == 0);

	// Remap: every tile goes to the group that grows the least by taking
	// it, then groups are rebuilt from their final membership.
	let assign = |tile: &Histogram| -> u16 {
		let mut best = 0usize;
		let mut best_cost = f64::MAX;
		for (i, group) in groups.iter().enumerate() {
			let cost = remap_cost(group, tile);
			if cost < best_cost {
				best_cost = cost;
				best = i;
			}
		}
		best as u16
	};
	#[cfg(feature = "rayon")]
	let symbols: Vec<u16> = if num_tiles >= 64 {
		tile_histograms.par_iter().map(assign).collect()
	} else {
		tile_histograms.iter().map(assign).collect()
	};
	#[cfg(not(feature = "rayon"))]
	let symbols: Vec<u16> = tile_histograms.iter().map(assign).collect();

	let cache_bits = tile_histograms.first().map_or(0, |h| h.cache_bits);
	let mut rebuilt: Vec<Histogram> = (0..groups.len()).map(|_| Histogram::new(cache_bits)).collect();
	for (tile, &symbol) in tile_histograms.iter().zip(&symbols) {
		rebuilt[symbol as usize].merge(tile);
	}
	// Drop groups that ended up with no tiles, compacting symbols.
	let mut compact: Vec<Histogram> = Vec::new();
	let mut new_index = vec![u16::MAX; rebuilt.len()];
	for (i, mut group) in rebuilt.into_iter().enumerate() {
		if symbols.iter().any(|&s| s as usize == i) {
			group.update_cost();
			new_index[i] = compact.len() as u16;
			compact.push(group);
		}
	}
	let symbols = symbols.iter().map(|&s| new_index[s as usize]).collect();

	ClusteredHistograms {
		groups: compact,
		symbols,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_fast_slog2() {
		assert_eq!(fast_slog2(0), 0.0);
		assert_eq!(fast_slog2(1), 0.0);
		assert!((fast_slog2(8) - 24.0).abs() < 1e-9);
		assert!((fast_slog2(100_000) - 100_000.0 * (100_000f64).log2()).abs() < 1e-3);
	}

	#[test]
	fn test_bits_entropy_uniform_vs_skewed() {
		let uniform = [10u32; 16];
		let mut skewed = [0u32; 16];
		skewed[0] = 155;
		skewed[1] = 5;
		assert!(bits_entropy(&skewed) < bits_entropy(&uniform));
	}

	#[test]
	fn test_histogram_add_literal_and_copy() {
		let mut histogram = Histogram::new(2);
		histogram.add(&PixOrCopy::Literal(0x8040_2010), None);
		assert_eq!(histogram.alpha[0x80], 1);
		assert_eq!(histogram.red[0x40], 1);
		assert_eq!(histogram.literal[0x20], 1);
		assert_eq!(histogram.blue[0x10], 1);

		histogram.add(
			&PixOrCopy::Copy {
				length: 10,
				distance: 1,
			},
			None,
		);
		let (length_code, _, _) = prefix_encode(10);
		assert_eq!(histogram.literal[NUM_LITERAL_CODES + length_code as usize], 1);
		assert_eq!(histogram.distance[0], 1); // distance 1 → code 0

		histogram.add(&PixOrCopy::CacheIdx(3), None);
		assert_eq!(histogram.literal[NUM_LITERAL_CODES + NUM_LENGTH_CODES + 3], 1);
	}

	#[test]
	fn test_merge_then_cost_monotone() {
		let mut a = Histogram::new(0);
		let mut b = Histogram::new(0);
		for i in 0..50u32 {
			a.add(&PixOrCopy::Literal(0xFF00_0000 | i % 4 << 8), None);
			b.add(&PixOrCopy::Literal(0xFF00_0000 | i % 4 << 8), None);
		}
		a.update_cost();
		b.update_cost();
		let merged_cost = a.merged_cost(&b);
		// Identical distributions merge almost for free.
		assert!(merged_cost < a.bit_cost + b.bit_cost);
	}

	#[test]
	fn test_cluster_identical_tiles_collapse() {
		let mut tiles = Vec::new();
		for _ in 0..8 {
			let mut h = Histogram::new(0);
			for i in 0..100u32 {
				h.add(&PixOrCopy::Literal(0xFF00_0000 | (i % 3) << 8), None);
			}
			tiles.push(h);
		}
		let clustered = cluster_histograms(tiles, 75);
		assert_eq!(clustered.symbols.len(), 8);
		assert_eq!(clustered.groups.len(), 1);
		assert!(clustered.symbols.iter().all(|&s| s == 0));
	}

	#[test]
	fn test_cluster_distinct_tiles_survive() {
		let mut tiles = Vec::new();
		for t in 0..4u32 {
			let mut h = Histogram::new(0);
			for i in 0..400u32 {
				// Very different channel distributions per tile.
				let green = (t * 61 + i % 5) % 256;
				let red = (t * 97) % 256;
				h.add(
					&PixOrCopy::Literal(0xFF00_0000 | red << 16 | green << 8),
					None,
				);
			}
			tiles.push(h);
		}
		let clustered = cluster_histograms(tiles, 75);
		assert!(!clustered.groups.is_empty());
		assert_eq!(clustered.symbols.len(), 4);
		for &s in &clustered.symbols {
			assert!((s as usize) < clustered.groups.len());
		}
	}

	#[test]
	fn test_build_tile_histograms_placement() {
		// 8x8 image, 4-pixel tiles → 2x2 tiles. One literal at (5, 1)
		// lands in tile (1, 0).
		let refs = vec![
			PixOrCopy::Copy {
				length: 13,
				distance: 1,
			},
			PixOrCopy::Literal(0xFFFF_FFFF),
		];
		let histograms = build_tile_histograms(&refs, 8, 8, 2, 0);
		assert_eq!(histograms.len(), 4);
		// Copy starts at pixel 0 → tile 0.
		assert_eq!(histograms[0].total_count(), 2); // length code + distance code
		// Literal at pixel 13 = (5, 1) → tile x=1, y=0.
		assert_eq!(histograms[1].literal[0xFF], 1);
	}
}
