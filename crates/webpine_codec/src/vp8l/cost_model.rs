//! Cost-model path optimization for backward references.
//!
//! A forward dynamic-programming pass assigns every pixel the cheapest way
//! to reach it: as a literal (or cache hit) on top of the previous pixel,
//! or as the tail of a copy starting earlier. Copy candidates arrive as
//! whole intervals, since a match of length `L` at position `i` offers
//! positions `i+1..i+L` a cost that is constant across each run of lengths
//! sharing a length prefix code; pending candidates therefore live in a
//! sorted, non-overlapping interval list instead of being written out one
//! by one.
//! Tracing the recorded step sizes backwards and replaying them emits the
//! final token stream.

use super::backward_refs::{PixOrCopy, lz77_standard};
use super::color_cache::ColorCache;
use super::hash_chain::HashChain;
use super::histogram::Histogram;
use super::{
	MAX_LENGTH, NUM_LITERAL_CODES, distance_to_plane_code, prefix_encode, prefix_extra_bits,
};

/// Pushes shorter than this update the cost array directly; the interval
/// list only pays off for long matches.
const DIRECT_UPDATE_LIMIT: usize = 10;

fn to_bit_estimates(population: &[u32]) -> Vec<f64> {
	let sum: u64 = population.iter().map(|&c| u64::from(c)).sum();
	let nonzeros = population.iter().filter(|&&c| c > 0).count();
	if nonzeros <= 1 {
		return vec![0.0; population.len()];
	}
	let logsum = (sum as f64).log2();
	population
		.iter()
		.map(|&count| {
			if count == 0 { logsum } else { logsum - f64::from(count).log2() }
		})
		.collect()
}

/// Per-symbol bit estimates derived from a seed token stream.
struct CostModel {
	alpha: Vec<f64>,
	red: Vec<f64>,
	literal: Vec<f64>,
	blue: Vec<f64>,
	distance: Vec<f64>,
}

impl CostModel {
	fn build(xsize: u32, refs: &[PixOrCopy], cache_bits: u8) -> Self {
		let mut histogram = Histogram::new(cache_bits);
		for token in refs {
			histogram.add(token, Some(xsize));
		}
		Self {
			alpha: to_bit_estimates(&histogram.alpha),
			red: to_bit_estimates(&histogram.red),
			literal: to_bit_estimates(&histogram.literal),
			blue: to_bit_estimates(&histogram.blue),
			distance: to_bit_estimates(&histogram.distance),
		}
	}

	fn literal_cost(&self, argb: u32) -> f64 {
		self.alpha[(argb >> 24) as usize]
			+ self.red[(argb >> 16 & 0xFF) as usize]
			+ self.literal[(argb >> 8 & 0xFF) as usize]
			+ self.blue[(argb & 0xFF) as usize]
	}

	fn cache_cost(&self, index: u32) -> f64 {
		self.literal[NUM_LITERAL_CODES + super::NUM_LENGTH_CODES + index as usize]
	}

	fn length_code_cost(&self, code: u32) -> f64 {
		self.literal[NUM_LITERAL_CODES + code as usize] + f64::from(prefix_extra_bits(code))
	}

	fn distance_cost(&self, plane_code: u32) -> f64 {
		let (code, extra_bits, _) = prefix_encode(plane_code);
		self.distance[code as usize] + f64::from(extra_bits)
	}
}

/// The length-cost curve collapsed into runs of equal cost: one segment per
/// length prefix code, `(first_len, last_len, cost)`.
fn length_cost_segments(model: &CostModel) -> Vec<(usize, usize, f64)> {
	let mut segments = Vec::new();
	let mut len = 1usize;
	while len <= MAX_LENGTH {
		let (code, extra_bits, _) = prefix_encode(len as u32);
		let last = if code < 4 {
			len
		} else {
			let offset = (2 + (code as usize & 1)) << extra_bits;
			(offset + (1 << extra_bits)).min(MAX_LENGTH)
		};
		segments.push((len, last, model.length_code_cost(code)));
		len = last + 1;
	}
	segments
}

const NIL: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
struct IntervalNode {
	start: usize,
	end: usize,
	cost: f64,
	/// Copy start position; the step at `j` is `j - base + 1`.
	base: usize,
	prev: usize,
	next: usize,
}

/// Sorted, non-overlapping pending-candidate intervals in an arena with a
/// free list.
#[derive(Debug, Default)]
struct IntervalList {
	arena: Vec<IntervalNode>,
	free: Vec<usize>,
	head: usize,
}

impl IntervalList {
	fn new() -> Self {
		Self {
			arena: Vec::new(),
			free: Vec::new(),
			head: NIL,
		}
	}

	fn alloc(&mut self, node: IntervalNode) -> usize {
		if let Some(index) = self.free.pop() {
			self.arena[index] = node;
			index
		} else {
			self.arena.push(node);
			self.arena.len() - 1
		}
	}

	/// Inserts a fresh interval after `prev` (`NIL` inserts at the head)
	/// and returns its index.
	fn insert_after(&mut self, prev: usize, start: usize, end: usize, cost: f64, base: usize) -> usize {
		let next = if prev == NIL { self.head } else { self.arena[prev].next };
		let index = self.alloc(IntervalNode {
			start,
			end,
			cost,
			base,
			prev,
			next,
		});
		if prev == NIL {
			self.head = index;
		} else {
			self.arena[prev].next = index;
		}
		if next != NIL {
			self.arena[next].prev = index;
		}
		index
	}

	/// Unlinks `index`, returning its successor.
	fn remove(&mut self, index: usize) -> usize {
		let IntervalNode {
			prev,
			next,
			..
		} = self.arena[index];
		if prev == NIL {
			self.head = next;
		} else {
			self.arena[prev].next = next;
		}
		if next != NIL {
			self.arena[next].prev = prev;
		}
		self.free.push(index);
		next
	}

	/// Inserts candidate `[start, end)` at `cost`, splitting and absorbing
	/// whatever it overlaps so the list stays non-overlapping with the
	/// cheapest candidate at every position.
	fn push(&mut self, mut start: usize, end: usize, cost: f64, base: usize) {
		if start >= end {
			return;
		}
		let mut prev = NIL;
		let mut cur = self.head;
		while cur != NIL && self.arena[cur].end <= start {
			prev = cur;
			cur = self.arena[cur].next;
		}
		while start < end {
			if cur == NIL || self.arena[cur].start >= end {
				self.insert_after(prev, start, end, cost, base);
				return;
			}
			let existing = self.arena[cur];
			if existing.start > start {
				// Gap before the next interval.
				let piece_end = end.min(existing.start);
				prev = self.insert_after(prev, start, piece_end, cost, base);
				start = piece_end;
				continue;
			}
			// Overlap: existing.start <= start < existing.end.
			if existing.cost <= cost {
				start = start.max(existing.end);
				prev = cur;
				cur = existing.next;
				continue;
			}
			// The new candidate is cheaper over the overlap.
			if end < existing.end {
				if existing.start < start {
					self.arena[cur].end = start;
					let mid = self.insert_after(cur, start, end, cost, base);
					self.insert_after(mid, end, existing.end, existing.cost, existing.base);
				} else {
					self.arena[cur].start = end;
					self.insert_after(prev, start, end, cost, base);
				}
				return;
			}
			if existing.start < start {
				self.arena[cur].end = start;
				prev = cur;
				cur = existing.next;
			} else {
				cur = self.remove(cur);
			}
			// The freed range is re-inserted by the gap logic above.
		}
	}

	/// Applies the pending candidate covering `i`, dropping expired nodes.
	fn apply_at(&mut self, i: usize, costs: &mut [f64], dist_array: &mut [u16]) {
		loop {
			let head = self.head;
			if head == NIL {
				return;
			}
			let node = self.arena[head];
			if node.end <= i {
				self.remove(head);
				continue;
			}
			if node.start > i {
				return;
			}
			if node.cost < costs[i] {
				costs[i] = node.cost;
				dist_array[i] = (i - node.base + 1) as u16;
			}
			return;
		}
	}
}

/// Runs the cost-model pass and re-emits the cheapest token stream, or
/// `None` for degenerate inputs.
pub fn trace_backwards(
	argb: &[u32],
	xsize: usize,
	chain: &HashChain,
	cache_bits: u8,
) -> Option<Vec<PixOrCopy>> {
	let size = argb.len();
	if size == 0 {
		return None;
	}

	let seed = lz77_standard(argb, chain, cache_bits);
	let model = CostModel::build(xsize as u32, &seed, cache_bits);
	let segments = length_cost_segments(&model);

	let mut costs = vec![f64::MAX; size];
	let mut dist_array = vec![0u16; size];
	let mut intervals = IntervalList::new();
	let mut cache = if cache_bits > 0 { Some(ColorCache::new(cache_bits)) } else { None };

	for i in 0..size {
		intervals.apply_at(i, &mut costs, &mut dist_array);

		// Literal or cache hit on top of the previous pixel.
		let prev_cost = if i == 0 { 0.0 } else { costs[i - 1] };
		let pixel = argb[i];
		let literal_cost = match &mut cache {
			Some(cache) => match cache.contains(pixel) {
				Some(key) => prev_cost + model.cache_cost(key) * 0.68,
				None => {
					cache.insert(pixel);
					prev_cost + model.literal_cost(pixel) * 0.82
				}
			},
			None => prev_cost + model.literal_cost(pixel) * 0.82,
		};
		if literal_cost < costs[i] {
			costs[i] = literal_cost;
			dist_array[i] = 1;
		}

		// Copy candidates starting here.
		let len = chain.length_at(i);
		if len >= 2 {
			let distance = chain.distance_at(i) as u32;
			let plane_code = distance_to_plane_code(xsize as u32, distance);
			let distance_cost =
				if i == 0 { 0.0 } else { costs[i - 1] } + model.distance_cost(plane_code);
			for &(first, last, segment_cost) in &segments {
				let k_min = first.max(2);
				let k_max = last.min(len);
				if k_min > k_max {
					continue;
				}
				let start = i + k_min - 1;
				let end = i + k_max; // exclusive
				let candidate = distance_cost + segment_cost;
				if end - start <= DIRECT_UPDATE_LIMIT {
					for j in start..end {
						if candidate < costs[j] {
							costs[j] = candidate;
							dist_array[j] = (j - i + 1) as u16;
						}
					}
				} else {
					intervals.push(start, end, candidate, i);
				}
			}
		}
	}

	// Trace the chosen steps backwards, then replay them forwards.
	let mut path = Vec::new();
	let mut j = size as isize - 1;
	while j >= 0 {
		let step = dist_array[j as usize].max(1);
		path.push(step);
		j -= step as isize;
	}
	path.reverse();

	let mut refs = Vec::with_capacity(path.len());
	let mut cache = if cache_bits > 0 { Some(ColorCache::new(cache_bits)) } else { None };
	let mut i = 0usize;
	for &step in &path {
		let step = step as usize;
		if step == 1 {
			let pixel = argb[i];
			match &mut cache {
				Some(cache) => {
					if let Some(key) = cache.contains(pixel) {
						refs.push(PixOrCopy::CacheIdx(key));
					} else {
						refs.push(PixOrCopy::Literal(pixel));
					}
					cache.insert(pixel);
				}
				None => refs.push(PixOrCopy::Literal(pixel)),
			}
			i += 1;
		} else {
			let distance = chain.distance_at(i) as u32;
			debug_assert!(distance >= 1);
			debug_assert!(chain.length_at(i) >= step);
			refs.push(PixOrCopy::Copy {
				length: step as u32,
				distance,
			});
			if let Some(cache) = &mut cache {
				for &pixel in &argb[i..i + step] {
					cache.insert(pixel);
				}
			}
			i += step;
		}
	}
	debug_assert_eq!(i, size);
	Some(refs)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::vp8l::backward_refs::replay_refs;

	#[test]
	fn test_interval_list_basic() {
		let mut list = IntervalList::new();
		let mut costs = vec![f64::MAX; 20];
		let mut dist = vec![0u16; 20];
		list.push(2, 18, 5.0, 0);
		list.push(4, 10, 3.0, 2); // cheaper in the middle
		for i in 0..20 {
			list.apply_at(i, &mut costs, &mut dist);
		}
		assert_eq!(costs[3], 5.0);
		assert_eq!(costs[5], 3.0);
		assert_eq!(dist[5], 4); // 5 - 2 + 1
		assert_eq!(costs[15], 5.0);
		assert_eq!(dist[15], 16); // 15 - 0 + 1
		assert_eq!(costs[19], f64::MAX);
	}

	#[test]
	fn test_interval_push_absorbs_expensive() {
		let mut list = IntervalList::new();
		let mut costs = vec![f64::MAX; 16];
		let mut dist = vec![0u16; 16];
		list.push(3, 8, 9.0, 1);
		list.push(0, 16, 1.0, 0); // cheaper everywhere
		for i in 0..16 {
			list.apply_at(i, &mut costs, &mut dist);
		}
		assert!(costs.iter().all(|&c| c == 1.0));
	}

	#[test]
	fn test_trace_backwards_replays_exactly() {
		let mut argb = Vec::new();
		for y in 0..12u32 {
			for x in 0..16u32 {
				argb.push(0xFF00_0000 | (x / 4 * 40) << 8 | y % 3);
			}
		}
		let mut chain = HashChain::new();
		chain.fill(&argb, 80, 16, 12);
		let refs = trace_backwards(&argb, 16, &chain, 0).unwrap();
		assert_eq!(replay_refs(&refs, 0, false, 16), argb);
	}

	#[test]
	fn test_trace_backwards_with_cache_replays_exactly() {
		let mut argb = Vec::new();
		for i in 0..200u32 {
			argb.push(0xFF00_0000 | (i % 7) * 0x0103_0507);
		}
		let mut chain = HashChain::new();
		chain.fill(&argb, 80, 20, 10);
		let refs = trace_backwards(&argb, 20, &chain, 5).unwrap();
		assert_eq!(replay_refs(&refs, 5, false, 20), argb);
	}

	#[test]
	fn test_trace_prefers_runs_over_literals() {
		let argb = vec![0xFFAB_CDEF_u32; 256];
		let mut chain = HashChain::new();
		chain.fill(&argb, 80, 16, 16);
		let refs = trace_backwards(&argb, 16, &chain, 0).unwrap();
		// A flat image must collapse into a handful of tokens.
		assert!(refs.len() < 10, "{} tokens", refs.len());
		assert_eq!(replay_refs(&refs, 0, false, 16), argb);
	}
}
