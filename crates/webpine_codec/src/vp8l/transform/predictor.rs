//! The fourteen spatial prediction modes.
//!
//! Both the encoder's mode search and the decoder's inverse pass go through
//! [`predict`], so the two sides cannot drift apart on edge rules.

use crate::vp8l::average2;

/// Number of prediction modes.
pub const NUM_PREDICTORS: usize = 14;

#[inline]
fn clip255(value: i32) -> u32 {
	value.clamp(0, 255) as u32
}

#[inline]
fn add_subtract_component_full(a: i32, b: i32, c: i32) -> u32 {
	clip255(a + b - c)
}

#[inline]
fn add_subtract_component_half(a: i32, b: i32) -> u32 {
	clip255(a + (a - b) / 2)
}

fn clamped_add_subtract_full(c0: u32, c1: u32, c2: u32) -> u32 {
	let mut result = 0u32;
	for shift in [24, 16, 8, 0] {
		let channel = add_subtract_component_full(
			(c0 >> shift & 0xFF) as i32,
			(c1 >> shift & 0xFF) as i32,
			(c2 >> shift & 0xFF) as i32,
		);
		result |= channel << shift;
	}
	result
}

fn clamped_add_subtract_half(c0: u32, c1: u32, c2: u32) -> u32 {
	let ave = average2(c0, c1);
	let mut result = 0u32;
	for shift in [24, 16, 8, 0] {
		let channel = add_subtract_component_half(
			(ave >> shift & 0xFF) as i32,
			(c2 >> shift & 0xFF) as i32,
		);
		result |= channel << shift;
	}
	result
}

/// Picks left or top, whichever gradient the top-left corner favors.
fn select(top: u32, left: u32, top_left: u32) -> u32 {
	let mut pa_minus_pb = 0i32;
	for shift in [24, 16, 8, 0] {
		let a = (top >> shift & 0xFF) as i32;
		let b = (left >> shift & 0xFF) as i32;
		let c = (top_left >> shift & 0xFF) as i32;
		pa_minus_pb += (b - c).abs() - (a - c).abs();
	}
	if pa_minus_pb <= 0 { top } else { left }
}

/// Predicted pixel for `mode` given the four decoded/original neighbors.
#[inline]
pub fn predict(mode: u8, left: u32, top: u32, top_left: u32, top_right: u32) -> u32 {
	match mode {
		0 => 0xFF00_0000,
		1 => left,
		2 => top,
		3 => top_right,
		4 => top_left,
		5 => average2(average2(left, top_right), top),
		6 => average2(left, top_left),
		7 => average2(left, top),
		8 => average2(top_left, top),
		9 => average2(top, top_right),
		10 => average2(average2(left, top_left), average2(top, top_right)),
		11 => select(top, left, top_left),
		12 => clamped_add_subtract_full(left, top, top_left),
		_ => clamped_add_subtract_half(left, top, top_left),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::vp8l::make_argb;

	#[test]
	fn test_mode0_is_opaque_black() {
		assert_eq!(predict(0, 0x12345678, 0x9ABCDEF0, 0, 0), 0xFF00_0000);
	}

	#[test]
	fn test_directional_modes() {
		let left = make_argb(255, 1, 2, 3);
		let top = make_argb(255, 4, 5, 6);
		let top_left = make_argb(255, 7, 8, 9);
		let top_right = make_argb(255, 10, 11, 12);
		assert_eq!(predict(1, left, top, top_left, top_right), left);
		assert_eq!(predict(2, left, top, top_left, top_right), top);
		assert_eq!(predict(3, left, top, top_left, top_right), top_right);
		assert_eq!(predict(4, left, top, top_left, top_right), top_left);
	}

	#[test]
	fn test_average_mode7() {
		let left = make_argb(255, 10, 20, 30);
		let top = make_argb(255, 20, 40, 50);
		assert_eq!(predict(7, left, top, 0, 0), make_argb(255, 15, 30, 40));
	}

	#[test]
	fn test_select_prefers_smoother_direction() {
		// top == top_left: predicting from left costs nothing extra.
		let left = make_argb(255, 9, 9, 9);
		let top = make_argb(255, 100, 100, 100);
		let top_left = make_argb(255, 100, 100, 100);
		assert_eq!(predict(11, left, top, top_left, 0), left);
	}

	#[test]
	fn test_clamped_full_saturates() {
		let left = make_argb(255, 250, 0, 0);
		let top = make_argb(255, 250, 0, 0);
		let top_left = make_argb(255, 0, 200, 0);
		let predicted = predict(12, left, top, top_left, 0);
		assert_eq!(predicted >> 16 & 0xFF, 255); // 250+250-0 clips
		assert_eq!(predicted >> 8 & 0xFF, 0); // 0+0-200 clips
	}
}
