//! Benchmark helper utilities for webpine-rs
//!
//! This module provides utilities for generating synthetic test images and
//! pre-encoded WebP payloads for the benchmark suite. The generators cover
//! the three content classes the codec specializes for: flat palette-like
//! art, smooth gradients that exercise the spatial predictors, and noise
//! that defeats every transform.

use webpine_codec::{EncoderOptions, WebpEncoder};

/// Generates a gradient test image exercising the spatial predictors.
pub fn generate_gradient(width: u32, height: u32) -> Vec<u32> {
	let mut pixels = Vec::with_capacity((width * height) as usize);
	for y in 0..height {
		for x in 0..width {
			let r = (x * 255 / width.max(1)) as u8;
			let g = (y * 255 / height.max(1)) as u8;
			let b = ((x + y) % 256) as u8;
			pixels.push(0xFF00_0000 | u32::from(r) << 16 | u32::from(g) << 8 | u32::from(b));
		}
	}
	pixels
}

/// Generates a 4-color checkerboard that lands on the palette path.
pub fn generate_palette_image(width: u32, height: u32) -> Vec<u32> {
	const COLORS: [u32; 4] = [0xFF00_0000, 0xFFFF_FFFF, 0xFFE0_4010, 0xFF10_40E0];
	let mut pixels = Vec::with_capacity((width * height) as usize);
	for y in 0..height {
		for x in 0..width {
			pixels.push(COLORS[((x / 4 + y / 4) % 4) as usize]);
		}
	}
	pixels
}

/// Generates deterministic noise that resists every transform.
pub fn generate_noise(width: u32, height: u32) -> Vec<u32> {
	let mut state = 0x0BAD_5EEDu32;
	(0..width * height)
		.map(|_| {
			state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
			state | 0xFF00_0000
		})
		.collect()
}

/// Encodes an image to a complete WebP file for decode benchmarks.
pub fn encode_fixture(pixels: &[u32], width: u32, height: u32, quality: u8) -> Vec<u8> {
	let options = EncoderOptions {
		quality,
		..EncoderOptions::default()
	};
	WebpEncoder::new()
		.encode(pixels, width, height, &options)
		.expect("fixture encodes")
}

/// Common benchmark sizes for synthetic test data
pub mod sizes {
	/// Tiny image: 64x64 (4,096 pixels)
	pub const TINY: (u32, u32) = (64, 64);
	/// Small image: 256x256 (65,536 pixels)
	pub const SMALL: (u32, u32) = (256, 256);
	/// Medium image: 512x512 (262,144 pixels)
	pub const MEDIUM: (u32, u32) = (512, 512);
	/// Large image: 1024x768 (786,432 pixels)
	pub const LARGE: (u32, u32) = (1024, 768);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_generators_fill_exactly() {
		assert_eq!(generate_gradient(7, 5).len(), 35);
		assert_eq!(generate_palette_image(16, 16).len(), 256);
		assert_eq!(generate_noise(8, 8).len(), 64);
	}

	#[test]
	fn test_palette_image_has_four_colors() {
		let pixels = generate_palette_image(32, 32);
		let mut unique: Vec<u32> = pixels.clone();
		unique.sort_unstable();
		unique.dedup();
		assert_eq!(unique.len(), 4);
	}

	#[test]
	fn test_encode_fixture_is_webp() {
		let pixels = generate_palette_image(16, 16);
		let data = encode_fixture(&pixels, 16, 16, 75);
		assert_eq!(&data[0..4], b"RIFF");
		assert_eq!(&data[8..12], b"WEBP");
	}
}
