//! Integration tests for the webpine-rs codec surface.

mod animation;
mod container;
mod fuzz;
mod roundtrip;

use webpine_rs::prelude::*;

/// Deterministic pixel generator shared by the test modules.
pub fn gradient_image(width: u32, height: u32) -> Vec<u32> {
	let mut pixels = Vec::with_capacity((width * height) as usize);
	for y in 0..height {
		for x in 0..width {
			let r = (x * 7 + y) % 256;
			let g = (x + y * 11) % 256;
			let b = (x * 3 + y * 5) % 256;
			pixels.push(0xFF00_0000 | r << 16 | g << 8 | b);
		}
	}
	pixels
}

/// Encodes and decodes, asserting pixel-exactness.
pub fn assert_lossless_roundtrip(pixels: &[u32], width: u32, height: u32, options: &EncoderOptions) {
	let mut encoder = WebpEncoder::new();
	let file = encoder.encode(pixels, width, height, options).expect("encode succeeds");
	let mut decoder = WebpDecoder::new();
	match decoder.decode(&file).expect("decode succeeds") {
		Image::Argb(image) => {
			assert_eq!(image.width, width);
			assert_eq!(image.height, height);
			assert_eq!(image.pixels, pixels);
		}
		Image::Yuv { .. } => panic!("lossless files decode to ARGB"),
	}
}
