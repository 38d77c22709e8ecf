//! Randomized robustness tests: arbitrary bytes must never panic.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use webpine_rs::prelude::*;

#[test]
fn test_random_bytes_never_panic() {
	let mut rng = SmallRng::seed_from_u64(0xC0DE_CAFE);
	let mut decoder = WebpDecoder::new();
	for round in 0..500 {
		let len = rng.random_range(0..512);
		let data: Vec<u8> = (0..len).map(|_| rng.random()).collect();
		let _ = decoder.decode(&data);
		let _ = get_features(&data);
		let _ = decode_config(&data);
		let _ = decoder.decode_animation(&data);
		let _ = round;
	}
}

#[test]
fn test_random_bytes_with_valid_preamble_never_panic() {
	let mut rng = SmallRng::seed_from_u64(0xDEC0_DE01);
	let mut decoder = WebpDecoder::new();
	for _ in 0..500 {
		let len = rng.random_range(0..256usize);
		let mut data = Vec::with_capacity(len + 20);
		data.extend_from_slice(b"RIFF");
		data.extend_from_slice(&((len as u32) + 12).to_le_bytes());
		data.extend_from_slice(b"WEBP");
		// Half the cases pretend to be VP8L streams.
		if rng.random() {
			data.extend_from_slice(b"VP8L");
			data.extend_from_slice(&(len as u32).to_le_bytes());
			data.push(0x2F);
		}
		for _ in 0..len {
			data.push(rng.random());
		}
		let _ = decoder.decode(&data);
		let _ = get_features(&data);
		let _ = decoder.decode_animation(&data);
	}
}

#[test]
fn test_mutated_valid_files_never_panic() {
	let pixels: Vec<u32> = (0..400u32)
		.map(|i| 0xFF00_0000 | (i % 5) * 0x0010_2030)
		.collect();
	let file = WebpEncoder::new()
		.encode(&pixels, 20, 20, &EncoderOptions::default())
		.unwrap();

	let mut rng = SmallRng::seed_from_u64(0xBAD_F00D);
	let mut decoder = WebpDecoder::new();
	for _ in 0..300 {
		let mut corrupt = file.clone();
		let flips = rng.random_range(1..8);
		for _ in 0..flips {
			let index = rng.random_range(0..corrupt.len());
			corrupt[index] ^= 1 << rng.random_range(0..8);
		}
		let _ = decoder.decode(&corrupt);
		let _ = get_features(&corrupt);
	}
}

#[test]
fn test_truncations_of_animation_never_panic() {
	let mut encoder = AnimationEncoder::new(8, 8, 2, 0).unwrap();
	let config = webpine_codec::vp8l::encoder::Vp8lConfig::default();
	for shade in 0..3u32 {
		encoder
			.add_frame(
				&vec![0xFF00_0000 | shade * 80; 64],
				8,
				8,
				&FrameOptions::default(),
				&config,
			)
			.unwrap();
	}
	let file = encoder.finish().unwrap();
	let mut decoder = WebpDecoder::new();
	for len in 0..file.len() {
		assert!(decoder.decode_animation(&file[..len]).is_err());
	}
}
