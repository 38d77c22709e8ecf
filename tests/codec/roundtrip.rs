//! Lossless round-trip scenarios across the option space.

use webpine_rs::prelude::*;

use crate::{assert_lossless_roundtrip, gradient_image};

#[test]
fn test_single_pixel() {
	// 1x1 ARGB (255, 200, 100, 50) encodes and decodes pixel-exact.
	let pixels = vec![0xFFC8_6432u32];
	assert_lossless_roundtrip(&pixels, 1, 1, &EncoderOptions::default());
}

#[test]
fn test_four_color_palette_uses_color_indexing() {
	const COLORS: [u32; 4] = [0xFF11_2233, 0xFF44_5566, 0xFF77_8899, 0xFFAA_BBCC];
	let pixels: Vec<u32> = (0..256).map(|i| COLORS[(i / 7) % 4]).collect();

	let mut encoder = WebpEncoder::new();
	let file = encoder
		.encode(&pixels, 16, 16, &EncoderOptions::default())
		.unwrap();

	// The VP8L payload's first transform must be color indexing (kind 3)
	// with 2-bit packed pixels. Skip RIFF (12) + chunk header (8) + the
	// 40-bit VP8L header, then read: present=1, kind=3.
	let payload = &file[20..];
	let bits = u32::from(payload[5]);
	assert_eq!(bits & 1, 1, "transform present");
	assert_eq!(bits >> 1 & 0x3, 3, "color indexing transform");

	assert_lossless_roundtrip(&pixels, 16, 16, &EncoderOptions::default());
}

#[test]
fn test_max_width_single_row() {
	let width = 16383u32;
	let pixels: Vec<u32> = (0..width)
		.map(|x| 0xFF00_0000 | (x % 256) << 16 | (x / 128) << 8 | 200)
		.collect();
	assert_lossless_roundtrip(&pixels, width, 1, &EncoderOptions::default());
}

#[test]
fn test_max_height_single_column() {
	let height = 4096u32;
	let pixels: Vec<u32> = (0..height).map(|y| 0xFF00_0000 | (y % 251) << 8).collect();
	assert_lossless_roundtrip(&pixels, 1, height, &EncoderOptions::default());
}

#[test]
fn test_oversized_dimension_rejected() {
	let mut encoder = WebpEncoder::new();
	let err = encoder
		.encode(&vec![0u32; 16384], 16384, 1, &EncoderOptions::default())
		.unwrap_err();
	assert!(matches!(err, WebpError::Mux(MuxError::DimensionsTooLarge { .. })));
}

#[test_log::test]
fn test_quality_method_grid() {
	let pixels = gradient_image(40, 25);
	for quality in [0u8, 25, 50, 75, 100] {
		for method in [0u8, 3, 6] {
			let options = EncoderOptions {
				quality,
				method,
				..EncoderOptions::default()
			};
			assert_lossless_roundtrip(&pixels, 40, 25, &options);
		}
	}
}

#[test]
fn test_exact_mode_preserves_hidden_rgb() {
	let mut pixels = gradient_image(8, 8);
	pixels[10] &= 0x00FF_FFFF; // fully transparent, RGB kept
	pixels[20] &= 0x00FF_FFFF;
	let options = EncoderOptions {
		exact: true,
		..EncoderOptions::default()
	};
	assert_lossless_roundtrip(&pixels, 8, 8, &options);
}

#[test]
fn test_alpha_gradient_roundtrip() {
	let pixels: Vec<u32> = (0..64u32)
		.map(|i| (i * 4) << 24 | 0x0011_2233)
		.collect();
	let options = EncoderOptions {
		exact: true,
		..EncoderOptions::default()
	};
	assert_lossless_roundtrip(&pixels, 8, 8, &options);
}

#[test]
fn test_metadata_byte_exact_roundtrip() {
	let pixels = gradient_image(5, 5);
	let metadata = Metadata {
		iccp: Some(vec![1, 2, 3, 4, 5]),
		exif: Some(vec![0xFF; 33]), // odd length exercises chunk padding
		xmp: Some(b"<x:xmpmeta></x:xmpmeta>".to_vec()),
	};
	let mut encoder = WebpEncoder::new();
	let file = encoder
		.encode_with_metadata(&pixels, 5, 5, &EncoderOptions::default(), &metadata)
		.unwrap();

	let demuxer = Demuxer::from_bytes(&file).unwrap();
	assert_eq!(demuxer.iccp(), metadata.iccp.as_deref());
	assert_eq!(demuxer.exif(), metadata.exif.as_deref());
	assert_eq!(demuxer.xmp(), metadata.xmp.as_deref());
}

#[test]
fn test_decoder_handle_reuse() {
	let mut encoder = WebpEncoder::new();
	let mut decoder = WebpDecoder::new();
	for size in [1u32, 3, 16, 40] {
		let pixels = gradient_image(size, size);
		let file = encoder
			.encode(&pixels, size, size, &EncoderOptions::default())
			.unwrap();
		match decoder.decode(&file).unwrap() {
			Image::Argb(image) => assert_eq!(image.pixels, pixels),
			Image::Yuv { .. } => panic!("lossless files decode to ARGB"),
		}
	}
}
