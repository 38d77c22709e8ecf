//! Container-level behavior: probing, validation, malformed headers.

use webpine_rs::prelude::*;

use crate::gradient_image;

fn encode(pixels: &[u32], width: u32, height: u32) -> Vec<u8> {
	WebpEncoder::new()
		.encode(pixels, width, height, &EncoderOptions::default())
		.unwrap()
}

#[test]
fn test_get_features_matches_encode() {
	let pixels = gradient_image(31, 14);
	let file = encode(&pixels, 31, 14);
	let features = get_features(&file).unwrap();
	assert_eq!(features.width, 31);
	assert_eq!(features.height, 14);
	assert!(!features.has_animation);
	assert_eq!(features.frame_count, 1);
}

#[test]
fn test_decode_config_reports_nrgba_for_lossless() {
	let pixels = gradient_image(9, 9);
	let file = encode(&pixels, 9, 9);
	let (width, height, model) = decode_config(&file).unwrap();
	assert_eq!((width, height), (9, 9));
	assert_eq!(model, ColorModel::Nrgba);
}

#[test]
fn test_truncation_always_errors_never_panics() {
	let pixels = gradient_image(24, 24);
	let file = encode(&pixels, 24, 24);
	let mut decoder = WebpDecoder::new();
	for len in 0..file.len() {
		assert!(
			decoder.decode(&file[..len]).is_err(),
			"prefix of {len} bytes must fail"
		);
	}
}

#[test]
fn test_bad_magic_rejected() {
	let pixels = gradient_image(4, 4);
	let mut file = encode(&pixels, 4, 4);
	file[0] = b'X';
	assert!(matches!(
		get_features(&file),
		Err(WebpError::Riff(RiffError::InvalidRiffSignature(_)))
	));

	let mut file = encode(&pixels, 4, 4);
	file[8] = b'A';
	assert!(matches!(
		get_features(&file),
		Err(WebpError::Riff(RiffError::InvalidWebpForm(_)))
	));
}

#[test]
fn test_unknown_leading_chunk_rejected() {
	let mut file = Vec::new();
	file.extend_from_slice(b"RIFF");
	file.extend_from_slice(&12u32.to_le_bytes());
	file.extend_from_slice(b"WEBP");
	file.extend_from_slice(b"JUNK");
	file.extend_from_slice(&0u32.to_le_bytes());
	assert!(matches!(
		get_features(&file),
		Err(WebpError::Riff(RiffError::UnsupportedLeadingChunk(_)))
	));
}

#[test]
fn test_canvas_containment_enforced_by_muxer() {
	let mut muxer = Muxer::new();
	muxer.set_canvas(32, 32).unwrap();
	let header = AnmfHeader {
		offset_x: 30,
		offset_y: 0,
		width: 16,
		height: 16,
		duration_ms: 10,
		dispose: Dispose::None,
		blend: Blend::Alpha,
	};
	assert!(matches!(
		muxer.push_frame(header, &[0u8; 8], true, None, false),
		Err(MuxError::FrameOutsideCanvas)
	));
}

#[test]
fn test_vp8l_bitstream_corruption_detected() {
	let pixels = gradient_image(20, 20);
	let file = encode(&pixels, 20, 20);
	let mut decoder = WebpDecoder::new();
	// Flip bits inside the entropy-coded region; decodes must never panic
	// and the overwhelming majority must error or change pixels, not hang.
	for offset in [30usize, 40, 50, 60] {
		if offset >= file.len() {
			continue;
		}
		let mut corrupt = file.clone();
		corrupt[offset] ^= 0x55;
		let _ = decoder.decode(&corrupt);
	}
}
