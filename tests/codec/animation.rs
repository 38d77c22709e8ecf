//! Animation scenarios: assembly, demux, and compositing semantics.

use webpine_rs::prelude::*;

fn solid(argb: u32, count: usize) -> Vec<u32> {
	vec![argb; count]
}

#[test]
fn test_three_frame_animation_roundtrip() {
	// Canvas 16x16: red, half-transparent green blended, blue. Durations
	// 100ms each, infinite loop.
	let mut encoder = AnimationEncoder::new(16, 16, 0, 0).unwrap();
	let config = webpine_codec::vp8l::encoder::Vp8lConfig {
		exact: true,
		..Default::default()
	};
	let frames = [
		solid(0xFFFF_0000, 256),
		solid(0x8000_FF00, 256),
		solid(0xFF00_00FF, 256),
	];
	for pixels in &frames {
		encoder
			.add_frame(pixels, 16, 16, &FrameOptions::default(), &config)
			.unwrap();
	}
	let file = encoder.finish().unwrap();

	let features = get_features(&file).unwrap();
	assert!(features.has_animation);
	assert_eq!(features.frame_count, 3);
	assert_eq!(features.loop_count, 0);

	let mut decoder = WebpDecoder::new();
	let (composited, _) = decoder.decode_animation(&file).unwrap();
	assert_eq!(composited.len(), 3);
	for frame in &composited {
		assert_eq!(frame.duration_ms, 100);
		assert_eq!(frame.pixels.len(), 256);
	}
	// Frame 1 is solid red.
	assert!(composited[0].pixels.iter().all(|&pixel| pixel == 0xFFFF_0000));
	// Frame 2 blends half-green over red: red halves, green appears.
	let blended = composited[1].pixels[0];
	assert_eq!(blended >> 24, 255);
	assert!((blended >> 16 & 0xFF) < 0xFF && (blended >> 16 & 0xFF) > 0x60);
	assert!((blended >> 8 & 0xFF) > 0x60);
	// Frame 3 overwrote... blended again, but blue is opaque.
	assert!(composited[2].pixels.iter().all(|&pixel| pixel == 0xFF00_00FF));
}

#[test]
fn test_dispose_background_between_frames() {
	let background = 0x0000_0000u32;
	let mut encoder = AnimationEncoder::new(8, 8, 3, background).unwrap();
	let config = webpine_codec::vp8l::encoder::Vp8lConfig::default();

	// A full-canvas opaque frame that disposes to background, then a tiny
	// frame in the corner; everything outside it must return to the
	// (transparent) background.
	encoder
		.add_frame(
			&solid(0xFFAA_0000, 64),
			8,
			8,
			&FrameOptions {
				dispose: Dispose::Background,
				blend: Blend::None,
				..FrameOptions::default()
			},
			&config,
		)
		.unwrap();
	encoder
		.add_frame(
			&solid(0xFF00_AA00, 4),
			2,
			2,
			&FrameOptions {
				blend: Blend::None,
				..FrameOptions::default()
			},
			&config,
		)
		.unwrap();
	let file = encoder.finish().unwrap();

	let mut decoder = WebpDecoder::new();
	let (frames, features) = decoder.decode_animation(&file).unwrap();
	assert_eq!(features.loop_count, 3);
	assert_eq!(frames.len(), 2);
	let second = &frames[1].pixels;
	assert_eq!(second[0], 0xFF00_AA00, "new frame rectangle");
	assert_eq!(second[9], 0xFF00_AA00);
	assert_eq!(second[7], background, "disposed area");
	assert_eq!(second[63], background, "disposed area");
}

#[test]
fn test_duration_and_loop_clamping_roundtrip() {
	let mut encoder = AnimationEncoder::new(4, 4, 1_000_000, 0).unwrap();
	let config = webpine_codec::vp8l::encoder::Vp8lConfig::default();
	encoder
		.add_frame(
			&solid(0xFF12_3456, 16),
			4,
			4,
			&FrameOptions {
				duration_ms: u32::MAX,
				..FrameOptions::default()
			},
			&config,
		)
		.unwrap();
	let file = encoder.finish().unwrap();

	let features = get_features(&file).unwrap();
	assert_eq!(features.loop_count, 65535);
	let demuxer = Demuxer::from_bytes(&file).unwrap();
	assert_eq!(demuxer.frames()[0].header.duration_ms, (1 << 24) - 1);
}

#[test]
fn test_odd_offsets_rejected() {
	let mut encoder = AnimationEncoder::new(8, 8, 0, 0).unwrap();
	let config = webpine_codec::vp8l::encoder::Vp8lConfig::default();
	let err = encoder
		.add_frame(
			&solid(0xFF00_0000, 4),
			2,
			2,
			&FrameOptions {
				offset_x: 3,
				..FrameOptions::default()
			},
			&config,
		)
		.unwrap_err();
	assert!(matches!(err, WebpError::Mux(MuxError::OddFrameOffset { .. })));
}

#[test]
fn test_still_image_decodes_as_single_frame_sequence() {
	let pixels = solid(0xFF31_4159, 25);
	let file = WebpEncoder::new()
		.encode(&pixels, 5, 5, &EncoderOptions::default())
		.unwrap();
	let mut decoder = WebpDecoder::new();
	let (frames, features) = decoder.decode_animation(&file).unwrap();
	assert!(!features.has_animation);
	assert_eq!(frames.len(), 1);
	assert_eq!(frames[0].pixels, pixels);
}
