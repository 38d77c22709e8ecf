//! Animation compositing and assembly.
//!
//! The compositor is a small state machine over a persistent canvas: each
//! frame first applies the *previous* frame's disposal, then renders its
//! own rectangle with its blend rule. Frames composite in file order;
//! `loop_count` applies outside (a renderer replays the whole sequence,
//! zero meaning forever).

use crate::error::{MuxError, WebpError};
use crate::riff::{AnmfHeader, Blend, Dispose, Muxer};
use crate::vp8l::encoder::{Vp8lConfig, Vp8lEncoder};

/// One composited animation frame.
#[derive(Debug, Clone)]
pub struct AnimationFrame {
	/// Full-canvas ARGB pixels after compositing.
	pub pixels: Vec<u32>,
	/// Display duration in milliseconds.
	pub duration_ms: u32,
}

/// Canvas state machine applying dispose and blend rules.
#[derive(Debug)]
pub struct Compositor {
	width: u32,
	height: u32,
	canvas: Vec<u32>,
	background: u32,
	/// Disposal owed by the previously rendered frame.
	pending_dispose: Option<(u32, u32, u32, u32)>,
}

impl Compositor {
	/// Creates a canvas cleared to the animation background color.
	///
	/// The stored ANIM color is byte-order `B,G,R,A`, which read as a
	/// little-endian word is exactly packed ARGB.
	pub fn new(width: u32, height: u32, background: u32) -> Self {
		Self {
			width,
			height,
			canvas: vec![background; width as usize * height as usize],
			background,
			pending_dispose: None,
		}
	}

	/// Canvas width.
	pub fn width(&self) -> u32 {
		self.width
	}

	/// Canvas height.
	pub fn height(&self) -> u32 {
		self.height
	}

	/// Applies one frame and returns the composited canvas.
	///
	/// `pixels` is the frame's own `width * height` rectangle.
	pub fn render(&mut self, header: &AnmfHeader, pixels: &[u32]) -> &[u32] {
		debug_assert_eq!(
			pixels.len(),
			header.width as usize * header.height as usize
		);
		if let Some((x, y, width, height)) = self.pending_dispose.take() {
			self.fill_rect(x, y, width, height, self.background);
		}

		let canvas_width = self.width as usize;
		for row in 0..header.height as usize {
			let src_row = row * header.width as usize;
			let dst_row =
				(header.offset_y as usize + row) * canvas_width + header.offset_x as usize;
			match header.blend {
				Blend::None => {
					self.canvas[dst_row..dst_row + header.width as usize]
						.copy_from_slice(&pixels[src_row..src_row + header.width as usize]);
				}
				Blend::Alpha => {
					for col in 0..header.width as usize {
						let src = pixels[src_row + col];
						let dst = &mut self.canvas[dst_row + col];
						*dst = blend_pixel(src, *dst);
					}
				}
			}
		}

		if header.dispose == Dispose::Background {
			self.pending_dispose =
				Some((header.offset_x, header.offset_y, header.width, header.height));
		}
		&self.canvas
	}

	fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, value: u32) {
		let canvas_width = self.width as usize;
		for row in y as usize..(y + height) as usize {
			let start = row * canvas_width + x as usize;
			self.canvas[start..start + width as usize].fill(value);
		}
	}
}

/// Source-over compositing in straight (non-premultiplied) alpha.
fn blend_pixel(src: u32, dst: u32) -> u32 {
	let src_a = src >> 24;
	if src_a == 255 {
		return src;
	}
	if src_a == 0 {
		return dst;
	}
	let dst_a = dst >> 24;
	let blend_a = src_a + dst_a * (255 - src_a) / 255;
	if blend_a == 0 {
		return 0;
	}
	let mut out = blend_a << 24;
	for shift in [16, 8, 0] {
		let src_c = src >> shift & 0xFF;
		let dst_c = dst >> shift & 0xFF;
		let channel = (src_c * src_a + dst_c * dst_a * (255 - src_a) / 255) / blend_a;
		out |= channel.min(255) << shift;
	}
	out
}

/// Per-frame parameters of the animation encoder.
#[derive(Debug, Clone, Copy)]
pub struct FrameOptions {
	/// Display duration in milliseconds; clamped to 24 bits.
	pub duration_ms: u32,
	/// Disposal after display.
	pub dispose: Dispose,
	/// Blend rule against the canvas.
	pub blend: Blend,
	/// Even x offset on the canvas.
	pub offset_x: u32,
	/// Even y offset on the canvas.
	pub offset_y: u32,
}

impl Default for FrameOptions {
	fn default() -> Self {
		Self {
			duration_ms: 100,
			dispose: Dispose::None,
			blend: Blend::Alpha,
			offset_x: 0,
			offset_y: 0,
		}
	}
}

/// Assembles a lossless animated WebP frame by frame.
#[derive(Debug)]
pub struct AnimationEncoder {
	muxer: Muxer,
	lossless: Vp8lEncoder,
	frames_added: usize,
}

impl AnimationEncoder {
	/// Creates an encoder for the given canvas; `loop_count` is clamped to
	/// 16 bits, `background` is packed ARGB.
	pub fn new(
		canvas_width: u32,
		canvas_height: u32,
		loop_count: u32,
		background: u32,
	) -> Result<Self, MuxError> {
		let mut muxer = Muxer::new();
		muxer.set_canvas(canvas_width, canvas_height)?;
		muxer.set_loop_count(loop_count);
		muxer.set_background_color(background);
		Ok(Self {
			muxer,
			lossless: Vp8lEncoder::new(),
			frames_added: 0,
		})
	}

	/// Encodes `argb` as the next frame.
	pub fn add_frame(
		&mut self,
		argb: &[u32],
		width: u32,
		height: u32,
		options: &FrameOptions,
		config: &Vp8lConfig,
	) -> Result<(), WebpError> {
		let payload = self.lossless.encode(argb, width, height, config)?;
		let has_alpha = argb.iter().any(|&pixel| pixel >> 24 != 0xFF);
		let header = AnmfHeader {
			offset_x: options.offset_x,
			offset_y: options.offset_y,
			width,
			height,
			duration_ms: options.duration_ms,
			dispose: options.dispose,
			blend: options.blend,
		};
		self.muxer.push_frame(header, &payload, true, None, has_alpha)?;
		self.frames_added += 1;
		Ok(())
	}

	/// Serializes the animation.
	pub fn finish(&self) -> Result<Vec<u8>, WebpError> {
		if self.frames_added == 0 {
			return Err(MuxError::EmptyAnimation.into());
		}
		Ok(self.muxer.finish()?)
	}
}
