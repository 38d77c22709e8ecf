//! `webpine` command line utility: probe, decode and encode WebP files.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use serde::Serialize;
use webpine_internal::prelude::*;

#[derive(Parser)]
#[command(name = "webpine", version, about = "Pure-Rust WebP toolbox")]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Print container features of a WebP file
	Info {
		/// Input WebP file
		file: PathBuf,
		/// Emit machine-readable JSON
		#[arg(long)]
		json: bool,
	},
	/// List the frames of an animated WebP file
	Frames {
		/// Input WebP file
		file: PathBuf,
	},
	/// Decode a WebP file to PNG
	Decode {
		/// Input WebP file
		file: PathBuf,
		/// Output PNG path
		#[arg(short, long)]
		output: PathBuf,
	},
	/// Encode a PNG to lossless WebP
	Encode {
		/// Input PNG file
		file: PathBuf,
		/// Output WebP path
		#[arg(short, long)]
		output: PathBuf,
		/// Quality 0..=100
		#[arg(short, long, default_value_t = 75)]
		quality: u8,
		/// Effort 0..=6
		#[arg(short, long, default_value_t = 4)]
		method: u8,
		/// Preserve RGB under transparent pixels
		#[arg(long)]
		exact: bool,
		/// Near-lossless preprocessing quality (100 = off)
		#[arg(long, default_value_t = 100)]
		near_lossless: u8,
		/// Content preset
		#[arg(long, value_enum)]
		preset: Option<PresetArg>,
	},
}

#[derive(Clone, Copy, ValueEnum)]
enum PresetArg {
	Default,
	Picture,
	Photo,
	Drawing,
	Icon,
	Text,
}

impl From<PresetArg> for Preset {
	fn from(value: PresetArg) -> Self {
		match value {
			PresetArg::Default => Preset::Default,
			PresetArg::Picture => Preset::Picture,
			PresetArg::Photo => Preset::Photo,
			PresetArg::Drawing => Preset::Drawing,
			PresetArg::Icon => Preset::Icon,
			PresetArg::Text => Preset::Text,
		}
	}
}

#[derive(Serialize)]
struct FeatureReport {
	width: u32,
	height: u32,
	format: &'static str,
	has_alpha: bool,
	has_animation: bool,
	loop_count: u16,
	frame_count: u32,
}

fn main() -> anyhow::Result<()> {
	// Initialize logger with default level set to info if RUST_LOG is not set
	env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

	match Cli::parse().command {
		Command::Info {
			file,
			json,
		} => {
			let data = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
			let features = get_features(&data)?;
			let report = FeatureReport {
				width: features.width,
				height: features.height,
				format: match features.kind {
					webpine_codec::ImageKind::Lossy => "lossy",
					webpine_codec::ImageKind::Lossless => "lossless",
					webpine_codec::ImageKind::Extended => "extended",
				},
				has_alpha: features.has_alpha,
				has_animation: features.has_animation,
				loop_count: features.loop_count,
				frame_count: features.frame_count,
			};
			if json {
				println!("{}", serde_json::to_string_pretty(&report)?);
			} else {
				println!("{}x{} {}", report.width, report.height, report.format);
				println!("alpha: {}", report.has_alpha);
				println!("animation: {} ({} frames, loop {})", report.has_animation, report.frame_count, report.loop_count);
			}
		}
		Command::Frames {
			file,
		} => {
			let data = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
			let demuxer = Demuxer::from_bytes(&data)?;
			for (index, frame) in demuxer.frames().iter().enumerate() {
				let header = &frame.header;
				println!(
					"#{index}: {}x{} at ({},{}) {}ms dispose={:?} blend={:?} {}",
					header.width,
					header.height,
					header.offset_x,
					header.offset_y,
					header.duration_ms,
					header.dispose,
					header.blend,
					if frame.is_lossless { "VP8L" } else { "VP8" },
				);
			}
		}
		Command::Decode {
			file,
			output,
		} => {
			let data = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
			let mut decoder = WebpDecoder::new();
			let image = match decoder.decode(&data)? {
				Image::Argb(image) => image,
				Image::Yuv {
					..
				} => bail!("lossy pixel decode requires an external VP8 decoder"),
			};
			let mut rgba = image::RgbaImage::new(image.width, image.height);
			for (pixel, &argb) in rgba.pixels_mut().zip(&image.pixels) {
				pixel.0 = [
					(argb >> 16) as u8,
					(argb >> 8) as u8,
					argb as u8,
					(argb >> 24) as u8,
				];
			}
			rgba.save(&output).with_context(|| format!("writing {}", output.display()))?;
			info!("wrote {}", output.display());
		}
		Command::Encode {
			file,
			output,
			quality,
			method,
			exact,
			near_lossless,
			preset,
		} => {
			let input = image::open(&file)
				.with_context(|| format!("reading {}", file.display()))?
				.to_rgba8();
			let argb: Vec<u32> = input
				.pixels()
				.map(|pixel| {
					let [r, g, b, a] = pixel.0;
					u32::from(a) << 24 | u32::from(r) << 16 | u32::from(g) << 8 | u32::from(b)
				})
				.collect();
			let mut options = match preset {
				Some(preset) => EncoderOptions::preset(preset.into()),
				None => EncoderOptions::default(),
			};
			if preset.is_none() {
				options.quality = quality;
				options.method = method;
			}
			options.exact = exact;
			options.near_lossless = near_lossless;

			let mut encoder = WebpEncoder::new();
			let bytes = encoder.encode(&argb, input.width(), input.height(), &options)?;
			std::fs::write(&output, &bytes)
				.with_context(|| format!("writing {}", output.display()))?;
			info!("wrote {} ({} bytes)", output.display(), bytes.len());
		}
	}
	Ok(())
}
