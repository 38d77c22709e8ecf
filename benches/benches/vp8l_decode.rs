//! Benchmark suite for VP8L decoding
//!
//! Measures full-file decode throughput over the three synthetic content
//! classes, plus the encoder for reference.
//!
//! Run with: cargo bench --manifest-path benches/Cargo.toml

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use webpine_benches::{
	encode_fixture, generate_gradient, generate_noise, generate_palette_image, sizes,
};
use webpine_codec::WebpDecoder;

fn bench_decode_content_classes(c: &mut Criterion) {
	let mut group = c.benchmark_group("vp8l_decode");
	let (width, height) = sizes::SMALL;

	let fixtures = [
		("palette", generate_palette_image(width, height)),
		("gradient", generate_gradient(width, height)),
		("noise", generate_noise(width, height)),
	];
	for (name, pixels) in fixtures {
		let encoded = encode_fixture(&pixels, width, height, 75);
		group.throughput(Throughput::Elements(u64::from(width) * u64::from(height)));
		group.bench_with_input(BenchmarkId::new("decode", name), &encoded, |b, data| {
			let mut decoder = WebpDecoder::new();
			b.iter(|| {
				let image = decoder.decode(black_box(data));
				black_box(image)
			});
		});
	}
	group.finish();
}

fn bench_decode_sizes(c: &mut Criterion) {
	let mut group = c.benchmark_group("vp8l_decode_sizes");
	for (width, height) in [sizes::TINY, sizes::SMALL, sizes::MEDIUM] {
		let pixels = generate_gradient(width, height);
		let encoded = encode_fixture(&pixels, width, height, 75);
		let label = format!("{width}x{height}");
		group.throughput(Throughput::Elements(u64::from(width) * u64::from(height)));
		group.bench_with_input(BenchmarkId::new("decode", label), &encoded, |b, data| {
			let mut decoder = WebpDecoder::new();
			b.iter(|| black_box(decoder.decode(black_box(data))));
		});
	}
	group.finish();
}

fn bench_encode_quality(c: &mut Criterion) {
	let mut group = c.benchmark_group("vp8l_encode");
	group.sample_size(20);
	let (width, height) = sizes::TINY;
	let pixels = generate_gradient(width, height);
	for quality in [0u8, 50, 75, 100] {
		group.bench_with_input(
			BenchmarkId::new("quality", quality),
			&pixels,
			|b, pixels| {
				b.iter(|| black_box(encode_fixture(black_box(pixels), width, height, quality)));
			},
		);
	}
	group.finish();
}

criterion_group!(
	benches,
	bench_decode_content_classes,
	bench_decode_sizes,
	bench_encode_quality
);
criterion_main!(benches);
