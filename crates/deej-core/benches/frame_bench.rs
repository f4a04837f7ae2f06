//! Criterion benchmarks for the deej serial frame decoder.
//!
//! The board sends a line every few milliseconds; decoding must stay far
//! below that so the serial reader never falls behind.
//!
//! Run with:
//! ```bash
//! cargo bench --package deej-core --bench frame_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use deej_core::{parse_line, DecoderSettings, FrameDecoder, MAX_RAW_VALUE};

// ── Line fixtures ─────────────────────────────────────────────────────────────

fn make_line(sliders: usize, offset: u16) -> String {
    let body: Vec<String> = (0..sliders)
        .map(|i| ((i as u16 * 97 + offset) % (MAX_RAW_VALUE + 1)).to_string())
        .collect();
    format!("{}\r\n", body.join("|"))
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_parse_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_line");
    for sliders in [1usize, 5, 16] {
        let line = make_line(sliders, 0);
        group.bench_with_input(BenchmarkId::from_parameter(sliders), &line, |b, line| {
            b.iter(|| parse_line(black_box(line), MAX_RAW_VALUE))
        });
    }
    group.finish();
}

fn bench_decode_steady_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_steady_state");
    for sliders in [1usize, 5, 16] {
        let line = make_line(sliders, 0);
        let mut decoder = FrameDecoder::new(DecoderSettings::default());
        decoder.decode(&line);
        group.bench_with_input(BenchmarkId::from_parameter(sliders), &line, |b, line| {
            b.iter(|| decoder.decode(black_box(line)))
        });
    }
    group.finish();
}

fn bench_decode_all_moving(c: &mut Criterion) {
    let lines = [make_line(5, 0), make_line(5, 300)];
    let mut decoder = FrameDecoder::new(DecoderSettings::default());
    let mut flip = 0usize;
    c.bench_function("decode_all_moving_5", |b| {
        b.iter(|| {
            flip ^= 1;
            decoder.decode(black_box(&lines[flip]))
        })
    });
}

criterion_group!(
    benches,
    bench_parse_line,
    bench_decode_steady_state,
    bench_decode_all_moving
);
criterion_main!(benches);
