//! Engine Performance Benchmarks
//!
//! The interpreter re-executes its whole program for every output sample,
//! so per-sample cost is the number that matters. For real-time use the
//! budget is:
//!
//! ```text
//! time_budget = buffer_size / sample_rate
//! ```
//!
//! | Sample Rate | Buffer 64 | Buffer 256 | Buffer 512 |
//! |-------------|-----------|------------|------------|
//! | 44.1 kHz    | 1.45 ms   | 5.80 ms    | 11.61 ms   |
//! | 48 kHz      | 1.33 ms   | 5.33 ms    | 10.67 ms   |
//!
//! These benchmarks validate that every reference program clears the
//! budget with a wide margin.

use carillon::prelude::*;
use carillon::presets;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const SAMPLE_RATE: f32 = 44_100.0;
const BUFFER_SIZES: [usize; 4] = [64, 128, 256, 512];

/// One block of every reference program.
fn bench_presets(c: &mut Criterion) {
    let mut group = c.benchmark_group("patch_step");
    group.throughput(Throughput::Elements(512));

    for info in presets::CATALOGUE {
        let program = (info.build)();
        group.bench_function(info.name, |b| {
            let mut patch = Patch::new(&program, SAMPLE_RATE);
            patch.note_on(60, 0.8);
            let mut buf = [0.0f32; 512];
            b.iter(|| {
                patch.step(black_box(&mut buf));
            });
        });
    }

    group.finish();
}

/// Block-size scaling for one representative program.
fn bench_block_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_size");
    let program = presets::fm_fold();

    for &size in &BUFFER_SIZES {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut patch = Patch::new(&program, SAMPLE_RATE);
            patch.note_on(60, 0.8);
            let mut buf = vec![0.0f32; size];
            b.iter(|| {
                patch.step(black_box(&mut buf));
            });
        });
    }

    group.finish();
}

/// Full pipeline: compile a score and render it through the scheduler.
fn bench_voice_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("voice_render");
    group.throughput(Throughput::Elements(512));

    let mut vb = VoiceBuilder::new();
    vb.repeat_begin();
    for pitch in [60u8, 62, 64, 65, 67, 69, 71, 72] {
        vb.note(pitch, Dur::Sixteenth, Vel::Mf);
    }
    vb.repeat_end(8);
    let score = vb.finish().unwrap().compile().unwrap();
    let program = presets::fm_piano();

    group.bench_function("scale_blocks", |b| {
        let mut renderer = VoiceRenderer::new(&score, &program, 120.0, SAMPLE_RATE);
        let mut buf = [0.0f32; 512];
        b.iter(|| {
            renderer.render_block(black_box(&mut buf));
        });
    });

    group.bench_function("compile_scale", |b| {
        let mut vb = VoiceBuilder::new();
        vb.repeat_begin();
        for pitch in [60u8, 62, 64, 65, 67, 69, 71, 72] {
            vb.note(pitch, Dur::Sixteenth, Vel::Mf);
        }
        vb.repeat_end(8);
        let program = vb.finish().unwrap();
        b.iter(|| black_box(&program).compile().unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_presets, bench_block_sizes, bench_voice_render);
criterion_main!(benches);
