//! Hot-path benchmarks: onset detection per energy buffer and on-beat
//! scoring per input event.

use clapbeat::audio::{mean_abs_energy, EnergySample, OnsetDetector};
use clapbeat::game::{BeatTimeline, Scoreboard};
use clapbeat::input::{InputEvent, InputKind};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// 20 seconds of 1024-frame buffers at 44.1 kHz with a clap every half second.
fn synthetic_energies() -> Vec<EnergySample> {
    let buffer_seconds = 1024.0 / 44_100.0;
    (0..862)
        .map(|i| {
            let timestamp = i as f64 * buffer_seconds;
            let energy = if i % 22 == 0 { 0.6 } else { 0.01 };
            EnergySample { energy, timestamp }
        })
        .collect()
}

fn bench_onset_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("onset_detection");
    let samples = synthetic_energies();

    group.bench_function("process_20s", |b| {
        b.iter(|| {
            let mut detector = OnsetDetector::new(0.1, 0.5, 30);
            for sample in &samples {
                black_box(detector.process(black_box(*sample)));
            }
            detector.onset_count()
        });
    });

    let buffer: Vec<f32> = (0..1024).map(|i| ((i as f32) * 0.01).sin()).collect();
    group.bench_function("mean_abs_energy_1024", |b| {
        b.iter(|| black_box(mean_abs_energy(black_box(&buffer))));
    });

    group.finish();
}

fn bench_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoring");

    let timeline = BeatTimeline::generate(0.0, 120.0, 20.0).expect("valid timeline");
    let events: Vec<InputEvent> = (0..200)
        .map(|i| InputEvent {
            participant: (i % 4) as u8 + 1,
            timestamp: i as f64 * 0.1,
            source: InputKind::Keyboard,
        })
        .collect();

    group.bench_function("register_200_events", |b| {
        b.iter(|| {
            let mut board = Scoreboard::new(&[1, 2, 3, 4]);
            for event in &events {
                black_box(board.register(event, &timeline, 0.2));
            }
            board.winner()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_onset_detection, bench_scoring);
criterion_main!(benches);
