//! Benchmarks for the rolling trigger window.

use std::hint::black_box;
use std::time::{Duration, Instant};

use backbeat::context::{ContextTracker, DrumKind, Thresholds, Trigger};
use criterion::{BenchmarkId, Criterion};

const WINDOW_SIZES: &[usize] = &[8, 64, 512];

pub fn bench_context(c: &mut Criterion) {
    let mut group = c.benchmark_group("context");

    for &capacity in WINDOW_SIZES {
        let tracker = ContextTracker::new(Thresholds::default(), capacity, Duration::from_secs(3600));
        let now = Instant::now();
        for i in 0..capacity {
            tracker.on_trigger(Trigger::new(DrumKind::Snare, (i % 127) as u8 + 1, now));
        }

        // Window stays full, so every push also evicts
        group.bench_with_input(BenchmarkId::new("on_trigger", capacity), &capacity, |b, _| {
            b.iter(|| tracker.on_trigger(black_box(Trigger::new(DrumKind::Kick, 100, now))))
        });

        group.bench_with_input(BenchmarkId::new("snapshot", capacity), &capacity, |b, _| {
            b.iter(|| tracker.snapshot_at(black_box(now)))
        });
    }

    group.finish();
}
