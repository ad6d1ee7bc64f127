//! Benchmarks for the real-time decision path.
//!
//! Run with: cargo bench
//!
//! Everything measured here runs between a drum hit arriving and its note-on
//! leaving. At 120 BPM a sixteenth note lasts 125ms; the whole path should
//! stay in the microsecond range so that it is never the audible part.
//!
//! Benchmark groups:
//!   - scheduler/*  note-on latency against note-off queue depth
//!   - decision/*   baked table sampling
//!   - context/*    rolling window updates and snapshots

use criterion::{criterion_group, criterion_main};

mod realtime;

/// Pending note-off counts to measure against.
pub const QUEUE_DEPTHS: &[usize] = &[0, 16, 256, 4096];

criterion_group!(
    benches,
    realtime::bench_scheduler,
    realtime::bench_decision,
    realtime::bench_context,
);
criterion_main!(benches);
