//! Benchmarks for note-on dispatch and note-off scheduling.

use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, Instant};

use backbeat::engine::{EventScheduler, ManualTime, NoteOffQueue};
use backbeat::error::TransportError;
use backbeat::io::{MidiEvent, Note, OutputPort};
use criterion::{BenchmarkId, Criterion};

use crate::QUEUE_DEPTHS;

/// Port that discards everything, so only scheduler cost is measured
struct NullPort;

impl OutputPort for NullPort {
    fn send(&self, event: MidiEvent) -> Result<(), TransportError> {
        black_box(event);
        Ok(())
    }
}

/// Started scheduler on frozen time holding `depth` note-offs that never fire
fn scheduler_with_depth(depth: usize) -> EventScheduler {
    let time = Arc::new(ManualTime::new());
    let scheduler = EventScheduler::with_time_source(Arc::new(NullPort), time.clone());
    scheduler.start().unwrap();

    let far = time.now() + Duration::from_secs(3600);
    for i in 0..depth {
        scheduler.schedule_note_off(Note::new(1, (i % 128) as u8, 100), far);
    }
    scheduler
}

pub fn bench_scheduler(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler");
    let note = Note::new(1, 64, 100);

    for &depth in QUEUE_DEPTHS {
        let scheduler = scheduler_with_depth(depth);
        group.bench_with_input(BenchmarkId::new("note_on", depth), &depth, |b, _| {
            b.iter(|| scheduler.fire_note_on(black_box(note)))
        });
    }

    // Insert and pop back out, keeping the heap at a constant depth
    for &depth in QUEUE_DEPTHS {
        let now = Instant::now();
        let mut queue = NoteOffQueue::new();
        for i in 0..depth {
            queue.schedule(note, now + Duration::from_millis(1 + i as u64));
        }
        group.bench_with_input(BenchmarkId::new("queue_schedule_pop", depth), &depth, |b, _| {
            b.iter(|| {
                queue.schedule(black_box(note), now);
                queue.pop_due(now)
            })
        });
    }

    group.finish();
}
