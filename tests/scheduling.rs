use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use backbeat::engine::{EventScheduler, ManualTime, TimeSource};
use backbeat::io::{MemoryPort, MidiEvent, Note};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WAIT: Duration = Duration::from_secs(5);

fn manual_scheduler() -> (EventScheduler, Arc<MemoryPort>, Arc<ManualTime>) {
    let port = Arc::new(MemoryPort::new());
    let time = Arc::new(ManualTime::new());
    let scheduler = EventScheduler::with_time_source(port.clone(), time.clone());
    scheduler.start().unwrap();
    (scheduler, port, time)
}

#[test]
fn shorter_note_scheduled_later_releases_first() {
    let (scheduler, port, time) = manual_scheduler();
    let base = time.now();

    scheduler.schedule_note_off(Note::new(1, 60, 100), base + Duration::from_millis(100));
    scheduler.schedule_note_off(Note::new(1, 62, 100), base + Duration::from_millis(50));

    time.advance(Duration::from_millis(50));
    scheduler.poke();
    assert!(port.wait_for(1, WAIT));
    assert_eq!(port.events(), vec![MidiEvent::NoteOff { channel: 1, pitch: 62 }]);

    time.advance(Duration::from_millis(50));
    scheduler.poke();
    assert!(port.wait_for(2, WAIT));
    assert_eq!(port.events()[1], MidiEvent::NoteOff { channel: 1, pitch: 60 });
}

#[test]
fn release_order_follows_deadlines_with_fifo_ties() {
    let (scheduler, port, time) = manual_scheduler();
    let base = time.now();
    let mut rng = StdRng::seed_from_u64(5);

    // Few distinct deadlines so plenty of ties
    let mut expected: Vec<(Instant, u8)> = Vec::new();
    for pitch in 0..100u8 {
        let deadline = base + Duration::from_millis(rng.gen_range(1..=10) * 10);
        scheduler.schedule_note_off(Note::new(1, pitch, 100), deadline);
        expected.push((deadline, pitch));
    }
    expected.sort_by_key(|&(deadline, _)| deadline);

    // Walk time forward in steps so the loop fires in several batches
    for _ in 0..10 {
        time.advance(Duration::from_millis(10));
        scheduler.poke();
    }
    assert!(port.wait_for(100, WAIT));

    let fired: Vec<u8> = port.events().iter().map(MidiEvent::pitch).collect();
    let expected: Vec<u8> = expected.iter().map(|&(_, pitch)| pitch).collect();
    assert_eq!(fired, expected);
}

#[test]
fn every_release_fires_exactly_once_under_concurrency() {
    let port = Arc::new(MemoryPort::new());
    let scheduler = Arc::new(EventScheduler::new(port.clone()));
    scheduler.start().unwrap();

    let producers: Vec<_> = (0..4u8)
        .map(|producer| {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(producer as u64);
                for i in 0..250u16 {
                    let channel = producer * 2 + (i / 125) as u8 + 1;
                    let pitch = (i % 125) as u8;
                    let deadline = Instant::now() + Duration::from_millis(rng.gen_range(0..40));
                    scheduler.schedule_note_off(Note::new(channel, pitch, 100), deadline);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    // Some have fired by now, the rest are flushed
    scheduler.stop();

    let events = port.events();
    assert_eq!(events.len(), 1000);
    let unique: HashSet<MidiEvent> = events.into_iter().collect();
    assert_eq!(unique.len(), 1000);
    assert_eq!(scheduler.stats().fired, 1000);
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn note_on_latency_does_not_depend_on_queue_depth() {
    let (scheduler, port, time) = manual_scheduler();
    let far = time.now() + Duration::from_secs(3600);
    for i in 0..10_000u32 {
        scheduler.schedule_note_off(Note::new(1, (i % 128) as u8, 100), far);
    }

    let start = Instant::now();
    scheduler.fire_note_on(Note::new(1, 64, 100)).unwrap();
    let elapsed = start.elapsed();

    // Generous bound; the benchmark measures the real number
    assert!(elapsed < Duration::from_millis(50));
    assert_eq!(port.note_ons().len(), 1);
    assert_eq!(scheduler.pending(), 10_000);
}
