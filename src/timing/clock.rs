/*
Tempo Clock
===========

The clock is the engine's only timing source. It owns the tempo and turns it
into a stream of ticks, one per beat subdivision.

  interval = 60 / bpm / subdivisions_per_beat

  At 120 BPM with 4 subdivisions: 60 / 120 / 4 = 0.125s (sixteenth notes)

Tick timestamps are absolute `Instant`s laid out back to back:

  t0 ──125ms──▶ t1 ──125ms──▶ t2 ──(tempo change)──▶ t3 ──100ms──▶ t4

When a tick is emitted, the timestamp of the *next* tick is fixed using the
tempo in effect at that moment. A tempo change never moves a tick that is
already scheduled, and nothing downstream stores tick counts: note-off
deadlines are absolute timestamps too, so a tempo change cannot stretch or
shrink a note that is already sounding.

Position counters:
  subdivision  wraps at subdivisions_per_beat
  beat         wraps at the time signature numerator
  bar_index    increments forever

The tempo lives in an atomic float so `set_tempo` can be called from any
thread while the tick thread is sleeping, without taking a lock.
*/

use std::sync::atomic::Ordering;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use portable_atomic::AtomicF64;
use tracing::debug;

use super::signature::TimeSignature;
use crate::error::ValidationError;

/// Slowest accepted tempo
pub const MIN_BPM: f64 = 1.0;
/// Fastest accepted tempo
pub const MAX_BPM: f64 = 999.0;

/// One clock pulse at a subdivision of the beat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// When this tick is due
    pub timestamp: Instant,
    /// Bar counter, starting at 0 and never wrapping
    pub bar_index: u64,
    /// Beat within the bar (0-based, wraps at the signature numerator)
    pub beat_index: u8,
    /// Subdivision within the beat (0-based)
    pub subdivision: u32,
}

impl Tick {
    /// 1-based step within the bar (1-16 for 4/4 sixteenths)
    pub fn step(&self, subdivisions_per_beat: u32) -> u32 {
        self.beat_index as u32 * subdivisions_per_beat + self.subdivision + 1
    }

    /// First subdivision of the first beat of a bar
    pub fn is_downbeat(&self) -> bool {
        self.beat_index == 0 && self.subdivision == 0
    }

    /// First subdivision of any beat
    pub fn is_on_beat(&self) -> bool {
        self.subdivision == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Position {
    bar: u64,
    beat: u8,
    subdivision: u32,
}

impl Position {
    fn advance(&mut self, beats_per_bar: u8, subdivisions_per_beat: u32) {
        self.subdivision += 1;
        if self.subdivision >= subdivisions_per_beat {
            self.subdivision = 0;
            self.beat += 1;
            if self.beat >= beats_per_bar {
                self.beat = 0;
                self.bar += 1;
            }
        }
    }
}

#[derive(Debug, Default)]
struct RunState {
    running: bool,
    /// Bumped on every start so iterators from an older run end
    generation: u64,
}

/// Tempo-driven tick source
pub struct Clock {
    bpm: AtomicF64,
    subdivisions_per_beat: u32,
    time_signature: TimeSignature,
    run: Mutex<RunState>,
    wake: Condvar,
}

impl Clock {
    /// Create a stopped clock
    pub fn new(
        bpm: f64,
        subdivisions_per_beat: u32,
        time_signature: TimeSignature,
    ) -> Result<Self, ValidationError> {
        validate_bpm(bpm)?;
        if subdivisions_per_beat == 0 {
            return Err(ValidationError::SubdivisionsPerBeat(subdivisions_per_beat));
        }
        time_signature.validate()?;

        Ok(Self {
            bpm: AtomicF64::new(bpm),
            subdivisions_per_beat,
            time_signature,
            run: Mutex::new(RunState::default()),
            wake: Condvar::new(),
        })
    }

    /// Change the tempo. Rejected values leave the current tempo in place.
    pub fn set_tempo(&self, bpm: f64) -> Result<(), ValidationError> {
        validate_bpm(bpm)?;
        let previous = self.bpm.swap(bpm, Ordering::AcqRel);
        debug!(previous, bpm, "tempo changed");
        Ok(())
    }

    /// Current tempo in BPM
    pub fn tempo(&self) -> f64 {
        self.bpm.load(Ordering::Acquire)
    }

    pub fn subdivisions_per_beat(&self) -> u32 {
        self.subdivisions_per_beat
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    /// Time between ticks at the current tempo
    pub fn interval(&self) -> Duration {
        interval_for(self.tempo(), self.subdivisions_per_beat)
    }

    /// Begin a new run. Iterators created before this call are finished.
    pub fn start(&self) {
        let mut run = self.lock_run();
        run.running = true;
        run.generation = run.generation.wrapping_add(1);
        drop(run);
        self.wake.notify_all();
    }

    /// End the current run and wake any iterator waiting for its next tick
    pub fn stop(&self) {
        self.lock_run().running = false;
        self.wake.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.lock_run().running
    }

    /// Blocking tick stream for the current run, starting now at bar 0.
    ///
    /// Each call to `next` sleeps until the tick is due and returns `None`
    /// once the clock is stopped or restarted.
    pub fn ticks(&self) -> Ticks<'_> {
        let generation = self.lock_run().generation;
        Ticks {
            clock: self,
            generation,
            schedule: self.schedule_from(Instant::now()),
        }
    }

    /// Non-blocking tick sequence laid out from `origin`.
    ///
    /// Produces the same timestamps and positions as `ticks` would, without
    /// waiting for wall-clock time to pass.
    pub fn schedule_from(&self, origin: Instant) -> TickSchedule<'_> {
        TickSchedule {
            clock: self,
            next_at: origin,
            position: Position::default(),
        }
    }

    fn lock_run(&self) -> MutexGuard<'_, RunState> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Compute the tick interval for a tempo
pub fn interval_for(bpm: f64, subdivisions_per_beat: u32) -> Duration {
    Duration::from_secs_f64(60.0 / bpm / subdivisions_per_beat as f64)
}

fn validate_bpm(bpm: f64) -> Result<(), ValidationError> {
    if !bpm.is_finite() || !(MIN_BPM..=MAX_BPM).contains(&bpm) {
        return Err(ValidationError::Tempo {
            bpm,
            min: MIN_BPM,
            max: MAX_BPM,
        });
    }
    Ok(())
}

/// Lazily computed, infinite tick sequence
pub struct TickSchedule<'a> {
    clock: &'a Clock,
    next_at: Instant,
    position: Position,
}

impl TickSchedule<'_> {
    /// When the next tick is due
    pub fn next_at(&self) -> Instant {
        self.next_at
    }
}

impl Iterator for TickSchedule<'_> {
    type Item = Tick;

    fn next(&mut self) -> Option<Tick> {
        let tick = Tick {
            timestamp: self.next_at,
            bar_index: self.position.bar,
            beat_index: self.position.beat,
            subdivision: self.position.subdivision,
        };

        // The following tick is scheduled now, at the tempo in effect now
        self.next_at += self.clock.interval();
        self.position.advance(
            self.clock.time_signature.beats_per_bar(),
            self.clock.subdivisions_per_beat,
        );

        Some(tick)
    }
}

/// Blocking tick stream bound to one run of the clock
pub struct Ticks<'a> {
    clock: &'a Clock,
    generation: u64,
    schedule: TickSchedule<'a>,
}

impl Iterator for Ticks<'_> {
    type Item = Tick;

    fn next(&mut self) -> Option<Tick> {
        let target = self.schedule.next_at();
        let mut run = self.clock.lock_run();

        loop {
            if !run.running || run.generation != self.generation {
                return None;
            }
            let now = Instant::now();
            if now >= target {
                break;
            }
            run = self
                .clock
                .wake
                .wait_timeout(run, target - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        drop(run);

        self.schedule.next()
    }
}
