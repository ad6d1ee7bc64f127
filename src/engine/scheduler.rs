/*
Event Scheduler
===============

Turns a decision into output with two very different paths:

  fire_note_on       caller's thread, straight to the port, no lock
  schedule_note_off  into the deadline queue, fired later by the dispatch loop

  decision ──▶ NoteOn ─────────────────────────────▶ port
           └─▶ NoteOff{deadline} ──▶ [queue] ──loop──▶ port

The dispatch loop sleeps on a condvar until the earliest deadline (or forever
when the queue is empty). Scheduling a note-off only wakes it when the new
entry moves the earliest deadline forward.

Locking: the queue mutex covers heap mutation only. Due events are popped
under the lock and sent after releasing it, one at a time, so a slow port
never blocks producers.

Shutdown: `stop` clears the running flag and wakes the loop, which drains the
queue in deadline order and fires every remaining note-off before exiting.
Once stopped, `schedule_note_off` fires on the caller instead of queueing, so
no note is left hanging.
*/

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

use super::queue::{NoteOffQueue, ScheduledEvent};
use crate::error::{EngineError, TransportError};
use crate::io::midi::{MidiEvent, Note};
use crate::io::port::OutputPort;

/// Where the scheduler reads the current time
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;

    /// How long the dispatch loop may sleep before `deadline` is due.
    /// `None` means sleep until woken.
    fn timeout_until(&self, deadline: Instant) -> Option<Duration> {
        Some(deadline.saturating_duration_since(self.now()))
    }
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTime;

impl TimeSource for SystemTime {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Time that only moves when told to
///
/// The dispatch loop never times out against manual time; call
/// `EventScheduler::poke` after moving it.
#[derive(Debug)]
pub struct ManualTime {
    now: Mutex<Instant>,
}

impl ManualTime {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(origin: Instant) -> Self {
        Self {
            now: Mutex::new(origin),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.lock() += by;
    }

    /// Jump to `instant`; time never moves backwards
    pub fn set(&self, instant: Instant) {
        let mut now = self.lock();
        if instant > *now {
            *now = instant;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Instant> {
        self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ManualTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> Instant {
        *self.lock()
    }

    fn timeout_until(&self, _deadline: Instant) -> Option<Duration> {
        None
    }
}

/// Counters since the scheduler was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Note-offs delivered to the port
    pub fired: u64,
    /// Note-offs that failed once and were resent
    pub retried: u64,
    /// Note-offs that failed twice and were given up on
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    fired: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Default)]
struct Pending {
    queue: NoteOffQueue,
    running: bool,
}

struct Shared {
    pending: Mutex<Pending>,
    wake: Condvar,
    port: Arc<dyn OutputPort>,
    time: Arc<dyn TimeSource>,
    counters: Counters,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send one note-off, retrying once. Never panics.
    fn fire_note_off(&self, event: ScheduledEvent) {
        let message = event.note.note_off();
        let late = self.time.now().saturating_duration_since(event.deadline);

        match self.send_guarded(message) {
            Ok(()) => {
                self.counters.fired.fetch_add(1, Ordering::Relaxed);
                trace!(
                    channel = event.note.channel,
                    pitch = event.note.pitch,
                    late_us = late.as_micros() as u64,
                    "note off"
                );
            }
            Err(first) => {
                self.counters.retried.fetch_add(1, Ordering::Relaxed);
                warn!(
                    channel = event.note.channel,
                    pitch = event.note.pitch,
                    error = %first,
                    "note off failed, retrying"
                );
                match self.send_guarded(message) {
                    Ok(()) => {
                        self.counters.fired.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(second) => {
                        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                        error!(
                            channel = event.note.channel,
                            pitch = event.note.pitch,
                            error = %second,
                            "note off dropped"
                        );
                    }
                }
            }
        }
    }

    fn send_guarded(&self, event: MidiEvent) -> Result<(), TransportError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.port.send(event)))
            .unwrap_or_else(|_| Err(TransportError::SendFailed("output port panicked".into())))
    }
}

/// Immediate note-ons and deadline-ordered note-offs over one output port
pub struct EventScheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventScheduler {
    /// Scheduler on wall-clock time, not yet started
    pub fn new(port: Arc<dyn OutputPort>) -> Self {
        Self::with_time_source(port, Arc::new(SystemTime))
    }

    pub fn with_time_source(port: Arc<dyn OutputPort>, time: Arc<dyn TimeSource>) -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(Pending::default()),
                wake: Condvar::new(),
                port,
                time,
                counters: Counters::default(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the dispatch loop. Does nothing if already running.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut worker = self.lock_worker();
        {
            let mut pending = self.shared.lock();
            if pending.running {
                return Ok(());
            }
            pending.running = true;
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("backbeat-dispatch".into())
            .spawn(move || dispatch_loop(shared));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                debug!("dispatch loop started");
                Ok(())
            }
            Err(e) => {
                self.shared.lock().running = false;
                Err(EngineError::Thread {
                    name: "dispatch",
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Flush every pending note-off, then stop the loop.
    ///
    /// Returns once all note-offs have been sent and the loop has exited.
    pub fn stop(&self) {
        let mut worker = self.lock_worker();
        self.shared.lock().running = false;
        self.shared.wake.notify_all();

        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                error!("dispatch loop panicked");
            }
        }

        // Anything still queued means the loop never got to it
        let leftover = self.shared.lock().queue.drain_ordered();
        if !leftover.is_empty() {
            warn!(count = leftover.len(), "flushing note-offs left by dispatch loop");
            for event in leftover {
                self.shared.fire_note_off(event);
            }
        }
        debug!("dispatch loop stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Send a note-on right now on the calling thread
    pub fn fire_note_on(&self, note: Note) -> Result<(), TransportError> {
        trace!(channel = note.channel, pitch = note.pitch, velocity = note.velocity, "note on");
        self.shared.port.send(note.note_on())
    }

    /// Queue a note-off for `deadline`, or fire it now if stopped
    pub fn schedule_note_off(&self, note: Note, deadline: Instant) {
        let mut pending = self.shared.lock();
        if !pending.running {
            drop(pending);
            debug!(
                channel = note.channel,
                pitch = note.pitch,
                "scheduler stopped, firing note off immediately"
            );
            self.shared.fire_note_off(ScheduledEvent {
                deadline,
                sequence: 0,
                note,
            });
            return;
        }

        let earliest = pending.queue.schedule(note, deadline);
        drop(pending);
        if earliest {
            self.shared.wake.notify_one();
        }
    }

    /// Make the loop look at the clock again (after `ManualTime` moved)
    pub fn poke(&self) {
        drop(self.shared.lock());
        self.shared.wake.notify_all();
    }

    /// Note-offs waiting for their deadline
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        let counters = &self.shared.counters;
        SchedulerStats {
            fired: counters.fired.load(Ordering::Relaxed),
            retried: counters.retried.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Current time as the scheduler sees it
    pub fn now(&self) -> Instant {
        self.shared.time.now()
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for EventScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_loop(shared: Arc<Shared>) {
    let mut pending = shared.lock();

    loop {
        if !pending.running {
            let remaining = pending.queue.drain_ordered();
            drop(pending);
            for event in remaining {
                shared.fire_note_off(event);
            }
            return;
        }

        if let Some(event) = pending.queue.pop_due(shared.time.now()) {
            drop(pending);
            shared.fire_note_off(event);
            pending = shared.lock();
            continue;
        }

        let timeout = pending
            .queue
            .peek_deadline()
            .and_then(|deadline| shared.time.timeout_until(deadline));

        pending = match timeout {
            Some(timeout) => {
                shared
                    .wake
                    .wait_timeout(pending, timeout)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => shared
                .wake
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner),
        };
    }
}
