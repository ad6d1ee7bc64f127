//! Output boundary
//!
//! The engine only knows how to hand a `MidiEvent` to something that
//! implements `OutputPort`. Hardware transports live behind this trait.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::info;

use super::midi::MidiEvent;
use crate::error::TransportError;

/// Anything that can send MIDI events
///
/// `send` takes `&self` because note-ons go out on the decision thread while
/// note-offs go out on the dispatch thread. Implementations should return
/// promptly.
pub trait OutputPort: Send + Sync {
    fn send(&self, event: MidiEvent) -> Result<(), TransportError>;
}

impl<P: OutputPort + ?Sized> OutputPort for Arc<P> {
    fn send(&self, event: MidiEvent) -> Result<(), TransportError> {
        (**self).send(event)
    }
}

impl<P: OutputPort + ?Sized> OutputPort for Box<P> {
    fn send(&self, event: MidiEvent) -> Result<(), TransportError> {
        (**self).send(event)
    }
}

/// An event and the moment it was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentEvent {
    pub at: Instant,
    pub event: MidiEvent,
}

/// Port that records everything it is given
///
/// Used for dry runs and tests. `wait_for` lets a caller block until the
/// dispatch thread has caught up.
#[derive(Debug, Default)]
pub struct MemoryPort {
    sent: Mutex<Vec<SentEvent>>,
    arrived: Condvar,
}

impl MemoryPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, with timestamps
    pub fn sent(&self) -> Vec<SentEvent> {
        self.lock().clone()
    }

    /// Everything sent so far
    pub fn events(&self) -> Vec<MidiEvent> {
        self.lock().iter().map(|sent| sent.event).collect()
    }

    pub fn note_ons(&self) -> Vec<MidiEvent> {
        self.events().into_iter().filter(MidiEvent::is_note_on).collect()
    }

    pub fn note_offs(&self) -> Vec<MidiEvent> {
        self.events()
            .into_iter()
            .filter(|event| !event.is_note_on())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Block until at least `count` events were sent or `timeout` passes
    /// Returns whether the count was reached
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut sent = self.lock();

        while sent.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sent = self
                .arrived
                .wait_timeout(sent, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SentEvent>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OutputPort for MemoryPort {
    fn send(&self, event: MidiEvent) -> Result<(), TransportError> {
        self.lock().push(SentEvent {
            at: Instant::now(),
            event,
        });
        self.arrived.notify_all();
        Ok(())
    }
}

/// Port that writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPort;

impl OutputPort for LogPort {
    fn send(&self, event: MidiEvent) -> Result<(), TransportError> {
        match event {
            MidiEvent::NoteOn {
                channel,
                pitch,
                velocity,
            } => info!(channel, pitch, velocity, "note on"),
            MidiEvent::NoteOff { channel, pitch } => info!(channel, pitch, "note off"),
        }
        Ok(())
    }
}
