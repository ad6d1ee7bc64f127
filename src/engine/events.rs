//! Observer queues for whatever is watching the engine (a UI, a logger).
//!
//! Each subscriber gets its own SPSC ring buffer. Publishing never blocks on
//! a slow reader: a full queue loses the event.

use std::sync::{Mutex, PoisonError};

use rtrb::{Consumer, Producer, RingBuffer};

use super::EngineState;
use crate::context::Context;
use crate::error::TransportError;
use crate::io::midi::Note;
use crate::timing::Tick;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StateChanged(EngineState),
    Tick(Tick),
    /// A decision was made and it was to stay silent
    Rest { context: Context },
    NotePlayed { context: Context, note: Note },
    TransportFailed(TransportError),
}

/// Fan-out of engine events to any number of ring buffers
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Producer<EngineEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// New queue holding up to `capacity` unread events
    pub fn subscribe(&self, capacity: usize) -> Consumer<EngineEvent> {
        let (tx, rx) = RingBuffer::<EngineEvent>::new(capacity.max(1));
        self.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: EngineEvent) {
        let mut subscribers = self.lock();
        if subscribers.is_empty() {
            return;
        }

        subscribers.retain(|tx| !tx.is_abandoned());
        for tx in subscribers.iter_mut() {
            let _ = tx.push(event.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Producer<EngineEvent>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
