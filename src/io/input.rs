use std::time::Instant;

use super::midi::MidiEvent;
use crate::context::{DrumKind, Trigger};
use crate::timing::Tick;

/// Everything that can arrive at the engine's input boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Trigger(Trigger),
    Tick(Tick),
}

impl From<Trigger> for InputEvent {
    fn from(trigger: Trigger) -> Self {
        InputEvent::Trigger(trigger)
    }
}

impl From<Tick> for InputEvent {
    fn from(tick: Tick) -> Self {
        InputEvent::Tick(tick)
    }
}

/// Which incoming MIDI notes are which drum
/// Defaults follow General MIDI percussion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DrumMap {
    pub kick: u8,
    pub snare: u8,
    pub rim: u8,
}

impl Default for DrumMap {
    fn default() -> Self {
        Self {
            kick: 36,
            snare: 38,
            rim: 37,
        }
    }
}

impl DrumMap {
    pub fn identify(&self, note: u8) -> Option<DrumKind> {
        match note {
            n if n == self.kick => Some(DrumKind::Kick),
            n if n == self.snare => Some(DrumKind::Snare),
            n if n == self.rim => Some(DrumKind::Rim),
            _ => None,
        }
    }

    /// Turn a note-on from a drum pad into a trigger
    pub fn trigger_from(&self, event: &MidiEvent, timestamp: Instant) -> Option<Trigger> {
        match *event {
            MidiEvent::NoteOn {
                pitch, velocity, ..
            } => self
                .identify(pitch)
                .map(|kind| Trigger::new(kind, velocity, timestamp)),
            MidiEvent::NoteOff { .. } => None,
        }
    }

    /// Same as `trigger_from`, starting from raw bytes
    pub fn trigger_from_bytes(&self, data: &[u8], timestamp: Instant) -> Option<Trigger> {
        MidiEvent::from_bytes(data).and_then(|event| self.trigger_from(&event, timestamp))
    }
}
