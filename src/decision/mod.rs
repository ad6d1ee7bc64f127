// Purpose: turning a context into a musical decision
// The baked table is consulted on the real-time path; models are only
// evaluated while baking.

pub mod groove;
pub mod harmony;
pub mod model;
pub mod table;

use rand::RngCore;

use crate::context::Context;

pub use groove::GrooveModel;
pub use harmony::{Chord, PitchFunction};
pub use model::{ProbabilisticModel, SourceModel};
pub use table::DecisionTable;

/// What to play: an absolute MIDI note or a tone of the current chord
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Pitch {
    Note(u8),
    ChordTone { chord: Chord, function: PitchFunction },
}

impl Pitch {
    /// Resolve to a MIDI note number for the given output channel
    pub fn resolve(&self, channel: u8, rng: &mut dyn RngCore) -> u8 {
        match *self {
            Pitch::Note(note) => note.min(127),
            Pitch::ChordTone { chord, function } => {
                harmony::resolve_chord_tone(chord, function, channel, rng)
            }
        }
    }
}

/// One possible response to a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Outcome {
    /// Whether anything is played this cycle
    pub play: bool,
    pub pitch: Pitch,
    /// MIDI channel, 1-16
    pub channel: u8,
}

impl Outcome {
    /// Stay silent
    pub const REST: Outcome = Outcome {
        play: false,
        pitch: Pitch::Note(0),
        channel: 1,
    };

    /// Play a fixed MIDI note
    pub const fn note(pitch: u8, channel: u8) -> Self {
        Self {
            play: true,
            pitch: Pitch::Note(pitch),
            channel,
        }
    }

    /// Play a tone of a chord, resolved at decision time
    pub const fn chord_tone(chord: Chord, function: PitchFunction, channel: u8) -> Self {
        Self {
            play: true,
            pitch: Pitch::ChordTone { chord, function },
            channel,
        }
    }
}

/// Anything that can pick an outcome for a context
///
/// The baked `DecisionTable` is the production implementation. Other
/// strategies can be swapped in at startup behind the same interface.
pub trait DecisionSource: Send + Sync {
    fn sample(&self, context: Context, rng: &mut dyn RngCore) -> Outcome;
}
