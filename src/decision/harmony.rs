/*
Harmony Helpers
===============

Chord tones are described abstractly in the decision table ("the third of
the V chord") and only turned into MIDI notes when a decision is made.

Everything is in C major around middle C (60):

  chord   root offset        function     interval(s)
  I       0                  Root         0
  IV      5                  ThirdFifth   4 or 7 (coin flip)
  V       7                  Color        2, 11 or 14 (uniform)
  vi      9

Each output channel plays in its own register:

  channel 1 (bass)  -24
  channel 2 (mid)   -12
  channel 3 (lead)  +24
  others              0

Example: V chord, ThirdFifth drawn as 4, channel 2
  60 + 7 + 4 - 12 = 59 (B3)
*/

use rand::seq::SliceRandom;
use rand::RngCore;

use crate::context::Energy;

/// Middle C
pub const BASE_PITCH: i16 = 60;

/// Diatonic chord in C major
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Chord {
    I,
    IV,
    V,
    VI,
}

impl Chord {
    pub const ALL: [Chord; 4] = [Chord::I, Chord::IV, Chord::V, Chord::VI];

    /// Semitones from C to the chord root
    pub fn root_offset(self) -> i16 {
        match self {
            Chord::I => 0,
            Chord::IV => 5,
            Chord::V => 7,
            Chord::VI => 9,
        }
    }
}

/// Role of the played note within the chord
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PitchFunction {
    Root,
    ThirdFifth,
    Color,
}

impl PitchFunction {
    pub const ALL: [PitchFunction; 3] = [
        PitchFunction::Root,
        PitchFunction::ThirdFifth,
        PitchFunction::Color,
    ];

    /// Candidate intervals above the chord root
    pub fn intervals(self) -> &'static [i16] {
        match self {
            PitchFunction::Root => &[0],
            PitchFunction::ThirdFifth => &[4, 7],
            PitchFunction::Color => &[2, 11, 14],
        }
    }

    /// Draw one interval
    pub fn interval(self, rng: &mut dyn RngCore) -> i16 {
        self.intervals().choose(rng).copied().unwrap_or(0)
    }
}

/// Octave shift for an output channel
pub fn register_offset(channel: u8) -> i16 {
    match channel {
        1 => -24,
        2 => -12,
        3 => 24,
        _ => 0,
    }
}

/// Resolve a chord tone to a MIDI note
pub fn resolve_chord_tone(
    chord: Chord,
    function: PitchFunction,
    channel: u8,
    rng: &mut dyn RngCore,
) -> u8 {
    let pitch = BASE_PITCH + chord.root_offset() + function.interval(rng) + register_offset(channel);
    pitch.clamp(0, 127) as u8
}

/// Scale an input velocity by the current energy
/// High energy pushes 20% harder, anything else pulls back 10%
pub fn scale_velocity(velocity: u8, energy: Energy) -> u8 {
    let factor = if energy == Energy::High { 1.2 } else { 0.9 };
    ((velocity as f64 * factor).round() as i32).clamp(1, 127) as u8
}
