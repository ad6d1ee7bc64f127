//! Built-in groove model
//!
//! A small factorized network conditioned on the context:
//!
//! - P(play | density)
//! - P(chord | energy) over I, IV, V, vi
//! - P(function | density) over Root, ThirdFifth, Color
//! - P(channel | energy) over channels 1 (bass), 2 (mid), 3 (lead)
//!
//! Baking enumerates the joint distribution of every playable
//! (chord, function, channel) combination plus a single rest outcome.

use super::harmony::{Chord, PitchFunction};
use super::model::ProbabilisticModel;
use super::Outcome;
use crate::context::Context;

/// Output channels the groove model routes to
pub const GROOVE_CHANNELS: [u8; 3] = [1, 2, 3];

/// Factor tables, each row indexed by the conditioning bucket
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GrooveModel {
    /// Play probability per density
    pub play: [f64; 3],
    /// Chord weights per energy
    pub chord: [[f64; 4]; 3],
    /// Pitch function weights per density
    pub function: [[f64; 3]; 3],
    /// Channel weights per energy
    pub channel: [[f64; 3]; 3],
}

impl Default for GrooveModel {
    fn default() -> Self {
        Self {
            // Sparse playing leaves room, busy playing gets answered
            play: [0.35, 0.7, 0.85],
            chord: [
                [0.6, 0.25, 0.1, 0.05],
                [0.4, 0.25, 0.25, 0.1],
                [0.25, 0.2, 0.45, 0.1],
            ],
            function: [
                [0.8, 0.15, 0.05],
                [0.3, 0.4, 0.3],
                [0.2, 0.6, 0.2],
            ],
            // Chill sits low, high energy climbs to the lead register
            channel: [
                [0.6, 0.3, 0.1],
                [0.3, 0.5, 0.2],
                [0.2, 0.3, 0.5],
            ],
        }
    }
}

impl ProbabilisticModel for GrooveModel {
    fn distribution(&self, context: Context) -> Option<Vec<(Outcome, f64)>> {
        let density = context.density as usize;
        let energy = context.energy as usize;

        let play = self.play[density].clamp(0.0, 1.0);
        let chords = normalized(&self.chord[energy])?;
        let functions = normalized(&self.function[density])?;
        let channels = normalized(&self.channel[energy])?;

        let mut outcomes = Vec::new();
        if play < 1.0 {
            outcomes.push((Outcome::REST, 1.0 - play));
        }

        for (chord, p_chord) in Chord::ALL.into_iter().zip(chords) {
            for (function, p_function) in PitchFunction::ALL.into_iter().zip(&functions) {
                for (channel, p_channel) in GROOVE_CHANNELS.into_iter().zip(&channels) {
                    let p = play * p_chord * p_function * p_channel;
                    if p > 0.0 {
                        outcomes.push((Outcome::chord_tone(chord, function, channel), p));
                    }
                }
            }
        }

        Some(outcomes)
    }
}

/// Scale a weight row to sum to 1; `None` if it has no mass
fn normalized(weights: &[f64]) -> Option<Vec<f64>> {
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }
    Some(weights.iter().map(|w| w / total).collect())
}
