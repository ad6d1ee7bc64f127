//! Error types shared across the engine.
//!
//! Configuration problems are rejected at the boundary (`ValidationError`),
//! malformed decision tables fail at bake time (`ModelError`), and output port
//! failures (`TransportError`) are reported but never bring the scheduler down.

use thiserror::Error;

use crate::context::Context;

/// Bad configuration or parameter value. The previous valid state is kept.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("tempo must be a finite BPM between {min} and {max}, got {bpm}")]
    Tempo { bpm: f64, min: f64, max: f64 },

    #[error("subdivisions per beat must be at least 1, got {0}")]
    SubdivisionsPerBeat(u32),

    #[error("time signature {numerator}/{denominator} is not supported")]
    TimeSignature { numerator: u8, denominator: u8 },

    #[error("note duration must be a positive number of milliseconds, got {0}")]
    NoteDuration(f64),

    #[error("{name} thresholds must satisfy 0 <= low <= high, got ({low}, {high})")]
    Thresholds {
        name: &'static str,
        low: f64,
        high: f64,
    },

    #[error("rolling window span must be a positive number of milliseconds, got {0}")]
    WindowSpan(f64),

    #[error("rolling window capacity must be between 1 and {max}, got {capacity}")]
    WindowCapacity { capacity: usize, max: usize },

    #[error("velocity must be between 1 and 127, got {0}")]
    Velocity(u8),
}

/// The source model cannot be baked into a usable decision table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("no distribution defined for context {0}")]
    MissingContext(Context),

    #[error("distribution for context {0} has no outcomes")]
    EmptyDistribution(Context),

    #[error("invalid probability {value} in context {context}")]
    InvalidProbability { context: Context, value: f64 },

    #[error("probabilities for context {context} sum to {sum}, expected 1")]
    NotNormalized { context: Context, sum: f64 },

    #[error("channel {channel} in context {context} is outside 1-16")]
    InvalidChannel { context: Context, channel: u8 },

    #[error("pitch {pitch} in context {context} is outside 0-127")]
    InvalidPitch { context: Context, pitch: u8 },
}

/// The output boundary refused or failed to send an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("output port is disconnected")]
    Disconnected,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("no MIDI port matching {0:?}")]
    PortNotFound(String),

    #[error("failed to connect MIDI port: {0}")]
    ConnectFailed(String),
}

/// Umbrella error for engine-level operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to spawn {name} thread: {reason}")]
    Thread { name: &'static str, reason: String },
}
