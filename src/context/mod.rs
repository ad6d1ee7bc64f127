//! Musical context - what the drummer is doing right now
//!
//! Incoming percussion hits are reduced to a small discrete context: how busy
//! the playing is (density) and how hard it is (energy). The 3x3 grid of
//! contexts is the key space of the decision table.

pub mod tracker;

use std::fmt;
use std::time::Instant;

pub use tracker::{ContextTracker, RollingWindow, Thresholds, WindowSnapshot, MAX_WINDOW_CAPACITY};

/// Percussion voice that produced a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DrumKind {
    Kick,
    Snare,
    Rim,
}

/// An incoming percussion hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub kind: DrumKind,
    /// MIDI velocity (0-127)
    pub velocity: u8,
    pub timestamp: Instant,
}

impl Trigger {
    pub fn new(kind: DrumKind, velocity: u8, timestamp: Instant) -> Self {
        Self {
            kind,
            velocity: velocity.min(127),
            timestamp,
        }
    }
}

/// How many hits landed in the rolling window
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Density {
    Sparse,
    Medium,
    Busy,
}

/// How hard the hits in the rolling window were
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Energy {
    Chill,
    Groove,
    High,
}

impl Density {
    pub const ALL: [Density; 3] = [Density::Sparse, Density::Medium, Density::Busy];

    fn from_bucket(bucket: usize) -> Self {
        Self::ALL[bucket.min(2)]
    }
}

impl Energy {
    pub const ALL: [Energy; 3] = [Energy::Chill, Energy::Groove, Energy::High];

    fn from_bucket(bucket: usize) -> Self {
        Self::ALL[bucket.min(2)]
    }
}

/// Discretized (density, energy) pair - always one of nine values
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Context {
    pub density: Density,
    pub energy: Energy,
}

impl Context {
    /// Number of distinct contexts
    pub const COUNT: usize = 9;

    /// Quietest context, used for an empty window
    pub const LOWEST: Context = Context {
        density: Density::Sparse,
        energy: Energy::Chill,
    };

    pub const fn new(density: Density, energy: Energy) -> Self {
        Self { density, energy }
    }

    /// Dense index in 0..9 (density-major)
    pub fn index(&self) -> usize {
        self.density as usize * 3 + self.energy as usize
    }

    /// All nine contexts in index order
    pub fn all() -> impl Iterator<Item = Context> {
        Density::ALL
            .into_iter()
            .flat_map(|density| Energy::ALL.into_iter().map(move |energy| Context { density, energy }))
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::LOWEST
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.density, self.energy)
    }
}
