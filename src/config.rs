//! Engine configuration
//!
//! Built fluently from defaults and checked once with `validate` before the
//! engine is assembled:
//!
//! ```
//! use backbeat::config::EngineConfig;
//!
//! let config = EngineConfig::default()
//!     .bpm(96.0)
//!     .note_duration_ms(250.0)
//!     .seed(7);
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use crate::context::{Thresholds, MAX_WINDOW_CAPACITY};
use crate::error::ValidationError;
use crate::io::DrumMap;
use crate::timing::{clock, TimeSignature};

/// When the engine makes a decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DecisionPolicy {
    /// Decide on every clock tick; triggers only update context
    #[default]
    EveryTick,
    /// Decide on every tick, and also immediately on each kick
    KickImmediate,
    /// Decide on every trigger; ticks only advance time
    TriggerOnly,
}

impl DecisionPolicy {
    pub fn decides_on_tick(self) -> bool {
        !matches!(self, DecisionPolicy::TriggerOnly)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    pub bpm: f64,
    pub subdivisions_per_beat: u32,
    pub time_signature: TimeSignature,
    /// How long each played note sounds before its note-off
    pub note_duration_ms: f64,
    pub thresholds: Thresholds,
    pub rolling_window_span_ms: f64,
    /// Most triggers kept in the window regardless of age
    pub window_capacity: usize,
    pub decision_policy: DecisionPolicy,
    /// Base velocity used while no triggers are in the window
    pub default_velocity: u8,
    /// Skip tick decisions when no trigger arrived since the last one
    pub rest_when_silent: bool,
    /// Fixed RNG seed; `None` seeds from entropy
    pub seed: Option<u64>,
    pub drum_map: DrumMap,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            subdivisions_per_beat: 4,
            time_signature: TimeSignature::default(),
            note_duration_ms: 500.0,
            thresholds: Thresholds::default(),
            rolling_window_span_ms: 2000.0,
            window_capacity: 64,
            decision_policy: DecisionPolicy::default(),
            default_velocity: 80,
            rest_when_silent: false,
            seed: None,
            drum_map: DrumMap::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bpm(mut self, bpm: f64) -> Self {
        self.bpm = bpm;
        self
    }

    pub fn subdivisions_per_beat(mut self, subdivisions: u32) -> Self {
        self.subdivisions_per_beat = subdivisions;
        self
    }

    pub fn time_signature(mut self, signature: TimeSignature) -> Self {
        self.time_signature = signature;
        self
    }

    pub fn note_duration_ms(mut self, ms: f64) -> Self {
        self.note_duration_ms = ms;
        self
    }

    /// Trigger counts splitting Sparse / Medium / Busy
    pub fn density_thresholds(mut self, low: usize, high: usize) -> Self {
        self.thresholds.density = (low, high);
        self
    }

    /// Mean velocities splitting Chill / Groove / High
    pub fn energy_thresholds(mut self, low: f64, high: f64) -> Self {
        self.thresholds.energy = (low, high);
        self
    }

    pub fn rolling_window_span_ms(mut self, ms: f64) -> Self {
        self.rolling_window_span_ms = ms;
        self
    }

    pub fn window_capacity(mut self, capacity: usize) -> Self {
        self.window_capacity = capacity;
        self
    }

    pub fn decision_policy(mut self, policy: DecisionPolicy) -> Self {
        self.decision_policy = policy;
        self
    }

    pub fn default_velocity(mut self, velocity: u8) -> Self {
        self.default_velocity = velocity;
        self
    }

    pub fn rest_when_silent(mut self, rest: bool) -> Self {
        self.rest_when_silent = rest;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn drum_map(mut self, map: DrumMap) -> Self {
        self.drum_map = map;
        self
    }

    pub fn note_duration(&self) -> Duration {
        Duration::from_secs_f64(self.note_duration_ms / 1000.0)
    }

    pub fn rolling_window_span(&self) -> Duration {
        Duration::from_secs_f64(self.rolling_window_span_ms / 1000.0)
    }

    /// Check every field; the first problem found is returned
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.bpm.is_finite() || !(clock::MIN_BPM..=clock::MAX_BPM).contains(&self.bpm) {
            return Err(ValidationError::Tempo {
                bpm: self.bpm,
                min: clock::MIN_BPM,
                max: clock::MAX_BPM,
            });
        }
        if self.subdivisions_per_beat == 0 {
            return Err(ValidationError::SubdivisionsPerBeat(
                self.subdivisions_per_beat,
            ));
        }
        self.time_signature.validate()?;
        if !positive_ms(self.note_duration_ms) {
            return Err(ValidationError::NoteDuration(self.note_duration_ms));
        }
        self.thresholds.validate()?;
        if !positive_ms(self.rolling_window_span_ms) {
            return Err(ValidationError::WindowSpan(self.rolling_window_span_ms));
        }
        if !(1..=MAX_WINDOW_CAPACITY).contains(&self.window_capacity) {
            return Err(ValidationError::WindowCapacity {
                capacity: self.window_capacity,
                max: MAX_WINDOW_CAPACITY,
            });
        }
        if !(1..=127).contains(&self.default_velocity) {
            return Err(ValidationError::Velocity(self.default_velocity));
        }
        Ok(())
    }
}

// Duration::from_secs_f64 panics on negative or non-finite input
fn positive_ms(ms: f64) -> bool {
    ms.is_finite() && ms > 0.0 && ms < 1.0e12
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bpm, 120.0);
        assert_eq!(config.subdivisions_per_beat, 4);
        assert_eq!(config.decision_policy, DecisionPolicy::EveryTick);
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = EngineConfig::new()
            .bpm(90.0)
            .note_duration_ms(250.0)
            .density_thresholds(2, 6)
            .energy_thresholds(50.0, 100.0)
            .rolling_window_span_ms(1500.0)
            .seed(42);

        assert_eq!(config.bpm, 90.0);
        assert_eq!(config.note_duration(), Duration::from_millis(250));
        assert_eq!(config.thresholds.density, (2, 6));
        assert_eq!(config.thresholds.energy, (50.0, 100.0));
        assert_eq!(config.rolling_window_span(), Duration::from_millis(1500));
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::new().bpm(0.0).validate(),
            Err(ValidationError::Tempo { .. })
        ));
        assert!(matches!(
            EngineConfig::new().bpm(f64::NAN).validate(),
            Err(ValidationError::Tempo { .. })
        ));
        assert_eq!(
            EngineConfig::new().subdivisions_per_beat(0).validate(),
            Err(ValidationError::SubdivisionsPerBeat(0))
        );
        assert_eq!(
            EngineConfig::new().note_duration_ms(-5.0).validate(),
            Err(ValidationError::NoteDuration(-5.0))
        );
        assert!(matches!(
            EngineConfig::new().density_thresholds(8, 3).validate(),
            Err(ValidationError::Thresholds { .. })
        ));
        assert_eq!(
            EngineConfig::new().rolling_window_span_ms(0.0).validate(),
            Err(ValidationError::WindowSpan(0.0))
        );
        assert_eq!(
            EngineConfig::new().window_capacity(0).validate(),
            Err(ValidationError::WindowCapacity {
                capacity: 0,
                max: MAX_WINDOW_CAPACITY
            })
        );
        assert!(matches!(
            EngineConfig::new()
                .window_capacity(MAX_WINDOW_CAPACITY + 1)
                .validate(),
            Err(ValidationError::WindowCapacity { .. })
        ));
        assert!(EngineConfig::new()
            .window_capacity(MAX_WINDOW_CAPACITY)
            .validate()
            .is_ok());
        assert_eq!(
            EngineConfig::new().default_velocity(0).validate(),
            Err(ValidationError::Velocity(0))
        );
    }

    #[test]
    fn test_policy_tick_decisions() {
        assert!(DecisionPolicy::EveryTick.decides_on_tick());
        assert!(DecisionPolicy::KickImmediate.decides_on_tick());
        assert!(!DecisionPolicy::TriggerOnly.decides_on_tick());
    }
}
