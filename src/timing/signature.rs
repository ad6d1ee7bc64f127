use crate::error::ValidationError;

/// Time signature used to wrap the clock's beat counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeSignature {
    /// Number of beats per bar (numerator)
    pub numerator: u8,
    /// Note value that gets one beat (denominator: 4 = quarter, 8 = eighth)
    pub denominator: u8,
}

impl TimeSignature {
    /// Standard 4/4 time
    pub const FOUR_FOUR: TimeSignature = TimeSignature {
        numerator: 4,
        denominator: 4,
    };

    /// 3/4 time (waltz)
    pub const THREE_FOUR: TimeSignature = TimeSignature {
        numerator: 3,
        denominator: 4,
    };

    /// 2/4 time (march)
    pub const TWO_FOUR: TimeSignature = TimeSignature {
        numerator: 2,
        denominator: 4,
    };

    /// 6/8 time, counted as six eighth-note beats
    pub const SIX_EIGHT: TimeSignature = TimeSignature {
        numerator: 6,
        denominator: 8,
    };

    /// Create a time signature
    /// The denominator must be a power of two between 1 and 32
    pub fn new(numerator: u8, denominator: u8) -> Result<Self, ValidationError> {
        let signature = Self {
            numerator,
            denominator,
        };
        signature.validate()?;
        Ok(signature)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let denominator_ok = self.denominator.is_power_of_two() && self.denominator <= 32;
        if self.numerator == 0 || !denominator_ok {
            return Err(ValidationError::TimeSignature {
                numerator: self.numerator,
                denominator: self.denominator,
            });
        }
        Ok(())
    }

    /// Beats per bar, which is where the clock's beat counter wraps
    pub fn beats_per_bar(&self) -> u8 {
        self.numerator
    }

    /// Number of clock steps in one bar
    /// For 4/4 at 4 subdivisions: 16 steps (sixteenth notes)
    pub fn steps_per_bar(&self, subdivisions_per_beat: u32) -> u32 {
        self.numerator as u32 * subdivisions_per_beat
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::FOUR_FOUR
    }
}
