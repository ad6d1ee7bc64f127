//! Simulated drummer for runs without a kit attached

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use backbeat::context::DrumKind;

/// Basic rock beat on sixteenths: (step, drum, velocity)
const BEAT: &[(u32, DrumKind, u8)] = &[
    (0, DrumKind::Kick, 110),
    (4, DrumKind::Snare, 100),
    (8, DrumKind::Kick, 100),
    (10, DrumKind::Kick, 85),
    (12, DrumKind::Snare, 105),
];

/// Plays the beat, getting busier and louder over each four-bar phrase
pub struct Drummer {
    rng: StdRng,
}

impl Drummer {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Hits for one sixteenth step (0-based within the bar)
    pub fn hits(&mut self, bar: u64, step: u32) -> Vec<(DrumKind, u8)> {
        // 0.0 on the first bar of a phrase, 1.0 on the last
        let intensity = (bar % 4) as f64 / 3.0;
        let push = (intensity * 20.0) as i16 - 10;

        let mut hits: Vec<(DrumKind, u8)> = BEAT
            .iter()
            .filter(|(beat_step, _, _)| *beat_step == step)
            .map(|&(_, kind, velocity)| (kind, self.humanize(velocity, push)))
            .collect();

        // Ghost rim clicks fill the gaps as the phrase builds
        if hits.is_empty() && self.rng.gen_bool(0.6 * intensity) {
            hits.push((DrumKind::Rim, self.humanize(55, push)));
        }
        hits
    }

    fn humanize(&mut self, velocity: u8, push: i16) -> u8 {
        let jitter = self.rng.gen_range(-8..=8);
        (velocity as i16 + push + jitter).clamp(1, 127) as u8
    }
}
