/*
Baked Decision Table
====================

Running a probabilistic model on every tick would make decision latency
depend on how complicated the model is. Baking moves that cost to startup:

  bake (once):     for each of the 9 contexts
                     distribution = model.distribution(context)
                     validate, precompute a weighted sampler

  sample (hot):    entry = entries[context.index()]     O(1)
                   i = weighted draw(entry)              one RNG call
                   outcome = entry.outcomes[i]

Validation happens entirely in `build`. A table that exists is well formed,
so `sample` has no error path.

Determinism: the only randomness comes from the caller's RNG, so the same
seed and the same contexts give the same outcomes.
*/

use rand::distributions::{Distribution, WeightedIndex};
use rand::RngCore;
use tracing::{debug, info};

use super::model::ProbabilisticModel;
use super::{DecisionSource, Outcome, Pitch};
use crate::context::Context;
use crate::error::ModelError;

/// Allowed distance between a distribution's total and 1.0
pub const NORMALIZATION_TOLERANCE: f64 = 1e-6;

struct Entry {
    distribution: Vec<(Outcome, f64)>,
    sampler: WeightedIndex<f64>,
}

/// Immutable context -> outcome distribution lookup
///
/// Safe to share between threads for concurrent sampling.
pub struct DecisionTable {
    /// Indexed by `Context::index`
    entries: Vec<Entry>,
}

impl DecisionTable {
    /// Evaluate `model` for every context and freeze the results
    pub fn build<M: ProbabilisticModel + ?Sized>(model: &M) -> Result<Self, ModelError> {
        let mut entries = Vec::with_capacity(Context::COUNT);

        for context in Context::all() {
            let distribution = model
                .distribution(context)
                .ok_or(ModelError::MissingContext(context))?;
            let sum = validate(context, &distribution)?;

            let sampler = WeightedIndex::new(distribution.iter().map(|&(_, p)| p))
                .map_err(|_| ModelError::NotNormalized { context, sum })?;

            debug!(%context, outcomes = distribution.len(), "baked context");
            entries.push(Entry {
                distribution,
                sampler,
            });
        }

        info!(contexts = entries.len(), "decision table baked");
        Ok(Self { entries })
    }

    /// Draw an outcome for `context`
    pub fn sample(&self, context: Context, rng: &mut dyn RngCore) -> Outcome {
        let entry = &self.entries[context.index()];
        entry.distribution[entry.sampler.sample(rng)].0
    }

    /// The baked (outcome, probability) pairs for `context`
    pub fn distribution(&self, context: Context) -> &[(Outcome, f64)] {
        &self.entries[context.index()].distribution
    }

    /// Total probability that `context` plays anything
    pub fn play_probability(&self, context: Context) -> f64 {
        self.distribution(context)
            .iter()
            .filter(|(outcome, _)| outcome.play)
            .map(|&(_, p)| p)
            .sum()
    }
}

impl DecisionSource for DecisionTable {
    fn sample(&self, context: Context, rng: &mut dyn RngCore) -> Outcome {
        DecisionTable::sample(self, context, rng)
    }
}

impl std::fmt::Debug for DecisionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                Context::all().map(|context| (context, self.distribution(context).len())),
            )
            .finish()
    }
}

/// Check one context's distribution, returning its total
fn validate(context: Context, distribution: &[(Outcome, f64)]) -> Result<f64, ModelError> {
    if distribution.is_empty() {
        return Err(ModelError::EmptyDistribution(context));
    }

    let mut sum = 0.0;
    for &(outcome, probability) in distribution {
        if !probability.is_finite() || probability < 0.0 {
            return Err(ModelError::InvalidProbability {
                context,
                value: probability,
            });
        }
        if !(1..=16).contains(&outcome.channel) {
            return Err(ModelError::InvalidChannel {
                context,
                channel: outcome.channel,
            });
        }
        if let Pitch::Note(pitch) = outcome.pitch {
            if pitch > 127 {
                return Err(ModelError::InvalidPitch { context, pitch });
            }
        }
        sum += probability;
    }

    if (sum - 1.0).abs() > NORMALIZATION_TOLERANCE {
        return Err(ModelError::NotNormalized { context, sum });
    }
    Ok(sum)
}
