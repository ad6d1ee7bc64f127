//! Source models that can be baked into a decision table.

use std::collections::BTreeMap;

use super::Outcome;
use crate::context::Context;

/// A probabilistic model queried once per context at bake time
///
/// The returned pairs are (outcome, probability). Evaluation may be as
/// expensive as it likes - it never runs on the real-time path.
pub trait ProbabilisticModel {
    fn distribution(&self, context: Context) -> Option<Vec<(Outcome, f64)>>;
}

/// Explicit per-context outcome distributions
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceModel {
    entries: BTreeMap<Context, Vec<(Outcome, f64)>>,
}

impl SourceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same distribution for every context
    pub fn uniform(distribution: Vec<(Outcome, f64)>) -> Self {
        let mut model = Self::new();
        for context in Context::all() {
            model.set(context, distribution.clone());
        }
        model
    }

    /// Always produce `outcome`, whatever the context
    pub fn constant(outcome: Outcome) -> Self {
        Self::uniform(vec![(outcome, 1.0)])
    }

    /// Set the distribution for one context (builder style)
    pub fn with(mut self, context: Context, distribution: Vec<(Outcome, f64)>) -> Self {
        self.set(context, distribution);
        self
    }

    pub fn set(&mut self, context: Context, distribution: Vec<(Outcome, f64)>) {
        self.entries.insert(context, distribution);
    }

    pub fn remove(&mut self, context: Context) -> Option<Vec<(Outcome, f64)>> {
        self.entries.remove(&context)
    }
}

impl ProbabilisticModel for SourceModel {
    fn distribution(&self, context: Context) -> Option<Vec<(Outcome, f64)>> {
        self.entries.get(&context).cloned()
    }
}
