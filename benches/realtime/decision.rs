//! Benchmarks for baked table sampling.

use std::hint::black_box;

use backbeat::context::Context;
use backbeat::decision::{DecisionTable, GrooveModel, Outcome, SourceModel};
use criterion::Criterion;
use rand::rngs::StdRng;
use rand::SeedableRng;

pub fn bench_decision(c: &mut Criterion) {
    let mut group = c.benchmark_group("decision");
    let mut rng = StdRng::seed_from_u64(1);

    // Single outcome per context
    let constant = DecisionTable::build(&SourceModel::constant(Outcome::note(60, 1))).unwrap();
    group.bench_function("sample_constant", |b| {
        b.iter(|| constant.sample(black_box(Context::LOWEST), &mut rng))
    });

    // Full joint distribution, dozens of outcomes per context
    let groove = DecisionTable::build(&GrooveModel::default()).unwrap();
    let contexts: Vec<Context> = Context::all().collect();
    let mut i = 0;
    group.bench_function("sample_groove", |b| {
        b.iter(|| {
            i = (i + 1) % contexts.len();
            groove.sample(black_box(contexts[i]), &mut rng)
        })
    });

    group.bench_function("sample_and_resolve_groove", |b| {
        b.iter(|| {
            i = (i + 1) % contexts.len();
            let outcome = groove.sample(black_box(contexts[i]), &mut rng);
            outcome.pitch.resolve(outcome.channel, &mut rng)
        })
    });

    group.finish();
}
