//! Benchmarks for the post-generation action path
//!
//! Covers token-to-bin decoding and de-normalization, which run on every
//! prediction after the forward pass.
//!
//! Run with: cargo bench -p vla-infer-models

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vla_infer_models::openvla::action::{ActionStatistics, ActionTokenizer};

fn bridge_statistics() -> ActionStatistics {
    ActionStatistics {
        q01: vec![-0.029, -0.041, -0.026, -0.081, -0.092, -0.204, 0.0],
        q99: vec![0.028, 0.040, 0.040, 0.081, 0.078, 0.203, 1.0],
        mask: Some(vec![true, true, true, true, true, true, false]),
    }
}

fn benchmark_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("action_decoding");

    for n_bins in [64usize, 256, 1024] {
        let tokenizer = ActionTokenizer::new(n_bins, 32000);
        let tokens: Vec<u32> = (0..7).map(|i| 31999 - (i * 17) as u32).collect();

        group.bench_with_input(BenchmarkId::new("decode", n_bins), &tokens, |b, tokens| {
            b.iter(|| tokenizer.decode(black_box(tokens)))
        });
    }

    group.finish();
}

fn benchmark_unnormalize(c: &mut Criterion) {
    let stats = bridge_statistics();
    let tokenizer = ActionTokenizer::new(256, 32000);
    let normalized = tokenizer.decode(&[31900, 31850, 31800, 31870, 31760, 31990, 31745]);

    c.bench_function("unnormalize_7dof", |b| {
        b.iter(|| stats.unnormalize(black_box(&normalized)))
    });
}

criterion_group!(benches, benchmark_decode, benchmark_unnormalize);
criterion_main!(benches);
