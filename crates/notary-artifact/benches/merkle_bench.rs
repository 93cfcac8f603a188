use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use notary_artifact::{build_root, ContentDigest, MerkleTree};

fn leaves(n: usize) -> Vec<ContentDigest> {
    (0..n)
        .map(|i| ContentDigest::compute(&(i as u64).to_le_bytes()))
        .collect()
}

fn bench_build_root(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_root");
    for n in [16usize, 1_024, 65_536] {
        let input = leaves(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &input, |b, input| {
            b.iter(|| build_root(black_box(input)));
        });
    }
    group.finish();
}

fn bench_tree_with_proofs(c: &mut Criterion) {
    let input = leaves(4_096);
    c.bench_function("merkle_tree_4096_proof", |b| {
        b.iter(|| {
            let tree = MerkleTree::from_leaves(black_box(&input));
            tree.proof(black_box(1_234))
        });
    });
}

criterion_group!(benches, bench_build_root, bench_tree_with_proofs);
criterion_main!(benches);
