use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kvcheck::check::{check_into, collect, CheckOptions, Finding};
use kvcheck::common::test_utils::{ImageBuilder, LeafEntry};
use kvcheck::storage::page_constants::PageId;
use kvcheck::Tx;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

const KEYS_PER_LEAF: usize = 64;
const LEAVES_PER_BRANCH: usize = 64;

/// Three-level tree (root branch, branches, leaves) over `key_count` random keys
fn generate_tree(key_count: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut keys = BTreeSet::new();
    while keys.len() < key_count {
        keys.insert(rng.gen::<[u8; 12]>());
    }
    let keys: Vec<_> = keys.into_iter().collect();

    let mut builder = ImageBuilder::new();
    builder.freelist(2, &[]);
    let mut next_id: PageId = 3;

    let mut leaves = Vec::new();
    for chunk in keys.chunks(KEYS_PER_LEAF) {
        let entries: Vec<_> = chunk.iter().map(|k| LeafEntry::value(k, [0u8; 16])).collect();
        builder.leaf(next_id, &entries);
        leaves.push((chunk[0], next_id));
        next_id += 1;
    }

    let mut branches = Vec::new();
    for chunk in leaves.chunks(LEAVES_PER_BRANCH) {
        builder.branch(next_id, chunk);
        branches.push((chunk[0].0, next_id));
        next_id += 1;
    }

    let root = next_id;
    builder.branch(root, &branches).set_root(root);
    builder.build()
}

fn benchmark_full_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_check");
    for key_count in [1_000, 20_000] {
        let tx = Tx::from_bytes(generate_tree(key_count, 7)).expect("generated image opens");
        group.bench_with_input(BenchmarkId::new("synchronous", key_count), &tx, |b, tx| {
            b.iter(|| {
                let mut findings: Vec<Finding> = Vec::new();
                check_into(tx, &CheckOptions::default(), &mut findings).expect("check finishes");
                black_box(findings)
            });
        });
        group.bench_with_input(BenchmarkId::new("streamed", key_count), &tx, |b, tx| {
            b.iter(|| black_box(collect(tx, CheckOptions::default()).expect("check finishes")));
        });
    }
    group.finish();
}

fn benchmark_open(c: &mut Criterion) {
    let image = generate_tree(5_000, 11);
    c.bench_function("open_snapshot", |b| {
        b.iter(|| Tx::from_bytes(black_box(image.clone())).expect("generated image opens"));
    });
}

criterion_group!(benches, benchmark_full_check, benchmark_open);
criterion_main!(benches);
