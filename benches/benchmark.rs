use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use ranked_avl::AvlTree;

const N: usize = 100_000;

pub fn benchmarks(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let values: Vec<i32> = (1..=N).map(|_| rng.gen()).collect();

    c.bench_function("tree_insert", |b| {
        let mut tree = AvlTree::new();
        b.iter(|| {
            for value in &values {
                let _ = black_box(tree.insert(*value, *value));
            }
        })
    });

    let mut tree = AvlTree::new();
    for value in &values {
        let _ = tree.insert(*value, *value);
    }

    c.bench_function("tree_get", |b| {
        b.iter(|| {
            for value in &values {
                black_box(tree.get(value));
            }
        })
    });

    c.bench_function("tree_iter", |b| {
        b.iter(|| {
            for (k, v) in &tree {
                black_box((k, v));
            }
        })
    });

    c.bench_function("tree_delete", |b| {
        let mut tree = tree.clone();
        b.iter(|| {
            for value in &values {
                let _ = black_box(tree.delete(value));
            }
        })
    });

    let mut pivots: Vec<i32> = tree.keys().copied().collect();
    pivots.shuffle(&mut rng);
    pivots.truncate(100);

    c.bench_function("tree_split", |b| {
        let mut pivot = pivots.iter().cycle();
        b.iter_batched(
            || tree.clone(),
            |tree| {
                let pivot = pivot.next().copied().unwrap_or_default();
                black_box(tree.split(&pivot))
            },
            BatchSize::LargeInput,
        )
    });

    c.bench_function("tree_split_join", |b| {
        let mut pivot = pivots.iter().cycle();
        b.iter_batched(
            || {
                let pivot = pivot.next().copied().unwrap_or_default();
                let (below, above) = tree.clone().split(&pivot);
                (below, pivot, above)
            },
            |(mut below, pivot, above)| black_box(below.join(pivot, pivot, above)),
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, benchmarks);
criterion_main!(benches);
