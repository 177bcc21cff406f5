//! Benchmarks for KeyedList operations.
//!
//! Lookups are compared against `BTreeMap`, the usual way to get a sorted
//! view. Positional operations have no std equivalent that also keeps keys.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nexus_keyed::KeyedList;
use std::collections::BTreeMap;

const SIZES: [u64; 3] = [100, 1_000, 10_000];

type Ids = KeyedList<u64, fn(&u64) -> u64>;

fn ident(v: &u64) -> u64 {
    *v
}

/// Even keys in a scrambled positional order.
fn populated(n: u64) -> Ids {
    let mut list: Ids = KeyedList::new(ident as fn(&u64) -> u64);
    list.add_range((0..n).map(|i| (i * 7919) % n * 2)).unwrap();
    list
}

// ============================================================================
// Lookup
// ============================================================================

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for n in SIZES {
        group.throughput(Throughput::Elements(n));

        let list = populated(n);
        group.bench_with_input(BenchmarkId::new("keyed/index_of_key", n), &n, |b, &n| {
            b.iter(|| {
                for k in 0..n {
                    black_box(list.index_of_key(&(k * 2)));
                }
            });
        });

        let map: BTreeMap<u64, usize> = list.iter().enumerate().map(|(p, &k)| (k, p)).collect();
        group.bench_with_input(BenchmarkId::new("btreemap/get", n), &n, |b, &n| {
            b.iter(|| {
                for k in 0..n {
                    black_box(map.get(&(k * 2)));
                }
            });
        });
    }

    group.finish();
}

// ============================================================================
// Mutation
// ============================================================================

fn bench_add_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_remove");

    for n in SIZES {
        group.bench_with_input(BenchmarkId::new("add_then_remove_key", n), &n, |b, &n| {
            let mut list = populated(n);
            let mut k = 0;
            b.iter(|| {
                let key = (k % n) * 2 + 1;
                k += 1;
                list.add(black_box(key)).unwrap();
                black_box(list.remove_key(&key))
            });
        });

        group.bench_with_input(BenchmarkId::new("insert_front_remove_at", n), &n, |b, &n| {
            let mut list = populated(n);
            b.iter(|| {
                list.insert(0, black_box(1)).unwrap();
                black_box(list.remove_at(0).unwrap())
            });
        });

        group.bench_with_input(BenchmarkId::new("move_item", n), &n, |b, &n| {
            let mut list = populated(n);
            let last = n as usize - 1;
            b.iter(|| list.move_item(black_box(0), black_box(last)).unwrap());
        });
    }

    group.finish();
}

// ============================================================================
// Bulk
// ============================================================================

fn bench_bulk(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk");

    for n in SIZES {
        group.throughput(Throughput::Elements(n));

        group.bench_with_input(BenchmarkId::new("add_range", n), &n, |b, &n| {
            b.iter(|| black_box(populated(n)));
        });

        group.bench_with_input(BenchmarkId::new("sort_desc", n), &n, |b, &n| {
            let mut list = populated(n);
            let mut descending = true;
            b.iter(|| {
                if descending {
                    list.sort(|a, b| b.cmp(a));
                } else {
                    list.sort(|a, b| a.cmp(b));
                }
                descending = !descending;
            });
        });

        group.bench_with_input(BenchmarkId::new("order_by_key", n), &n, |b, &n| {
            b.iter_batched(
                || populated(n),
                |mut list| {
                    list.order_by_key();
                    list
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_lookup, bench_add_remove, bench_bulk);
criterion_main!(benches);
