// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Benchmarks for tree operations.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use burrowdb::key::Key;
use burrowdb::time::Timestamp;
use burrowdb::tree::{BPlusTree, Direction, Tree, TreeId, DEFAULT_FANOUT};
use burrowdb::value::Value;

fn key(i: u32) -> Vec<u8> {
    let mut key = Key::new();
    key.append("key").append(i);
    key.encoded().to_vec()
}

fn populated_tree(n: u32) -> Tree {
    let tree = Tree::new(TreeId(1), "bench", DEFAULT_FANOUT, 16);
    for i in 0..n {
        tree.install_committed(&key(i), Timestamp::new(u64::from(i) + 1), Value::Int(i64::from(i)));
    }
    tree
}

fn bench_btree_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree");
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("insert_10000", |b| {
        let keys: Vec<Vec<u8>> = (0..10_000).map(key).collect();
        b.iter_batched(
            BPlusTree::<u32>::new,
            |mut tree| {
                for (i, k) in keys.iter().enumerate() {
                    tree.insert(k, i as u32);
                }
                black_box(tree)
            },
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

fn bench_point_read(c: &mut Criterion) {
    let tree = populated_tree(10_000);
    let snapshot = Timestamp::new(20_000);

    let mut group = c.benchmark_group("tree");
    group.throughput(Throughput::Elements(1));

    group.bench_function("point_read", |b| {
        b.iter_batched(
            || key(rand::random::<u32>() % 10_000),
            |k| black_box(tree.fetch(&k, snapshot)),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let tree = populated_tree(10_000);
    let snapshot = Timestamp::new(20_000);
    let mut prefix = Key::new();
    prefix.append("key");

    let mut group = c.benchmark_group("tree");
    group.throughput(Throughput::Elements(100));

    group.bench_function("seek_100", |b| {
        b.iter(|| {
            let mut from = key(rand::random::<u32>() % 9_900);
            for _ in 0..100 {
                let (found, _) = tree
                    .seek(&from, false, Direction::Forward, snapshot, prefix.encoded())
                    .unwrap();
                from = found;
            }
            black_box(from)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_btree_insert, bench_point_read, bench_scan);
criterion_main!(benches);
