// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Benchmarks for key and value encoding.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use burrowdb::key::Key;
use burrowdb::value::{mvv, Value, Version};
use burrowdb::time::Timestamp;

fn account_key(a: i64, b: i64, c: i64) -> Key {
    let mut key = Key::new();
    key.append("stress8txn").append(a).append(b).append(c);
    key
}

fn bench_key_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("key");
    group.throughput(Throughput::Elements(1));

    group.bench_function("append_4_segments", |b| {
        let mut i = 0i64;
        b.iter(|| {
            i += 1;
            black_box(account_key(i / 25, (i / 5) % 5, i % 5))
        })
    });

    group.bench_function("decode", |b| {
        let key = account_key(12, 3, 4);
        let encoded = key.encoded().to_vec();
        b.iter(|| black_box(Key::from_encoded(&encoded).unwrap()))
    });

    group.bench_function("cut_and_append", |b| {
        let mut key = account_key(1, 2, 3);
        b.iter(|| {
            key.cut().append(black_box(4i64));
        })
    });

    group.finish();
}

fn bench_value_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("value");

    let int = Value::Int(-12_345);
    group.bench_function("encode_int", |b| b.iter(|| black_box(int.encode())));

    let long = Value::from(".".repeat(20_000));
    group.throughput(Throughput::Bytes(20_000));
    group.bench_function("encode_long_string", |b| b.iter(|| black_box(long.encode())));
    let encoded = long.encode();
    group.bench_function("decode_long_string", |b| {
        b.iter(|| black_box(Value::decode(&encoded).unwrap()))
    });

    group.finish();
}

fn bench_mvv_pack(c: &mut Criterion) {
    let versions: Vec<Version> = (1..=16)
        .map(|ts| Version {
            commit_ts: Timestamp::new(ts),
            value: Value::Int(ts as i64),
        })
        .collect();
    let packed = mvv::pack(versions.clone());

    let mut group = c.benchmark_group("mvv");
    group.throughput(Throughput::Elements(versions.len() as u64));
    group.bench_function("pack_16", |b| b.iter(|| black_box(mvv::pack(versions.clone()))));
    group.bench_function("unpack_16", |b| b.iter(|| black_box(mvv::unpack(&packed).unwrap())));
    group.finish();
}

criterion_group!(benches, bench_key_append, bench_value_codec, bench_mvv_pack);
criterion_main!(benches);
