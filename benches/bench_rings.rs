//! Criterion benchmark comparing single-producer/consumer throughput
//! across all four ring topologies.
//!
//! Run: cargo bench --bench bench_rings

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::thread;

use seakutils::ring::{mpmc, mpsc, spmc, spsc};

const RING_SIZE: usize = 1024;
const EVENTS: u64 = 200_000;

fn bench_spsc(events: u64) {
    let (tx, rx) = spsc::create::<u64>(RING_SIZE).unwrap();
    let producer = thread::spawn(move || {
        for i in 0..events {
            loop {
                if tx.try_send(i).is_ok() {
                    break;
                }
                std::hint::spin_loop();
            }
        }
        tx.close();
    });

    let mut out = None;
    let mut received = 0u64;
    while received < events {
        if rx.recv(&mut out).is_ok() {
            black_box(out.take());
            received += 1;
        } else {
            std::hint::spin_loop();
        }
    }
    producer.join().unwrap();
}

fn bench_mpsc_single_producer(events: u64) {
    let (tx, rx) = mpsc::create::<u64>(RING_SIZE).unwrap();
    let producer = thread::spawn(move || {
        for i in 0..events {
            tx.send(i).unwrap();
        }
    });

    let mut received = 0u64;
    while received < events {
        match rx.recv() {
            Ok(v) => {
                black_box(v);
                received += 1;
            }
            Err(_) => std::hint::spin_loop(),
        }
    }
    producer.join().unwrap();
}

fn bench_spmc_single_consumer(events: u64) {
    let (tx, rx) = spmc::create::<u64>(RING_SIZE).unwrap();
    let producer = thread::spawn(move || {
        for i in 0..events {
            loop {
                if tx.try_send(i).is_ok() {
                    break;
                }
                std::hint::spin_loop();
            }
        }
        tx.close();
    });

    let mut received = 0u64;
    loop {
        match rx.recv() {
            Ok(v) => {
                black_box(v);
                received += 1;
                if received == events {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    producer.join().unwrap();
}

fn bench_mpmc_one_to_one(events: u64) {
    let (tx, rx) = mpmc::create::<u64>(RING_SIZE).unwrap();
    let producer = thread::spawn(move || {
        for i in 0..events {
            tx.send(i).unwrap();
        }
        tx.close();
    });

    let mut received = 0u64;
    loop {
        match rx.recv() {
            Ok(v) => {
                black_box(v);
                received += 1;
                if received == events {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    producer.join().unwrap();
}

fn ring_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_throughput");
    group.throughput(Throughput::Elements(EVENTS));

    group.bench_with_input(BenchmarkId::new("spsc", EVENTS), &EVENTS, |b, &events| {
        b.iter(|| bench_spsc(events));
    });
    group.bench_with_input(BenchmarkId::new("mpsc_1p", EVENTS), &EVENTS, |b, &events| {
        b.iter(|| bench_mpsc_single_producer(events));
    });
    group.bench_with_input(BenchmarkId::new("spmc_1c", EVENTS), &EVENTS, |b, &events| {
        b.iter(|| bench_spmc_single_consumer(events));
    });
    group.bench_with_input(BenchmarkId::new("mpmc_1to1", EVENTS), &EVENTS, |b, &events| {
        b.iter(|| bench_mpmc_one_to_one(events));
    });

    group.finish();
}

criterion_group!(benches, ring_throughput);
criterion_main!(benches);
