use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use snowgrid::{
    FixedClient, Generator, IdEncoder, IdLayout, SnowflakeEncoder, TimeSource, WallClock, Worker,
};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};

#[derive(Clone, Copy)]
struct FixedMockTime {
    millis: u64,
}

impl TimeSource for FixedMockTime {
    fn current_millis(&self) -> u64 {
        self.millis
    }
}

const START: u64 = 1_000;

// Number of IDs generated per benchmark iteration (per-thread for
// multi-threaded). Exactly one millisecond's worth of sequence numbers, so a
// frozen clock never rolls over.
const TOTAL_IDS: usize = 4096;

fn layout() -> IdLayout {
    IdLayout::new(5).unwrap()
}

/// Hot path: a fresh encoder on a frozen clock, so every call takes the
/// same-millisecond branch.
fn bench_encoder_hot_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("encoder/fixed_clock");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                let encoder = SnowflakeEncoder::new(
                    START,
                    layout(),
                    Worker::ZERO,
                    FixedMockTime { millis: START + 1 },
                )
                .unwrap();
                for _ in 0..TOTAL_IDS {
                    black_box(encoder.next().unwrap());
                }
            }
            start.elapsed()
        });
    });
    group.finish();
}

/// Real clock, including sequence rollover spins.
fn bench_encoder_wall_clock(c: &mut Criterion) {
    let mut group = c.benchmark_group("encoder/wall_clock");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    let encoder = SnowflakeEncoder::new(START, layout(), Worker::ZERO, WallClock::shared()).unwrap();
    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter(|| {
            for _ in 0..TOTAL_IDS {
                black_box(encoder.next().unwrap());
            }
        });
    });

    group.bench_function("suffixed_string", |b| {
        b.iter(|| black_box(encoder.next_as_string_with_suffix(black_box(12_345)).unwrap()));
    });
    group.finish();
}

/// Adds the encoder lookup and the serving check of a generator.
fn bench_generator(c: &mut Criterion) {
    let mut group = c.benchmark_group("generator/wall_clock");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    let generator: Arc<Generator> =
        Generator::new(START, layout(), WallClock::shared(), Arc::new(FixedClient)).unwrap();
    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter(|| {
            for _ in 0..TOTAL_IDS {
                black_box(generator.next().unwrap());
            }
        });
    });
    group.finish();
}

/// Contended generator shared by several threads.
fn bench_generator_threaded(c: &mut Criterion) {
    const THREADS: usize = 4;

    let mut group = c.benchmark_group("generator/threads");
    group.throughput(Throughput::Elements((TOTAL_IDS * THREADS) as u64));

    let generator: Arc<Generator> =
        Generator::new(START, layout(), WallClock::shared(), Arc::new(FixedClient)).unwrap();
    group.bench_function(format!("threads/{THREADS}"), |b| {
        b.iter_custom(|iters| {
            let barrier = Barrier::new(THREADS + 1);
            scope(|s| {
                for _ in 0..THREADS {
                    s.spawn(|| {
                        barrier.wait();
                        for _ in 0..iters {
                            for _ in 0..TOTAL_IDS {
                                black_box(generator.next().unwrap());
                            }
                        }
                    });
                }
                barrier.wait();
                let start = Instant::now();
                // Scope joins all producers before returning.
                start
            })
            .elapsed()
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_encoder_hot_path,
    bench_encoder_wall_clock,
    bench_generator,
    bench_generator_threaded
);
criterion_main!(benches);
