//! Benchmarks for the scheduler's hot paths.
//!
//! Benchmarks cover:
//! - Invocation queue offer/poll under random priorities
//! - Open-addressing id map insert/remove churn
//! - Thread pool submit-to-completion latency

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use prometheus_script_engine::collections::{IntMap, RwIntMap};
use prometheus_script_engine::core::{
    DedicatedThreadPool, ScriptBindings, ScriptInvocationPool, ScriptInvocationQueue, ThreadPoolProvider,
};

// ============================================================================
// Invocation queue
// ============================================================================

fn bench_invocation_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("invocation_queue");
    for size in [100usize, 1_000, 10_000] {
        let mut rng = rand::rng();
        let priorities: Vec<i32> = (0..size).map(|_| rng.random_range(0..10)).collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("offer_poll", size), &priorities, |b, priorities| {
            let pool = ScriptInvocationPool::new();
            let queue = ScriptInvocationQueue::new();
            b.iter(|| {
                for (i, priority) in priorities.iter().enumerate() {
                    let interactive = i % 16 == 0;
                    queue.offer(pool.allocate(1, ScriptBindings::new(), None, *priority, interactive));
                }
                while let Some(invocation) = queue.poll() {
                    pool.release(black_box(invocation));
                }
                queue.clear_interactive_script_status();
                for invocation in queue.cancel_all() {
                    pool.release(invocation);
                }
            });
        });
    }
    group.finish();
}

// ============================================================================
// Id maps
// ============================================================================

fn bench_int_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("int_map");
    group.bench_function("insert_remove_10k", |b| {
        b.iter(|| {
            let mut map = IntMap::new();
            for id in 0..10_000u64 {
                map.insert(id, id);
            }
            for id in (0..10_000u64).step_by(2) {
                black_box(map.remove(id));
            }
            map.len()
        });
    });
    group.bench_function("rw_keys_matching_10k", |b| {
        let map = RwIntMap::new();
        for id in 0..10_000u64 {
            map.insert(id, id);
        }
        b.iter(|| black_box(map.keys_matching(|v| v % 3 == 0)).len());
    });
    group.finish();
}

// ============================================================================
// Thread pool
// ============================================================================

fn bench_thread_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_pool");
    let pool = Arc::new(DedicatedThreadPool::new("bench", 4, 256 * 1024).expect("pool starts"));
    group.bench_function("submit_and_wait_100", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..100)
                .map(|i| {
                    pool.submit(Box::new(move || {
                        black_box(i * 2);
                    }))
                    .expect("pool running")
                })
                .collect();
            for handle in handles {
                handle.wait(Duration::from_secs(5));
            }
        });
    });
    group.finish();
    pool.shutdown(false);
}

criterion_group!(benches, bench_invocation_queue, bench_int_map, bench_thread_pool);
criterion_main!(benches);
