//! Integration tests for the two-lane invocation queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use prometheus_script_engine::core::{ScriptBindings, ScriptInvocationPool, ScriptInvocationQueue};

fn offer(
    pool: &ScriptInvocationPool,
    queue: &ScriptInvocationQueue,
    script_id: u32,
    priority: i32,
    interactive: bool,
) -> u64 {
    let invocation = pool.allocate(script_id, ScriptBindings::new(), None, priority, interactive);
    let task_id = invocation.task_id();
    queue.offer(invocation);
    task_id
}

#[test]
fn test_priority_then_fifo() {
    let pool = ScriptInvocationPool::new();
    let queue = ScriptInvocationQueue::new();
    let a = offer(&pool, &queue, 1, 0, false);
    let b = offer(&pool, &queue, 2, 3, false);
    let c = offer(&pool, &queue, 3, 0, false);
    let d = offer(&pool, &queue, 4, 3, false);

    let order: Vec<u64> = std::iter::from_fn(|| queue.poll())
        .map(|invocation| invocation.task_id())
        .collect();
    assert_eq!(order, vec![b, d, a, c]);
    assert!(queue.is_empty());
}

#[test]
fn test_interactive_lane_admits_one_at_a_time() {
    let pool = ScriptInvocationPool::new();
    let queue = ScriptInvocationQueue::new();
    let first = offer(&pool, &queue, 1, 0, true);
    let second = offer(&pool, &queue, 2, 10, true);
    let plain = offer(&pool, &queue, 3, 0, false);

    let polled = queue.poll().unwrap();
    assert_eq!(polled.task_id(), first);
    assert!(queue.is_interactive_script_running());

    // Lane blocked: only non-interactive work comes out.
    assert_eq!(queue.poll().unwrap().task_id(), plain);
    assert!(queue.poll().is_none());
    assert_eq!(queue.interactive_len(), 1);

    queue.clear_interactive_script_status();
    assert_eq!(queue.poll().unwrap().task_id(), second);
    assert!(queue.is_interactive_script_running());
}

#[test]
fn test_cancel_removes_from_both_lanes() {
    let pool = ScriptInvocationPool::new();
    let queue = ScriptInvocationQueue::new();
    offer(&pool, &queue, 1, 0, true);
    offer(&pool, &queue, 1, 0, false);
    let other = offer(&pool, &queue, 2, 0, false);

    let removed = queue.cancel_by_script_id(1);
    assert_eq!(removed.len(), 2);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.cancel_by_task_id(other).len(), 1);
    assert!(queue.cancel_all().is_empty());

    for invocation in removed {
        pool.release(invocation);
    }
    assert_eq!(pool.pooled(), 2);
}

#[test]
fn test_concurrent_offer_and_poll() {
    let pool = Arc::new(ScriptInvocationPool::new());
    let queue = Arc::new(ScriptInvocationQueue::new());

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let pool = Arc::clone(&pool);
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..250 {
                    offer(&pool, &queue, p, i % 5, false);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let mut drained = 0;
    let mut last_priority = i32::MAX;
    while let Some(invocation) = queue.poll() {
        assert!(invocation.priority() <= last_priority);
        last_priority = invocation.priority();
        drained += 1;
    }
    assert_eq!(drained, 1000);
}

#[test]
fn test_one_interactive_in_flight_under_concurrent_polling() {
    const TOTAL: usize = 400;

    let pool = ScriptInvocationPool::new();
    let queue = Arc::new(ScriptInvocationQueue::new());
    for i in 0..TOTAL {
        let script_id = u32::try_from(i).unwrap();
        offer(&pool, &queue, script_id, i32::try_from(i % 7).unwrap(), i % 2 == 0);
    }

    let drained = Arc::new(AtomicUsize::new(0));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let interactive_seen = Arc::new(AtomicUsize::new(0));

    let pollers: Vec<_> = (0..8)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let drained = Arc::clone(&drained);
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            let interactive_seen = Arc::clone(&interactive_seen);
            thread::spawn(move || {
                while drained.load(Ordering::Acquire) < TOTAL {
                    let Some(invocation) = queue.poll() else {
                        thread::yield_now();
                        continue;
                    };
                    if invocation.is_interactive() {
                        let now = in_flight.fetch_add(1, Ordering::AcqRel) + 1;
                        max_in_flight.fetch_max(now, Ordering::AcqRel);
                        interactive_seen.fetch_add(1, Ordering::Relaxed);
                        thread::sleep(Duration::from_micros(50));
                        in_flight.fetch_sub(1, Ordering::AcqRel);
                        queue.clear_interactive_script_status();
                    }
                    drained.fetch_add(1, Ordering::AcqRel);
                }
            })
        })
        .collect();
    for poller in pollers {
        poller.join().unwrap();
    }

    assert_eq!(drained.load(Ordering::Acquire), TOTAL);
    assert_eq!(interactive_seen.load(Ordering::Relaxed), TOTAL / 2);
    assert_eq!(max_in_flight.load(Ordering::Acquire), 1);
    assert!(queue.is_empty());
    assert!(!queue.is_interactive_script_running());
}

#[test]
fn test_shuffled_priorities_drain_in_order() {
    use rand::seq::SliceRandom;

    let pool = ScriptInvocationPool::new();
    let queue = ScriptInvocationQueue::new();
    let mut priorities: Vec<i32> = (0..200).map(|i| i % 20).collect();
    priorities.shuffle(&mut rand::rng());
    for (i, priority) in priorities.iter().enumerate() {
        offer(&pool, &queue, u32::try_from(i).unwrap(), *priority, false);
    }

    let drained: Vec<(i32, u64)> = std::iter::from_fn(|| queue.poll())
        .map(|invocation| (invocation.priority(), invocation.task_id()))
        .collect();
    assert_eq!(drained.len(), 200);
    for pair in drained.windows(2) {
        let (p0, t0) = pair[0];
        let (p1, t1) = pair[1];
        assert!(p0 > p1 || (p0 == p1 && t0 < t1));
    }
}
