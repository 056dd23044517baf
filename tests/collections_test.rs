//! Cross-thread tests for the concurrent containers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use prometheus_script_engine::collections::{BlockingQueue, Monitor, PerThread, RwIntMap, RwQueue};

#[test]
fn test_monitor_wakes_waiters_without_lost_notifications() {
    let monitor = Arc::new(Monitor::new());
    let ready = Arc::new(AtomicUsize::new(0));

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let monitor = Arc::clone(&monitor);
            let ready = Arc::clone(&ready);
            thread::spawn(move || loop {
                let seen = monitor.epoch();
                if ready.load(Ordering::Acquire) == 1 {
                    return;
                }
                monitor.wait_for(seen, Duration::from_secs(5));
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    ready.store(1, Ordering::Release);
    monitor.notify_all();
    for waiter in waiters {
        waiter.join().unwrap();
    }
}

#[test]
fn test_monitor_wait_times_out() {
    let monitor = Monitor::new();
    let seen = monitor.epoch();
    assert!(!monitor.wait_for(seen, Duration::from_millis(10)));
    monitor.notify_one();
    assert!(monitor.wait_for(seen, Duration::from_millis(10)));
}

#[test]
fn test_blocking_queue_hands_off_between_threads() {
    let queue = Arc::new(BlockingQueue::new(4));
    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for i in 0..100 {
                queue.put(i).unwrap();
            }
            queue.close();
        })
    };

    let mut received = Vec::new();
    while let Some(item) = queue.take() {
        received.push(item);
    }
    producer.join().unwrap();
    assert_eq!(received, (0..100).collect::<Vec<_>>());
}

#[test]
fn test_blocking_queue_poll_timeout_on_empty() {
    let queue: BlockingQueue<u8> = BlockingQueue::new(1);
    assert_eq!(queue.poll_timeout(Duration::from_millis(10)), None);
    queue.offer(1).unwrap();
    assert_eq!(queue.offer(2), Err(2));
    assert_eq!(queue.poll_timeout(Duration::from_millis(10)), Some(1));
}

#[test]
fn test_rw_int_map_concurrent_inserts() {
    let map = Arc::new(RwIntMap::new());
    let writers: Vec<_> = (0..4u64)
        .map(|w| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                for i in 0..500u64 {
                    map.insert(w * 1000 + i, i);
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }
    assert_eq!(map.len(), 2000);

    let even = map.keys_matching(|v| v % 2 == 0);
    assert_eq!(map.remove_all_if(&even, |v| v % 2 == 0), 1000);
    assert_eq!(map.len(), 1000);
}

#[test]
fn test_rw_queue_is_fifo() {
    let queue = RwQueue::new();
    for i in 0..5 {
        queue.offer(i);
    }
    assert_eq!(queue.remove_if(|v| *v == 2), vec![2]);
    assert_eq!(queue.drain(), vec![0, 1, 3, 4]);
}

#[test]
fn test_per_thread_state_is_isolated() {
    let state: Arc<PerThread<Vec<u32>>> = Arc::new(PerThread::new());
    let workers: Vec<_> = (0..3u32)
        .map(|w| {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                for i in 0..10 {
                    state.with(Vec::new, |v| v.push(w * 100 + i));
                }
                state.with(Vec::new, |v| v.len())
            })
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap(), 10);
    }
    assert_eq!(state.len(), 3);
    state.clear();
    assert!(state.is_empty());
}
