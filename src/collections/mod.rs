//! Concurrent containers used by the scheduler.
//!
//! Shared registries are guarded by `parking_lot::RwLock` (many readers, few
//! writers). The blocking queues hold `Send`-only jobs and executors, so they
//! sit behind a `Mutex` and hand off through [`Monitor`]. Id-keyed registries
//! use the open-addressing [`IntMap`] / [`IntSet`] to avoid per-key allocation.

pub mod blocking_queue;
pub mod delayed_queue;
pub mod int_map;
pub mod int_set;
pub mod monitor;
pub mod per_thread;
pub mod priority_queue;
pub mod rw_map;
pub mod rw_queue;

pub use blocking_queue::BlockingQueue;
pub use delayed_queue::{Delayed, DelayedPriorityQueue};
pub use int_map::{IntMap, RwIntMap};
pub use int_set::IntSet;
pub use monitor::Monitor;
pub use per_thread::PerThread;
pub use priority_queue::RwPriorityQueue;
pub use rw_map::RwMap;
pub use rw_queue::RwQueue;
