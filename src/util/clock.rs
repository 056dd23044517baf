//! Monotonic clock shared by the schedulers.
//!
//! Start times are stored as nanoseconds since a process-wide origin so they
//! fit in a `u64` and compare cheaply inside priority queues.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds elapsed since the first call in this process.
#[must_use]
pub fn monotonic_nanos() -> u64 {
    let origin = *ORIGIN.get_or_init(Instant::now);
    duration_nanos(origin.elapsed())
}

/// Monotonic timestamp `delay` from now.
#[must_use]
pub fn nanos_after(delay: Duration) -> u64 {
    monotonic_nanos().saturating_add(duration_nanos(delay))
}

/// `Duration` as whole nanoseconds, saturating at `u64::MAX`.
#[must_use]
pub fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
