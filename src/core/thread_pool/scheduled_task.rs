//! Pooled records for the dedicated pool's delay queue.

use std::fmt;
use std::time::Duration;

use super::{Job, TaskHandle};
use crate::collections::Delayed;
use crate::core::pool::{ObjectPool, Poolable};
use crate::util::clock;

/// A job waiting in the delay queue.
#[derive(Default)]
pub(crate) struct ScheduledTask {
    job: Option<Job>,
    start_nanos: u64,
    period: Option<Duration>,
    handle: Option<TaskHandle>,
}

impl ScheduledTask {
    pub(crate) fn handle(&self) -> Option<&TaskHandle> {
        self.handle.as_ref()
    }

    pub(crate) fn take_job(&mut self) -> Option<Job> {
        self.job.take()
    }

    pub(crate) const fn period(&self) -> Option<Duration> {
        self.period
    }

    /// Puts a repeating job back with its next start `period` after the
    /// previous scheduled start.
    pub(crate) fn reschedule(&mut self, job: Job) {
        self.job = Some(job);
        if let Some(period) = self.period {
            self.start_nanos = self
                .start_nanos
                .saturating_add(clock::duration_nanos(period));
        }
    }
}

impl Delayed for ScheduledTask {
    fn scheduled_start_nanos(&self) -> u64 {
        self.start_nanos
    }
}

impl Poolable for ScheduledTask {
    fn reset(&mut self) {
        self.job = None;
        self.start_nanos = 0;
        self.period = None;
        self.handle = None;
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("job", &self.job)
            .field("start_nanos", &self.start_nanos)
            .field("period", &self.period)
            .field("task_id", &self.handle.as_ref().map(TaskHandle::id))
            .finish()
    }
}

/// Recycles [`ScheduledTask`] records.
#[derive(Debug)]
pub(crate) struct ScheduledTaskPool {
    pool: ObjectPool<ScheduledTask>,
}

impl Default for ScheduledTaskPool {
    fn default() -> Self {
        Self {
            pool: ObjectPool::new(ScheduledTask::default),
        }
    }
}

impl ScheduledTaskPool {
    /// Fills a record starting `delay` from now.
    pub(crate) fn allocate(
        &self,
        job: Job,
        delay: Duration,
        period: Option<Duration>,
        handle: TaskHandle,
    ) -> ScheduledTask {
        let mut task = self.pool.allocate();
        task.job = Some(job);
        task.start_nanos = clock::nanos_after(delay);
        task.period = period;
        task.handle = Some(handle);
        task
    }

    pub(crate) fn release(&self, task: ScheduledTask) {
        self.pool.release(task);
    }

    #[cfg(test)]
    pub(crate) fn pooled(&self) -> usize {
        self.pool.len()
    }
}
