// Copyright (c) 2025 TaskForge Contributors
//
// Scheduler: owns the worker pool, the per-worker queues, and the registry,
// and exposes the submit / start / stop surface.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::deque::WorkStealingDeque;
use crate::error::{Result, SchedError};
use crate::handle::TaskHandle;
use crate::registry::TaskRegistry;
use crate::task::TaskRecord;
use crate::worker::Worker;

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker threads; 0 means one per available CPU
    pub worker_count: usize,
    /// Initial capacity of each worker deque, a power of two
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            queue_capacity: 4096,
        }
    }
}

/// Counters reported by the scheduler.
///
/// `tasks_submitted` and `tasks_completed` are relaxed monotonic counters;
/// `tasks_pending` is derived and momentarily inconsistent values are
/// acceptable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub worker_count: usize,
    pub tasks_submitted: u64,
    pub tasks_completed: u64,
    pub tasks_cancelled: u64,
    pub tasks_pending: u64,
    pub steals: u64,
}

/// One worker slot: the Chase-Lev deque plus the submission inbox.
///
/// The deque's bottom end is single-writer, so external submitters cannot
/// push it directly; they append to the inbox and the owning worker drains
/// the inbox into its deque. Stealers fall back to try-locking a victim's
/// inbox so queued work stays globally stealable.
pub(crate) struct WorkerQueue {
    pub(crate) deque: WorkStealingDeque<Arc<TaskRecord>>,
    pub(crate) inbox: Mutex<VecDeque<Arc<TaskRecord>>>,
}

impl WorkerQueue {
    fn new(capacity: usize) -> Self {
        Self {
            deque: WorkStealingDeque::with_capacity(capacity),
            inbox: Mutex::new(VecDeque::new()),
        }
    }
}

/// State shared between the scheduler facade, its workers, and task handles.
pub(crate) struct Shared {
    pub(crate) queues: Vec<WorkerQueue>,
    pub(crate) registry: TaskRegistry,
    pub(crate) running: AtomicBool,
    /// Pairs every submission's push with its wakeup signal, and guards the
    /// park-path double-check; this is what closes the lost-wakeup race.
    pub(crate) wakeup_lock: Mutex<()>,
    pub(crate) wakeup_cond: Condvar,
    next_id: AtomicU64,
    pub(crate) submitted: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) cancelled: AtomicU64,
}

/// Work-stealing task scheduler.
///
/// Create it stopped, `start` it to spawn the pool, `submit` closures while
/// it runs, `stop` to quiesce. Dropping the scheduler stops it if needed and
/// reaps every record still queued, cancelling them so blocked joiners
/// return.
pub struct Scheduler {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a stopped scheduler.
    pub fn new(config: SchedulerConfig) -> Result<Scheduler> {
        if !config.queue_capacity.is_power_of_two() || config.queue_capacity < 2 {
            return Err(SchedError::InvalidArgument(format!(
                "queue_capacity must be a power of two >= 2, got {}",
                config.queue_capacity
            )));
        }

        let worker_count = if config.worker_count == 0 {
            num_cpus::get()
        } else {
            config.worker_count
        };

        let queues = (0..worker_count)
            .map(|_| WorkerQueue::new(config.queue_capacity))
            .collect();

        Ok(Scheduler {
            shared: Arc::new(Shared {
                queues,
                registry: TaskRegistry::new(),
                running: AtomicBool::new(false),
                wakeup_lock: Mutex::new(()),
                wakeup_cond: Condvar::new(),
                next_id: AtomicU64::new(0),
                submitted: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                cancelled: AtomicU64::new(0),
            }),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the worker threads.
    pub fn start(&self) -> Result<()> {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SchedError::AlreadyRunning);
        }

        let worker_count = self.shared.queues.len();
        let mut workers = self.workers.lock();
        for index in 0..worker_count {
            let shared = Arc::clone(&self.shared);
            let spawned = std::thread::Builder::new()
                .name(format!("taskforge-worker-{index}"))
                .spawn(move || Worker::new(index, shared).run());

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Roll back: wake and join whatever already started.
                    self.shared.running.store(false, Ordering::Release);
                    {
                        let _guard = self.shared.wakeup_lock.lock();
                        self.shared.wakeup_cond.notify_all();
                    }
                    for handle in workers.drain(..) {
                        let _ = handle.join();
                    }
                    return Err(SchedError::ThreadSpawn(e));
                }
            }
        }

        tracing::info!(worker_count, "scheduler started");
        Ok(())
    }

    /// Submit a closure for execution and get a handle to it.
    ///
    /// Tasks are not guaranteed to execute in submission order; stealing
    /// reorders freely.
    pub fn submit<F>(&self, f: F) -> Result<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(SchedError::NotRunning);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let record = Arc::new(TaskRecord::new(id, Box::new(f)));
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.registry.insert(Arc::clone(&record));

        let index = (id % self.shared.queues.len() as u64) as usize;
        {
            // Push and signal under the wakeup lock so a worker about to park
            // either sees the task or is guaranteed the signal.
            let _guard = self.shared.wakeup_lock.lock();
            self.shared.queues[index].inbox.lock().push_back(record);
            self.shared.wakeup_cond.notify_one();
        }

        Ok(TaskHandle::new(id, Arc::clone(&self.shared)))
    }

    /// Clear the running flag, wake every parked worker, and join the pool.
    ///
    /// Idempotent; never fails. Tasks still queued when the workers exit are
    /// left pending and reaped on drop.
    pub fn stop(&self) {
        let was_running = self
            .shared
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if was_running {
            let _guard = self.shared.wakeup_lock.lock();
            self.shared.wakeup_cond.notify_all();
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }

        if was_running {
            let stats = self.stats();
            tracing::info!(
                completed = stats.tasks_completed,
                pending = stats.tasks_pending,
                "scheduler stopped"
            );
        }
    }

    /// Whether the pool is accepting submissions
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn worker_count(&self) -> usize {
        self.shared.queues.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        let submitted = self.shared.submitted.load(Ordering::Relaxed);
        let completed = self.shared.completed.load(Ordering::Relaxed);
        let cancelled = self.shared.cancelled.load(Ordering::Relaxed);
        let steals: u64 = self
            .shared
            .queues
            .iter()
            .map(|q| q.deque.stats().steal_count)
            .sum();

        SchedulerStats {
            worker_count: self.shared.queues.len(),
            tasks_submitted: submitted,
            tasks_completed: completed,
            tasks_cancelled: cancelled,
            tasks_pending: submitted.saturating_sub(completed + cancelled),
            steals,
        }
    }

    /// Number of records still registered (tasks that were never drained).
    pub fn undrained_tasks(&self) -> usize {
        self.shared.registry.len()
    }

    /// Cancel and release every record still queued. Requires a stopped pool.
    fn reap(&self) {
        let queued: usize = self.shared.queues.iter().map(|q| q.deque.len()).sum();
        let remaining = self.shared.registry.drain();
        let mut cancelled = 0u64;
        for record in remaining {
            if record.cancel() {
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            self.shared.cancelled.fetch_add(cancelled, Ordering::Relaxed);
            tracing::debug!(cancelled, queued, "reaped undrained tasks");
        }

        // Workers are joined, so the owner-only queue ends are safe to drain
        // from this thread.
        for queue in &self.shared.queues {
            queue.inbox.lock().clear();
            while queue.deque.pop().is_some() {}
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
        self.reap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_must_be_power_of_two() {
        let config = SchedulerConfig {
            worker_count: 2,
            queue_capacity: 100,
        };
        assert!(matches!(
            Scheduler::new(config),
            Err(SchedError::InvalidArgument(_))
        ));

        let config = SchedulerConfig {
            worker_count: 2,
            queue_capacity: 1,
        };
        assert!(Scheduler::new(config).is_err());
    }

    #[test]
    fn test_zero_workers_means_cpu_count() {
        let sched = Scheduler::new(SchedulerConfig::default()).unwrap();
        assert_eq!(sched.worker_count(), num_cpus::get());
    }

    #[test]
    fn test_submit_requires_running() {
        let sched = Scheduler::new(SchedulerConfig {
            worker_count: 1,
            queue_capacity: 4,
        })
        .unwrap();

        assert!(matches!(sched.submit(|| {}), Err(SchedError::NotRunning)));
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let sched = Scheduler::new(SchedulerConfig {
            worker_count: 1,
            queue_capacity: 4,
        })
        .unwrap();

        sched.start().unwrap();
        assert!(matches!(sched.start(), Err(SchedError::AlreadyRunning)));
        sched.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let sched = Scheduler::new(SchedulerConfig {
            worker_count: 2,
            queue_capacity: 4,
        })
        .unwrap();

        sched.start().unwrap();
        sched.stop();
        sched.stop();
        assert!(!sched.is_running());
    }
}
