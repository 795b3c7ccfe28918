// Copyright (c) 2025 TaskForge Contributors
//
// Worker loop: local pop, inbox drain, steal sweep, spin-then-park.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::scheduler::Shared;
use crate::task::TaskRecord;

/// Idle rounds spent spinning (with exponentially more pause instructions per
/// round) before the worker starts yielding its timeslice.
const SPIN_ROUNDS: u32 = 6;

/// Yield rounds after the spin phase; once these are spent too, the worker
/// parks on the wakeup condvar.
const YIELD_ROUNDS: u32 = 4;

/// One worker thread. Owns deque index `index`; only this thread touches that
/// deque's bottom end.
pub(crate) struct Worker {
    index: usize,
    shared: Arc<Shared>,
    rng: SmallRng,
}

impl Worker {
    pub(crate) fn new(index: usize, shared: Arc<Shared>) -> Self {
        Self {
            index,
            shared,
            rng: SmallRng::seed_from_u64(index as u64),
        }
    }

    /// The pop / steal / spin / park state machine. Returns when the running
    /// flag clears.
    pub(crate) fn run(&mut self) {
        tracing::debug!(worker = self.index, "worker started");
        let mut idle_rounds: u32 = 0;

        while self.shared.running.load(Ordering::Acquire) {
            if let Some(task) = self.next_task() {
                self.execute(task);
                idle_rounds = 0;
                continue;
            }

            if idle_rounds < SPIN_ROUNDS {
                for _ in 0..(1u32 << idle_rounds) {
                    std::hint::spin_loop();
                }
                idle_rounds += 1;
                continue;
            }
            if idle_rounds < SPIN_ROUNDS + YIELD_ROUNDS {
                std::thread::yield_now();
                idle_rounds += 1;
                continue;
            }

            // Park. The double-check of the running flag and the local queues
            // happens under the wakeup lock: a submitter pushes and signals
            // under the same lock, so we either see its task here or we are
            // parked before its signal and receive it.
            let mut guard = self.shared.wakeup_lock.lock();
            if !self.shared.running.load(Ordering::Acquire) {
                break;
            }
            if self.has_local_work() {
                drop(guard);
                idle_rounds = 0;
                continue;
            }
            self.shared.wakeup_cond.wait(&mut guard);
            drop(guard);
            idle_rounds = 0;
        }

        tracing::debug!(worker = self.index, "worker exiting");
    }

    /// Local deque first, then the inbox, then other workers' queues.
    fn next_task(&mut self) -> Option<Arc<TaskRecord>> {
        let queue = &self.shared.queues[self.index];

        if let Some(task) = queue.deque.pop() {
            return Some(task);
        }

        if self.drain_inbox() > 0 {
            if let Some(task) = queue.deque.pop() {
                return Some(task);
            }
        }

        self.steal_sweep()
    }

    /// Move submitted tasks from the inbox into the deque (owner-side push).
    /// Returns how many were moved.
    fn drain_inbox(&self) -> usize {
        let queue = &self.shared.queues[self.index];
        let mut inbox = queue.inbox.lock();
        let mut moved = 0;
        while let Some(task) = inbox.pop_front() {
            match queue.deque.push(task) {
                Ok(()) => moved += 1,
                Err(task) => {
                    // Ring at maximum size; leave the rest queued.
                    inbox.push_front(task);
                    break;
                }
            }
        }
        moved
    }

    /// One bounded sweep over the other workers: random starting victim,
    /// wrap-around order, at most N-1 attempts. A contended steal counts as
    /// "nothing here" and moves on.
    fn steal_sweep(&mut self) -> Option<Arc<TaskRecord>> {
        let n = self.shared.queues.len();
        if n <= 1 {
            return None;
        }

        let start = self.rng.random_range(0..n);
        for offset in 0..n {
            let victim = (start + offset) % n;
            if victim == self.index {
                continue;
            }

            let queue = &self.shared.queues[victim];
            if let Some(task) = queue.deque.steal().into_option() {
                return Some(task);
            }

            // The victim may not have drained its inbox yet; take from it
            // directly rather than leaving the work stranded.
            if let Some(mut inbox) = queue.inbox.try_lock() {
                if let Some(task) = inbox.pop_front() {
                    return Some(task);
                }
            }
        }

        None
    }

    /// Checked under the wakeup lock before parking.
    fn has_local_work(&self) -> bool {
        let queue = &self.shared.queues[self.index];
        !queue.deque.is_empty() || !queue.inbox.lock().is_empty()
    }

    /// Run the task, deregister it, and release the queue-side reference.
    fn execute(&self, task: Arc<TaskRecord>) {
        let id = task.id();
        task.execute(&self.shared.completed);
        self.shared.registry.remove(id);
    }
}
