// Copyright (c) 2025 TaskForge Contributors
//
// Task handles: how callers observe a submitted task.

use std::sync::Arc;

use crate::scheduler::Shared;
use crate::task::{TaskId, TaskState};

/// Lightweight reference to a submitted task.
///
/// A handle does not keep the task record alive; it resolves the record
/// through the registry on demand. Once the record has been reaped the task
/// is treated as completed. Handles stay valid after the scheduler stops.
#[derive(Clone)]
pub struct TaskHandle {
    id: TaskId,
    shared: Arc<Shared>,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId, shared: Arc<Shared>) -> Self {
        Self { id, shared }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Block until the task has completed (or been cancelled on teardown).
    ///
    /// Joining an already-reaped task returns immediately. Calling `join`
    /// repeatedly is idempotent.
    pub fn join(&self) {
        // The Arc clone happens under the registry lock, so a completing
        // worker cannot free the record between resolution and the wait.
        let Some(record) = self.shared.registry.lookup(self.id) else {
            return;
        };
        record.wait_completed();
    }

    /// Current task state, or None if the record has been reaped (which
    /// implies the task completed).
    pub fn poll(&self) -> Option<TaskState> {
        self.shared.registry.lookup(self.id).map(|r| r.state())
    }
}
