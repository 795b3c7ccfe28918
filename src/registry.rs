// Copyright (c) 2025 TaskForge Contributors
//
// Task registry: the scheduler-wide id -> record map handles resolve
// through.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::task::{TaskId, TaskRecord};

/// Mapping from task id to its record, serialized by a single mutex.
///
/// Lookups are rare next to executions, so a coarse lock is fine. `lookup`
/// clones the `Arc` while the lock is held, which is what keeps a record from
/// being freed between a handle resolving it and using it.
pub(crate) struct TaskRegistry {
    tasks: Mutex<HashMap<TaskId, Arc<TaskRecord>>>,
}

impl TaskRegistry {
    pub(crate) fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn insert(&self, record: Arc<TaskRecord>) {
        self.tasks.lock().insert(record.id(), record);
    }

    pub(crate) fn remove(&self, id: TaskId) -> Option<Arc<TaskRecord>> {
        self.tasks.lock().remove(&id)
    }

    /// Resolve an id to a strong reference, or None if the record was
    /// already reaped.
    pub(crate) fn lookup(&self, id: TaskId) -> Option<Arc<TaskRecord>> {
        self.tasks.lock().get(&id).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Take every remaining record out of the map (teardown).
    pub(crate) fn drain(&self) -> Vec<Arc<TaskRecord>> {
        self.tasks.lock().drain().map(|(_, record)| record).collect()
    }
}
