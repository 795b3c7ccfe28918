// FFI layer
//
// C-compatible embedding surface. The scheduler and task handles cross the
// boundary as opaque pointers; closures cross as a function pointer plus a
// user context pointer.

#![allow(non_camel_case_types)]

mod c_api;

pub use c_api::*;

use std::os::raw::{c_int, c_void};

/// Opaque scheduler handle as seen from C
#[repr(C)]
pub struct taskforge_scheduler_t {
    _private: [u8; 0],
}

/// Opaque task handle as seen from C
#[repr(C)]
pub struct taskforge_handle_t {
    _private: [u8; 0],
}

/// Task entry point: receives the user context pointer and returns nothing.
pub type taskforge_task_fn = extern "C" fn(ctx: *mut c_void);

/// Statistics snapshot as seen from C
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct taskforge_stats_t {
    pub worker_count: u64,
    pub tasks_submitted: u64,
    pub tasks_completed: u64,
    pub tasks_pending: u64,
}

// Error codes returned across the boundary
pub const TASKFORGE_SUCCESS: c_int = 0;
pub const TASKFORGE_OUT_OF_MEMORY: c_int = 1;
pub const TASKFORGE_INVALID_PARAM: c_int = 2;
pub const TASKFORGE_INVALID_HANDLE: c_int = 3;
pub const TASKFORGE_TASK_NOT_FOUND: c_int = 4;
pub const TASKFORGE_ALREADY_RUNNING: c_int = 5;

// Task states as seen from C
pub const TASKFORGE_STATE_PENDING: c_int = 0;
pub const TASKFORGE_STATE_RUNNING: c_int = 1;
pub const TASKFORGE_STATE_COMPLETED: c_int = 2;
pub const TASKFORGE_STATE_CANCELLED: c_int = 3;
