// FFI C API Implementation
//
// C-compatible entry points for embedding the scheduler. All functions use
// #[no_mangle] and extern "C", null-check every pointer, and never unwind
// across the boundary on the paths they control.

use std::os::raw::{c_int, c_void};
use std::ptr;

use crate::error::SchedError;
use crate::handle::TaskHandle;
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::task::TaskState;

use super::{
    taskforge_handle_t, taskforge_scheduler_t, taskforge_stats_t, taskforge_task_fn,
    TASKFORGE_ALREADY_RUNNING, TASKFORGE_INVALID_HANDLE, TASKFORGE_INVALID_PARAM,
    TASKFORGE_OUT_OF_MEMORY, TASKFORGE_SUCCESS, TASKFORGE_TASK_NOT_FOUND,
};

/// Context pointer moved into a task closure.
///
/// The caller guarantees the pointed-to data outlives the task and tolerates
/// access from whichever worker thread runs it; that contract is what makes
/// the wrapper Send.
struct UserCtx(*mut c_void);
unsafe impl Send for UserCtx {}

fn error_to_code(err: &SchedError) -> c_int {
    match err {
        SchedError::ResourceExhausted(_) | SchedError::ThreadSpawn(_) => TASKFORGE_OUT_OF_MEMORY,
        SchedError::InvalidArgument(_) | SchedError::InvalidOperation(_) => TASKFORGE_INVALID_PARAM,
        SchedError::AlreadyRunning => TASKFORGE_ALREADY_RUNNING,
        SchedError::NotRunning => TASKFORGE_INVALID_HANDLE,
        SchedError::NotFound(_) => TASKFORGE_TASK_NOT_FOUND,
    }
}

/// Create a scheduler in the stopped state.
///
/// # Parameters
/// - `worker_count`: number of worker threads; 0 auto-detects the CPU count
/// - `queue_capacity`: initial per-worker deque capacity, a power of two >= 2
/// - `out`: receives the scheduler pointer on success
///
/// # Returns
/// `TASKFORGE_SUCCESS`, or `TASKFORGE_INVALID_PARAM` for a null `out` or a
/// bad capacity.
///
/// # Memory Management
/// The returned scheduler must be freed with `taskforge_scheduler_destroy()`.
///
/// # Safety
/// `out` must be a valid pointer to writable storage for one pointer.
#[no_mangle]
pub unsafe extern "C" fn taskforge_scheduler_create(
    worker_count: usize,
    queue_capacity: usize,
    out: *mut *mut taskforge_scheduler_t,
) -> c_int {
    if out.is_null() {
        return TASKFORGE_INVALID_PARAM;
    }

    let config = SchedulerConfig {
        worker_count,
        queue_capacity,
    };

    match Scheduler::new(config) {
        Ok(sched) => {
            *out = Box::into_raw(Box::new(sched)) as *mut taskforge_scheduler_t;
            TASKFORGE_SUCCESS
        }
        Err(e) => {
            *out = ptr::null_mut();
            error_to_code(&e)
        }
    }
}

/// Start the worker pool.
///
/// # Returns
/// `TASKFORGE_SUCCESS`, `TASKFORGE_ALREADY_RUNNING` if started twice, or
/// `TASKFORGE_INVALID_HANDLE` for a null scheduler.
///
/// # Safety
/// `scheduler` must be a pointer returned by `taskforge_scheduler_create()`
/// that has not been destroyed.
#[no_mangle]
pub unsafe extern "C" fn taskforge_scheduler_start(
    scheduler: *mut taskforge_scheduler_t,
) -> c_int {
    if scheduler.is_null() {
        return TASKFORGE_INVALID_HANDLE;
    }

    let sched = &*(scheduler as *const Scheduler);
    match sched.start() {
        Ok(()) => TASKFORGE_SUCCESS,
        Err(e) => error_to_code(&e),
    }
}

/// Submit a task.
///
/// The task is `func` applied to `ctx`; `ctx` may be null if `func` accepts
/// that. Workers invoke `func` exactly once from an arbitrary thread.
///
/// # Parameters
/// - `scheduler`: a started scheduler
/// - `func`: task entry point; must not be null
/// - `ctx`: user context passed through to `func`
/// - `out_handle`: receives an owned task handle on success
///
/// # Returns
/// `TASKFORGE_SUCCESS`, `TASKFORGE_INVALID_PARAM` for a null `func` or
/// `out_handle`, `TASKFORGE_INVALID_HANDLE` for a null or stopped scheduler.
///
/// # Memory Management
/// The returned handle must be freed with `taskforge_handle_destroy()`.
///
/// # Safety
/// `scheduler` must be valid. Whatever `ctx` points to must stay alive until
/// the task completes and must be safe to access from another thread.
#[no_mangle]
pub unsafe extern "C" fn taskforge_scheduler_submit(
    scheduler: *mut taskforge_scheduler_t,
    func: Option<taskforge_task_fn>,
    ctx: *mut c_void,
    out_handle: *mut *mut taskforge_handle_t,
) -> c_int {
    if scheduler.is_null() {
        return TASKFORGE_INVALID_HANDLE;
    }
    let Some(func) = func else {
        return TASKFORGE_INVALID_PARAM;
    };
    if out_handle.is_null() {
        return TASKFORGE_INVALID_PARAM;
    }

    let sched = &*(scheduler as *const Scheduler);
    let user_ctx = UserCtx(ctx);

    match sched.submit(move || {
        let user_ctx = user_ctx;
        let UserCtx(raw) = user_ctx;
        func(raw);
    }) {
        Ok(handle) => {
            *out_handle = Box::into_raw(Box::new(handle)) as *mut taskforge_handle_t;
            TASKFORGE_SUCCESS
        }
        Err(e) => {
            *out_handle = ptr::null_mut();
            error_to_code(&e)
        }
    }
}

/// Stop the scheduler: clears the running flag, wakes parked workers, and
/// joins every worker thread before returning. Idempotent.
///
/// # Safety
/// `scheduler` must be valid. Null is rejected with
/// `TASKFORGE_INVALID_HANDLE`.
#[no_mangle]
pub unsafe extern "C" fn taskforge_scheduler_stop(scheduler: *mut taskforge_scheduler_t) -> c_int {
    if scheduler.is_null() {
        return TASKFORGE_INVALID_HANDLE;
    }

    let sched = &*(scheduler as *const Scheduler);
    sched.stop();
    TASKFORGE_SUCCESS
}

/// Destroy the scheduler, stopping it first if needed. Tasks still queued are
/// cancelled; joiners blocked on them return. Outstanding task handles stay
/// safe to use and report their tasks as reaped.
///
/// # Safety
/// `scheduler` must have been returned by `taskforge_scheduler_create()` and
/// must not be used after this call. Null is a safe no-op.
#[no_mangle]
pub unsafe extern "C" fn taskforge_scheduler_destroy(scheduler: *mut taskforge_scheduler_t) {
    if scheduler.is_null() {
        return;
    }

    drop(Box::from_raw(scheduler as *mut Scheduler));
}

/// Fill `out` with a statistics snapshot.
///
/// # Safety
/// `scheduler` must be valid; `out` must point to writable storage for one
/// `taskforge_stats_t`.
#[no_mangle]
pub unsafe extern "C" fn taskforge_scheduler_stats(
    scheduler: *const taskforge_scheduler_t,
    out: *mut taskforge_stats_t,
) -> c_int {
    if scheduler.is_null() {
        return TASKFORGE_INVALID_HANDLE;
    }
    if out.is_null() {
        return TASKFORGE_INVALID_PARAM;
    }

    let sched = &*(scheduler as *const Scheduler);
    let stats = sched.stats();
    *out = taskforge_stats_t {
        worker_count: stats.worker_count as u64,
        tasks_submitted: stats.tasks_submitted,
        tasks_completed: stats.tasks_completed,
        tasks_pending: stats.tasks_pending,
    };
    TASKFORGE_SUCCESS
}

/// Block until the task behind `handle` completes. Returns immediately if the
/// task was already reaped. Safe to call more than once.
///
/// # Safety
/// `handle` must be a pointer returned by `taskforge_scheduler_submit()` that
/// has not been destroyed.
#[no_mangle]
pub unsafe extern "C" fn taskforge_handle_join(handle: *mut taskforge_handle_t) -> c_int {
    if handle.is_null() {
        return TASKFORGE_INVALID_HANDLE;
    }

    let task = &*(handle as *const TaskHandle);
    task.join();
    TASKFORGE_SUCCESS
}

/// Read the task's current state into `out_state` as one of the
/// `TASKFORGE_STATE_*` values.
///
/// # Returns
/// `TASKFORGE_SUCCESS`, or `TASKFORGE_TASK_NOT_FOUND` once the record has
/// been reaped (the task completed).
///
/// # Safety
/// `handle` must be valid; `out_state` must be writable.
#[no_mangle]
pub unsafe extern "C" fn taskforge_handle_poll(
    handle: *const taskforge_handle_t,
    out_state: *mut c_int,
) -> c_int {
    if handle.is_null() {
        return TASKFORGE_INVALID_HANDLE;
    }
    if out_state.is_null() {
        return TASKFORGE_INVALID_PARAM;
    }

    let task = &*(handle as *const TaskHandle);
    match task.poll() {
        Some(state) => {
            *out_state = match state {
                TaskState::Pending => super::TASKFORGE_STATE_PENDING,
                TaskState::Running => super::TASKFORGE_STATE_RUNNING,
                TaskState::Completed => super::TASKFORGE_STATE_COMPLETED,
                TaskState::Cancelled => super::TASKFORGE_STATE_CANCELLED,
            };
            TASKFORGE_SUCCESS
        }
        None => TASKFORGE_TASK_NOT_FOUND,
    }
}

/// Free a task handle. The task itself is unaffected.
///
/// # Safety
/// `handle` must have been returned by `taskforge_scheduler_submit()` and
/// must not be used after this call. Null is a safe no-op.
#[no_mangle]
pub unsafe extern "C" fn taskforge_handle_destroy(handle: *mut taskforge_handle_t) {
    if handle.is_null() {
        return;
    }

    drop(Box::from_raw(handle as *mut TaskHandle));
}
