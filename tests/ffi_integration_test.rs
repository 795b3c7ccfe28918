// FFI (Foreign Function Interface) Integration Tests
//
// Drives the extern "C" surface the way an embedding host would: opaque
// pointers in, error codes out.

use std::os::raw::{c_int, c_void};
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};

use taskforge::ffi::{
    taskforge_handle_destroy, taskforge_handle_join, taskforge_handle_poll,
    taskforge_handle_t, taskforge_scheduler_create, taskforge_scheduler_destroy,
    taskforge_scheduler_start, taskforge_scheduler_stats, taskforge_scheduler_stop,
    taskforge_scheduler_submit, taskforge_scheduler_t, taskforge_stats_t,
    TASKFORGE_ALREADY_RUNNING, TASKFORGE_INVALID_HANDLE, TASKFORGE_INVALID_PARAM,
    TASKFORGE_STATE_COMPLETED, TASKFORGE_SUCCESS, TASKFORGE_TASK_NOT_FOUND,
};

extern "C" fn increment(ctx: *mut c_void) {
    let counter = unsafe { &*(ctx as *const AtomicU32) };
    counter.fetch_add(1, Ordering::SeqCst);
}

extern "C" fn noop(_ctx: *mut c_void) {}

fn create_started(workers: usize) -> *mut taskforge_scheduler_t {
    let mut sched: *mut taskforge_scheduler_t = ptr::null_mut();
    unsafe {
        assert_eq!(
            taskforge_scheduler_create(workers, 4096, &mut sched),
            TASKFORGE_SUCCESS
        );
        assert!(!sched.is_null());
        assert_eq!(taskforge_scheduler_start(sched), TASKFORGE_SUCCESS);
    }
    sched
}

#[test]
fn test_ffi_full_round_trip() {
    let counter = AtomicU32::new(0);
    let sched = create_started(2);

    unsafe {
        let mut handles: Vec<*mut taskforge_handle_t> = Vec::new();
        for _ in 0..100 {
            let mut handle: *mut taskforge_handle_t = ptr::null_mut();
            let rc = taskforge_scheduler_submit(
                sched,
                Some(increment),
                &counter as *const AtomicU32 as *mut c_void,
                &mut handle,
            );
            assert_eq!(rc, TASKFORGE_SUCCESS);
            assert!(!handle.is_null());
            handles.push(handle);
        }

        for &handle in &handles {
            assert_eq!(taskforge_handle_join(handle), TASKFORGE_SUCCESS);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 100);

        let mut stats = taskforge_stats_t::default();
        assert_eq!(taskforge_scheduler_stats(sched, &mut stats), TASKFORGE_SUCCESS);
        assert_eq!(stats.worker_count, 2);
        assert_eq!(stats.tasks_submitted, 100);
        assert_eq!(stats.tasks_completed, 100);
        assert_eq!(stats.tasks_pending, 0);

        // Joined tasks have been reaped; poll reports not-found or completed.
        let mut state: c_int = -1;
        let rc = taskforge_handle_poll(handles[0], &mut state);
        assert!(
            rc == TASKFORGE_TASK_NOT_FOUND
                || (rc == TASKFORGE_SUCCESS && state == TASKFORGE_STATE_COMPLETED)
        );

        for handle in handles {
            taskforge_handle_destroy(handle);
        }
        assert_eq!(taskforge_scheduler_stop(sched), TASKFORGE_SUCCESS);
        taskforge_scheduler_destroy(sched);
    }
}

#[test]
fn test_ffi_rejects_bad_arguments() {
    unsafe {
        // Null out pointer
        assert_eq!(
            taskforge_scheduler_create(2, 4096, ptr::null_mut()),
            TASKFORGE_INVALID_PARAM
        );

        // Capacity that is not a power of two
        let mut sched: *mut taskforge_scheduler_t = ptr::null_mut();
        assert_eq!(
            taskforge_scheduler_create(2, 100, &mut sched),
            TASKFORGE_INVALID_PARAM
        );
        assert!(sched.is_null());

        // Null scheduler everywhere
        assert_eq!(
            taskforge_scheduler_start(ptr::null_mut()),
            TASKFORGE_INVALID_HANDLE
        );
        assert_eq!(
            taskforge_scheduler_stop(ptr::null_mut()),
            TASKFORGE_INVALID_HANDLE
        );
        let mut handle: *mut taskforge_handle_t = ptr::null_mut();
        assert_eq!(
            taskforge_scheduler_submit(ptr::null_mut(), Some(noop), ptr::null_mut(), &mut handle),
            TASKFORGE_INVALID_HANDLE
        );

        // Null function pointer and null handle output
        let sched = create_started(1);
        assert_eq!(
            taskforge_scheduler_submit(sched, None, ptr::null_mut(), &mut handle),
            TASKFORGE_INVALID_PARAM
        );
        assert_eq!(
            taskforge_scheduler_submit(sched, Some(noop), ptr::null_mut(), ptr::null_mut()),
            TASKFORGE_INVALID_PARAM
        );

        // Null task handles
        assert_eq!(taskforge_handle_join(ptr::null_mut()), TASKFORGE_INVALID_HANDLE);
        let mut state: c_int = 0;
        assert_eq!(
            taskforge_handle_poll(ptr::null(), &mut state),
            TASKFORGE_INVALID_HANDLE
        );

        // Destroying nulls is a no-op, not a crash.
        taskforge_handle_destroy(ptr::null_mut());
        taskforge_scheduler_destroy(ptr::null_mut());

        taskforge_scheduler_destroy(sched);
    }
}

#[test]
fn test_ffi_lifecycle_errors() {
    unsafe {
        let sched = create_started(1);
        assert_eq!(taskforge_scheduler_start(sched), TASKFORGE_ALREADY_RUNNING);

        assert_eq!(taskforge_scheduler_stop(sched), TASKFORGE_SUCCESS);

        // Submitting to a stopped scheduler is rejected.
        let mut handle: *mut taskforge_handle_t = ptr::null_mut();
        assert_eq!(
            taskforge_scheduler_submit(sched, Some(noop), ptr::null_mut(), &mut handle),
            TASKFORGE_INVALID_HANDLE
        );

        taskforge_scheduler_destroy(sched);
    }
}

#[test]
fn test_ffi_handle_survives_scheduler_destroy() {
    let counter = AtomicU32::new(0);
    let sched = create_started(1);

    unsafe {
        let mut handle: *mut taskforge_handle_t = ptr::null_mut();
        assert_eq!(
            taskforge_scheduler_submit(
                sched,
                Some(increment),
                &counter as *const AtomicU32 as *mut c_void,
                &mut handle,
            ),
            TASKFORGE_SUCCESS
        );
        assert_eq!(taskforge_handle_join(handle), TASKFORGE_SUCCESS);

        taskforge_scheduler_destroy(sched);

        // The handle outlives the scheduler; its task is simply gone now.
        let mut state: c_int = 0;
        assert_eq!(taskforge_handle_poll(handle, &mut state), TASKFORGE_TASK_NOT_FOUND);
        assert_eq!(taskforge_handle_join(handle), TASKFORGE_SUCCESS);

        taskforge_handle_destroy(handle);
    }
}
