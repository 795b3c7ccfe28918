// Copyright (c) 2025 TaskForge Contributors
//
// Work-stealing deque
//
// Chase-Lev deque used as the per-worker run queue. The owning worker pushes
// and pops at the bottom (LIFO) end; any other worker may steal from the top
// (FIFO) end with a CAS. The buffer is a power-of-two ring that doubles on
// overflow; superseded buffers are retired and kept alive until the deque is
// dropped so in-flight stealers can still read their slot.
//
// Reference: "Dynamic Circular Work-Stealing Deque" by Chase and Lev (2005)

use std::cell::UnsafeCell;
use std::mem::{self, MaybeUninit};
use std::sync::atomic::{fence, AtomicIsize, AtomicPtr, AtomicU64, Ordering};

/// Cache line size, for padding the indices apart
const CACHE_LINE_SIZE: usize = 64;

/// Largest ring the deque will grow to
const MAX_BUFFER_SIZE: usize = 1 << 30;

/// A ring buffer of task slots
///
/// Slots are `MaybeUninit`: the deque's indices, not the buffer, decide which
/// slots hold live values, and retired buffers are freed without dropping any
/// element.
struct Buffer<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    capacity: usize,
}

impl<T> Buffer<T> {
    fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two());
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(UnsafeCell::new(MaybeUninit::uninit()));
        }

        Self {
            slots: slots.into_boxed_slice(),
            capacity,
        }
    }

    /// Write the slot for `index`.
    ///
    /// # Safety
    ///
    /// The caller must be the only thread writing this slot.
    unsafe fn put(&self, index: isize, value: T) {
        let idx = (index as usize) & (self.capacity - 1);
        (*self.slots[idx].get()).write(value);
    }

    /// Bitwise-read the slot for `index`.
    ///
    /// # Safety
    ///
    /// The slot must have been initialized. The read duplicates the value;
    /// exactly one copy must be kept (the loser of a race must `mem::forget`
    /// its copy).
    unsafe fn take(&self, index: isize) -> T {
        let idx = (index as usize) & (self.capacity - 1);
        (*self.slots[idx].get()).assume_init_read()
    }

    /// Copy the slot for `index` without asserting it is initialized.
    ///
    /// Used on the steal path, where the copy may be stale; the caller must
    /// only `assume_init` it after winning the claiming CAS.
    ///
    /// # Safety
    ///
    /// `index` must be in the buffer's range.
    unsafe fn read(&self, index: isize) -> MaybeUninit<T> {
        let idx = (index as usize) & (self.capacity - 1);
        std::ptr::read(self.slots[idx].get())
    }

    /// Copy the live range `[top, bottom)` into a ring of twice the capacity.
    fn grow(&self, bottom: isize, top: isize) -> Buffer<T> {
        let next = Buffer::new(self.capacity * 2);
        for i in top..bottom {
            // Safety: the owner has exclusive write access during growth and
            // the range is initialized; the copies in the old ring become
            // stale duplicates that are never dropped.
            unsafe {
                let value = self.take(i);
                next.put(i, value);
            }
        }
        next
    }
}

// Safety: slot access is coordinated by the deque's index protocol
unsafe impl<T: Send> Send for Buffer<T> {}
unsafe impl<T: Send> Sync for Buffer<T> {}

/// Result of a steal attempt
#[derive(Debug)]
pub enum Steal<T> {
    /// A value was taken from the victim
    Success(T),
    /// The victim's deque was empty
    Empty,
    /// Lost a race with the owner or another stealer
    Retry,
}

impl<T> Steal<T> {
    /// The stolen value, treating `Empty` and `Retry` alike as "no work
    /// taken from this victim".
    pub fn into_option(self) -> Option<T> {
        match self {
            Steal::Success(v) => Some(v),
            _ => None,
        }
    }
}

/// Counters kept by each deque
#[derive(Debug, Clone, Copy, Default)]
pub struct DequeStats {
    pub push_count: u64,
    pub pop_count: u64,
    pub steal_count: u64,
    pub steal_attempt_count: u64,
    pub grow_count: u64,
}

/// Chase-Lev work-stealing deque
///
/// Exactly one thread (the owner) may call `push` and `pop`; any number of
/// other threads may call `steal` concurrently. `top` and `bottom` live on
/// separate cache lines so stealers hammering `top` do not invalidate the
/// owner's line.
#[repr(C, align(64))]
pub struct WorkStealingDeque<T> {
    /// Bottom index, advanced by the owner on push, decremented on pop
    bottom: AtomicIsize,
    _pad1: [u8; CACHE_LINE_SIZE - size_of::<AtomicIsize>()],
    /// Top index, advanced by stealers (and by the owner winning a tie)
    top: AtomicIsize,
    _pad2: [u8; CACHE_LINE_SIZE - size_of::<AtomicIsize>()],
    /// Current ring; replaced on growth, only ever written by the owner
    buffer: AtomicPtr<Buffer<T>>,
    /// Rings superseded by growth, freed when the deque drops
    retired: UnsafeCell<Vec<Box<Buffer<T>>>>,
    push_count: AtomicU64,
    pop_count: AtomicU64,
    steal_count: AtomicU64,
    steal_attempt_count: AtomicU64,
    grow_count: AtomicU64,
}

impl<T> WorkStealingDeque<T> {
    /// Create a deque with the given initial ring capacity (a power of two).
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity >= 2,
            "deque capacity must be a power of two >= 2"
        );
        let buffer = Box::into_raw(Box::new(Buffer::new(capacity)));

        Self {
            bottom: AtomicIsize::new(0),
            _pad1: [0; CACHE_LINE_SIZE - size_of::<AtomicIsize>()],
            top: AtomicIsize::new(0),
            _pad2: [0; CACHE_LINE_SIZE - size_of::<AtomicIsize>()],
            buffer: AtomicPtr::new(buffer),
            retired: UnsafeCell::new(Vec::new()),
            push_count: AtomicU64::new(0),
            pop_count: AtomicU64::new(0),
            steal_count: AtomicU64::new(0),
            steal_attempt_count: AtomicU64::new(0),
            grow_count: AtomicU64::new(0),
        }
    }

    /// Push a value at the bottom end.
    ///
    /// Returns the value back if the ring is full and already at its maximum
    /// size.
    ///
    /// # Safety contract
    ///
    /// Only the owner thread may call this method.
    pub fn push(&self, value: T) -> Result<(), T> {
        let bottom = self.bottom.load(Ordering::Relaxed);
        let top = self.top.load(Ordering::Acquire);
        let mut buffer = unsafe { &*self.buffer.load(Ordering::Relaxed) };

        if bottom - top >= buffer.capacity as isize {
            if buffer.capacity >= MAX_BUFFER_SIZE {
                return Err(value);
            }
            let next = Box::into_raw(Box::new(buffer.grow(bottom, top)));
            let old = self.buffer.swap(next, Ordering::Release);
            // Safety: single writer (the owner); stealers holding the old
            // ring keep reading it from the retired list until drop.
            unsafe {
                (*self.retired.get()).push(Box::from_raw(old));
            }
            self.grow_count.fetch_add(1, Ordering::Relaxed);
            buffer = unsafe { &*next };
        }

        // Safety: slot `bottom` is outside the live range until the store
        // below publishes it.
        unsafe {
            buffer.put(bottom, value);
        }

        fence(Ordering::Release);
        self.bottom.store(bottom + 1, Ordering::Relaxed);
        self.push_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Pop a value from the bottom end.
    ///
    /// # Safety contract
    ///
    /// Only the owner thread may call this method.
    pub fn pop(&self) -> Option<T> {
        let bottom = self.bottom.load(Ordering::Relaxed);
        let buffer = unsafe { &*self.buffer.load(Ordering::Relaxed) };

        // Reserve the last slot before inspecting top; concurrent stealers
        // observe the decrement and back off from it.
        let new_bottom = bottom - 1;
        self.bottom.store(new_bottom, Ordering::Relaxed);
        fence(Ordering::SeqCst);

        let top = self.top.load(Ordering::Relaxed);

        if top > new_bottom {
            // Empty; undo the reservation.
            self.bottom.store(bottom, Ordering::Relaxed);
            return None;
        }

        // Safety: `new_bottom` is initialized and reserved to us unless a
        // stealer wins the tie below, in which case our copy is forgotten.
        let value = unsafe { buffer.take(new_bottom) };

        if top == new_bottom {
            // Single element left: settle ownership against stealers.
            let won = self
                .top
                .compare_exchange(top, top + 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok();
            // Either way the deque is now empty at index top + 1.
            self.bottom.store(top + 1, Ordering::Relaxed);
            if !won {
                mem::forget(value);
                return None;
            }
        }

        self.pop_count.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Steal a value from the top end. Callable from any thread.
    pub fn steal(&self) -> Steal<T> {
        self.steal_attempt_count.fetch_add(1, Ordering::Relaxed);

        let top = self.top.load(Ordering::Acquire);
        fence(Ordering::SeqCst);
        let bottom = self.bottom.load(Ordering::Acquire);

        if top >= bottom {
            return Steal::Empty;
        }

        let buffer = unsafe { &*self.buffer.load(Ordering::Acquire) };

        // Read the slot before publishing the claim; once the CAS advances
        // `top` the owner may recycle this slot. The copy stays MaybeUninit
        // until the CAS proves it was ours.
        let slot = unsafe { buffer.read(top) };

        if self
            .top
            .compare_exchange(top, top + 1, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            self.steal_count.fetch_add(1, Ordering::Relaxed);
            Steal::Success(unsafe { slot.assume_init() })
        } else {
            Steal::Retry
        }
    }

    /// Whether the deque currently looks empty
    pub fn is_empty(&self) -> bool {
        let bottom = self.bottom.load(Ordering::Relaxed);
        let top = self.top.load(Ordering::Relaxed);
        bottom <= top
    }

    /// Approximate number of queued values
    pub fn len(&self) -> usize {
        let bottom = self.bottom.load(Ordering::Relaxed);
        let top = self.top.load(Ordering::Relaxed);
        (bottom - top).max(0) as usize
    }

    pub fn stats(&self) -> DequeStats {
        DequeStats {
            push_count: self.push_count.load(Ordering::Relaxed),
            pop_count: self.pop_count.load(Ordering::Relaxed),
            steal_count: self.steal_count.load(Ordering::Relaxed),
            steal_attempt_count: self.steal_attempt_count.load(Ordering::Relaxed),
            grow_count: self.grow_count.load(Ordering::Relaxed),
        }
    }
}

impl<T> Drop for WorkStealingDeque<T> {
    fn drop(&mut self) {
        // Drop remaining values, then the current ring; the retired rings
        // hold only stale bit copies and free as plain storage.
        while self.pop().is_some() {}

        let buffer = self.buffer.load(Ordering::Relaxed);
        unsafe {
            drop(Box::from_raw(buffer));
        }
    }
}

// Safety: the index protocol makes owner and stealer access disjoint
unsafe impl<T: Send> Send for WorkStealingDeque<T> {}
unsafe impl<T: Send> Sync for WorkStealingDeque<T> {}
