// SPDX-License-Identifier: Apache-2.0

//! A counting semaphore with a priority-ordered wait queue.

use kernel_guard::NoPreemptIrqSave;
use klist::SortedList;
use kspin::SpinRaw;

use crate::{
    sched,
    thread::{ThreadRef, ThreadState},
};

/// A counting semaphore.
///
/// The value is a non-negative count of available units. [`Semaphore::down`]
/// blocks until a unit is available; [`Semaphore::up`] frees one unit and
/// readies *every* queued thread, letting them re-contend so the
/// highest-priority one wins. [`Semaphore::try_down`] and [`Semaphore::up`]
/// are legal in interrupt context, `down` is not.
///
/// ```rust,ignore
/// use klocks::Semaphore;
///
/// static SLOTS: Semaphore = Semaphore::new(4);
///
/// fn worker() {
///     SLOTS.down();
///     // use one slot
///     SLOTS.up();
/// }
/// ```
pub struct Semaphore {
    inner: SpinRaw<SemInner>,
}

struct SemInner {
    value: usize,
    waiters: SortedList<ThreadRef>,
}

impl Semaphore {
    /// Creates a semaphore holding `value` units.
    pub const fn new(value: usize) -> Self {
        Self {
            inner: SpinRaw::new(SemInner {
                value,
                waiters: SortedList::new(),
            }),
        }
    }

    /// Acquires one unit, blocking until it is available.
    ///
    /// The value is re-checked in a loop after every wake: an `up` readies
    /// the whole queue, and all threads but the winner re-queue here.
    ///
    /// # Panics
    ///
    /// Panics when called in interrupt context.
    pub fn down(&self) {
        let _guard = NoPreemptIrqSave::new();
        assert!(
            !sched::in_interrupt(),
            "semaphore down in interrupt context"
        );
        loop {
            let mut inner = self.inner.lock();
            if inner.value > 0 {
                inner.value -= 1;
                return;
            }
            let cur = sched::current();
            inner
                .waiters
                .insert_desc_by_key(cur, |t| t.effective_priority());
            drop(inner);
            // Suspend point. The scheduler re-enables preemption while this
            // thread is off the processor and suppresses it again on resume.
            sched::block_current();
        }
    }

    /// Acquires one unit only if one is available right now.
    ///
    /// Never blocks; legal in interrupt context.
    pub fn try_down(&self) -> bool {
        let _guard = NoPreemptIrqSave::new();
        let mut inner = self.inner.lock();
        if inner.value > 0 {
            inner.value -= 1;
            true
        } else {
            false
        }
    }

    /// Releases one unit.
    ///
    /// Readies the entire wait queue, lowest priority first, then increments
    /// the value by exactly one. The drained threads re-contend in
    /// [`Semaphore::down`]; the highest-priority one wins the unit and the
    /// rest re-queue. If the highest drained thread is ready and outranks
    /// the caller, the processor is yielded immediately (except in
    /// interrupt context, where yielding is not possible and the wake alone
    /// must do).
    pub fn up(&self) {
        let _guard = NoPreemptIrqSave::new();
        let mut inner = self.inner.lock();
        // Drain from the back so the last thread readied is the
        // highest-priority one; it is the preemption candidate below.
        let mut top = None;
        while let Some(t) = inner.waiters.pop_back() {
            sched::unblock(t.clone());
            top = Some(t);
        }
        inner.value += 1;
        drop(inner);

        if let Some(t) = top {
            if !sched::in_interrupt()
                && t.state() == ThreadState::Ready
                && t.effective_priority() > sched::current().effective_priority()
            {
                sched::yield_now();
            }
        }
    }

    /// Current number of available units.
    pub fn value(&self) -> usize {
        let _guard = NoPreemptIrqSave::new();
        self.inner.lock().value
    }

    /// Acquires one unit and returns a guard that releases it on drop.
    pub fn down_guard(&self) -> SemaphoreGuard<'_> {
        self.down();
        SemaphoreGuard { sema: self }
    }
}

/// RAII guard for one semaphore unit.
pub struct SemaphoreGuard<'a> {
    sema: &'a Semaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.sema.up();
    }
}
