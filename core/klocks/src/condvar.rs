// SPDX-License-Identifier: Apache-2.0

//! A Mesa-style condition variable.

use alloc::sync::Arc;

use kernel_guard::NoPreemptIrqSave;
use klist::SortedList;
use kspin::SpinRaw;

use crate::{lock::Lock, sched, semaphore::Semaphore, thread::Priority};

/// One queued waiter: a private one-shot semaphore plus the waiter's
/// priority, snapshotted at the moment it queued.
struct WaitRecord {
    sema: Arc<Semaphore>,
    priority: Priority,
}

/// A condition variable, conventionally paired with exactly one [`Lock`]
/// per use site (the pairing is caller discipline, not enforced here).
///
/// The monitor is Mesa-style: [`CondVar::signal`] does not hand the lock to
/// the woken waiter, so the waiter must re-check its condition after
/// [`CondVar::wait`] returns:
///
/// ```rust,ignore
/// while !condition_holds() {
///     cond.wait(&lock);
/// }
/// ```
pub struct CondVar {
    waiters: SpinRaw<SortedList<WaitRecord>>,
}

impl CondVar {
    /// Creates a condition variable with no waiters.
    pub const fn new() -> Self {
        Self {
            waiters: SpinRaw::new(SortedList::new()),
        }
    }

    /// Atomically releases `lock` and waits to be signaled, then re-acquires
    /// `lock` before returning.
    ///
    /// "Atomically" in the Mesa sense: the wait record is queued before the
    /// lock is released, so a signal sent the instant the lock comes free
    /// cannot miss this waiter, even though release and suspension are not a
    /// single step.
    ///
    /// # Panics
    ///
    /// Panics in interrupt context, or if the caller does not hold `lock`.
    pub fn wait(&self, lock: &Lock) {
        let _guard = NoPreemptIrqSave::new();
        assert!(!sched::in_interrupt(), "condition wait in interrupt context");
        let cur = sched::current();
        assert!(
            lock.held_by_current(),
            "{} waited on a condition without holding its lock",
            cur.id_name()
        );

        let sema = Arc::new(Semaphore::new(0));
        self.waiters.lock().insert_desc_by_key(
            WaitRecord {
                sema: sema.clone(),
                priority: cur.effective_priority(),
            },
            |r| r.priority,
        );

        lock.release();
        sema.down();
        lock.acquire();
    }

    /// Wakes the highest-priority waiter, if any.
    ///
    /// # Panics
    ///
    /// Panics if the caller does not hold `lock`.
    pub fn signal(&self, lock: &Lock) {
        let _guard = NoPreemptIrqSave::new();
        assert!(
            lock.held_by_current(),
            "{} signaled a condition without holding its lock",
            sched::current().id_name()
        );

        if let Some(record) = self.waiters.lock().pop_front() {
            record.sema.up();
        }
    }

    /// Wakes every current waiter, in descending priority order.
    ///
    /// The woken threads still serialize on re-acquiring `lock`.
    ///
    /// # Panics
    ///
    /// Panics if the caller does not hold `lock`.
    pub fn broadcast(&self, lock: &Lock) {
        let _guard = NoPreemptIrqSave::new();
        while !self.waiters.lock().is_empty() {
            self.signal(lock);
        }
    }
}

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}
