// SPDX-License-Identifier: Apache-2.0

//! A mutual-exclusion lock with priority donation.

use alloc::sync::Arc;

use kernel_guard::NoPreemptIrqSave;
use kspin::SpinRaw;

use crate::{
    donation, sched,
    semaphore::Semaphore,
    thread::{Priority, ThreadRef},
};

/// Shared state behind every [`Lock`] handle.
///
/// Threads reference this directly: a blocked thread's `waiting_for` points
/// here, which is what lets the donation walk hop from a blocked holder to
/// the next lock in the ownership chain.
pub(crate) struct LockShared {
    pub(crate) sema: Semaphore,
    pub(crate) state: SpinRaw<LockState>,
}

pub(crate) struct LockState {
    pub(crate) holder: Option<ThreadRef>,
    /// Highest priority among threads currently queued on this lock.
    pub(crate) ceiling: Option<Priority>,
}

impl LockShared {
    pub(crate) fn ceiling(&self) -> Option<Priority> {
        self.state.lock().ceiling
    }
}

/// A lock: a one-unit semaphore with a tracked owner.
///
/// Unlike a bare semaphore, a lock has a holder: the thread that acquired it
/// must be the one to release it, and acquiring a lock the caller already
/// holds is a fatal error (locks are not recursive). Under the
/// donation-enabled scheduling policy, a contended [`Lock::acquire`] donates
/// the caller's priority down the chain of holders, bounding the
/// priority-inversion window.
///
/// Cloning the handle yields another reference to the same lock.
#[derive(Clone)]
pub struct Lock {
    shared: Arc<LockShared>,
}

impl Lock {
    /// Creates a free lock.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(LockShared {
                sema: Semaphore::new(1),
                state: SpinRaw::new(LockState {
                    holder: None,
                    ceiling: None,
                }),
            }),
        }
    }

    /// Acquires the lock, blocking until it is free.
    ///
    /// # Panics
    ///
    /// Panics in interrupt context, or if the caller already holds the lock.
    pub fn acquire(&self) {
        let _guard = NoPreemptIrqSave::new();
        assert!(!sched::in_interrupt(), "lock acquire in interrupt context");
        let cur = sched::current();
        assert!(
            !self.held_by(&cur),
            "{} tried to acquire a lock it already holds",
            cur.id_name()
        );

        if sched::donation_enabled() {
            if self.shared.state.lock().holder.is_some() {
                cur.set_waiting_for(Some(self.shared.clone()));
            }
            donation::donate_on_acquire(&self.shared, &cur);
        }

        // Suspend point when the lock is contended.
        self.shared.sema.down();

        cur.set_waiting_for(None);
        self.shared.state.lock().holder = Some(cur.clone());
        cur.push_held(self.shared.clone());
    }

    /// Acquires the lock only if it is free right now.
    ///
    /// Never blocks and performs no donation walk; legal in interrupt
    /// context.
    ///
    /// # Panics
    ///
    /// Panics if the caller already holds the lock.
    pub fn try_acquire(&self) -> bool {
        let _guard = NoPreemptIrqSave::new();
        let cur = sched::current();
        assert!(
            !self.held_by(&cur),
            "{} tried to acquire a lock it already holds",
            cur.id_name()
        );

        if !self.shared.sema.try_down() {
            return false;
        }
        self.shared.state.lock().holder = Some(cur.clone());
        cur.push_held(self.shared.clone());
        true
    }

    /// Releases the lock and recomputes the caller's priority.
    ///
    /// # Panics
    ///
    /// Panics unless the caller is the current holder.
    pub fn release(&self) {
        let _guard = NoPreemptIrqSave::new();
        let cur = sched::current();
        assert!(
            self.held_by(&cur),
            "{} tried to release a lock it does not hold",
            cur.id_name()
        );

        self.shared.state.lock().holder = None;
        cur.remove_held(&self.shared);
        self.shared.sema.up();

        // The ceiling is waiter bookkeeping for this lock and resets under
        // every policy; only the priority recompute is policy-gated. A
        // ceiling left behind by a release under the rate-based policy would
        // read as a phantom donation after switching back.
        self.shared.state.lock().ceiling = None;
        if sched::donation_enabled() {
            donation::refresh_priority(&cur);
        }
    }

    /// Whether the calling thread holds this lock.
    ///
    /// (Asking about *another* thread's ownership would be racy; this query
    /// is only meaningful for the caller itself.)
    pub fn held_by_current(&self) -> bool {
        let _guard = NoPreemptIrqSave::new();
        self.held_by(&sched::current())
    }

    /// The current holder, if any. Diagnostic only: the answer may be stale
    /// by the time the caller looks at it.
    pub fn holder(&self) -> Option<ThreadRef> {
        let _guard = NoPreemptIrqSave::new();
        self.shared.state.lock().holder.clone()
    }

    fn held_by(&self, t: &ThreadRef) -> bool {
        self.shared
            .state
            .lock()
            .holder
            .as_ref()
            .is_some_and(|h| Arc::ptr_eq(h, t))
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}
