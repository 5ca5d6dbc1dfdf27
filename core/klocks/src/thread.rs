// SPDX-License-Identifier: Apache-2.0

//! Thread-side state consumed and mutated by the synchronization layer.
//!
//! The scheduler collaborator creates one [`ThreadControl`] per kernel thread
//! and owns its run state and priority; this crate owns the donation
//! bookkeeping (`waiting_for`, the held-locks set) and reaches the scheduler
//! through [`crate::sched::SchedIf`].

use alloc::{format, string::String, sync::Arc};

use klist::SortedList;
use kspin::SpinRaw;

use crate::lock::LockShared;

/// Thread priority. Higher values run first.
pub type Priority = u8;

/// Lowest priority.
pub const PRI_MIN: Priority = 0;
/// Default priority.
pub const PRI_DEFAULT: Priority = 31;
/// Highest priority.
pub const PRI_MAX: Priority = 63;

/// A thread's priority, tagged by whether it is currently boosted.
///
/// Keeping base and effective priority in one tagged value (instead of two
/// fields plus a flag) makes a half-applied donation unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityState {
    /// No donation in effect; the thread runs at its own priority.
    Base(Priority),
    /// A donation is in effect.
    Donated {
        /// The thread's own priority, restored when the last donated-ceiling
        /// lock is released.
        base: Priority,
        /// The boosted priority the scheduler sees.
        effective: Priority,
    },
}

impl PriorityState {
    /// The priority the scheduler should run this thread at.
    pub fn effective(&self) -> Priority {
        match *self {
            PriorityState::Base(p) => p,
            PriorityState::Donated { effective, .. } => effective,
        }
    }

    /// The thread's own (undonated) priority.
    pub fn base(&self) -> Priority {
        match *self {
            PriorityState::Base(p) => p,
            PriorityState::Donated { base, .. } => base,
        }
    }
}

/// Scheduler-visible run state of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Runnable, waiting for the processor.
    Ready,
    /// Currently executing.
    Running,
    /// Suspended until explicitly readied.
    Blocked,
    /// Finished; never scheduled again.
    Exited,
}

/// Shared handle to a thread's control block.
pub type ThreadRef = Arc<ThreadControl>;

/// Per-thread state shared between the scheduler and this crate.
///
/// All fields are behind raw spin cells: every access happens inside a
/// non-preemptible critical section, either in this crate's operations or in
/// the scheduler's.
pub struct ThreadControl {
    id: u64,
    name: String,
    prio: SpinRaw<PriorityState>,
    state: SpinRaw<ThreadState>,
    /// The lock this thread is blocked trying to acquire, if any. Followed
    /// by the donation chain walk.
    waiting_for: SpinRaw<Option<Arc<LockShared>>>,
    /// Locks this thread currently holds, descending by donation ceiling.
    held: SpinRaw<SortedList<Arc<LockShared>>>,
}

impl ThreadControl {
    /// Creates a control block for a new thread.
    ///
    /// Called by the scheduler collaborator when it creates a thread.
    pub fn new(id: u64, name: &str, priority: Priority) -> Self {
        Self {
            id,
            name: String::from(name),
            prio: SpinRaw::new(PriorityState::Base(priority)),
            state: SpinRaw::new(ThreadState::Ready),
            waiting_for: SpinRaw::new(None),
            held: SpinRaw::new(SortedList::new()),
        }
    }

    /// Numeric thread id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `"Thread(id, name)"`, for fatal-error messages.
    pub fn id_name(&self) -> String {
        format!("Thread({}, {:?})", self.id, self.name)
    }

    /// The priority the scheduler should use right now.
    pub fn effective_priority(&self) -> Priority {
        self.prio.lock().effective()
    }

    /// The thread's own priority, ignoring donations.
    pub fn base_priority(&self) -> Priority {
        self.prio.lock().base()
    }

    /// Whether a donation is currently in effect.
    pub fn is_donated(&self) -> bool {
        matches!(*self.prio.lock(), PriorityState::Donated { .. })
    }

    /// Current run state.
    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    /// Sets the run state. Called by the scheduler.
    pub fn set_state(&self, state: ThreadState) {
        *self.state.lock() = state;
    }

    /// Sets the base priority, clearing any donation. Called by the
    /// scheduler.
    pub fn set_base_priority(&self, priority: Priority) {
        *self.prio.lock() = PriorityState::Base(priority);
    }

    /// Applies a donated effective priority, keeping the base. Called by the
    /// scheduler's donation-aware priority setter.
    pub fn set_donated_priority(&self, priority: Priority) {
        let mut prio = self.prio.lock();
        let base = prio.base();
        *prio = if priority > base {
            PriorityState::Donated {
                base,
                effective: priority,
            }
        } else {
            PriorityState::Base(base)
        };
    }

    pub(crate) fn waiting_for(&self) -> Option<Arc<LockShared>> {
        self.waiting_for.lock().clone()
    }

    pub(crate) fn set_waiting_for(&self, lock: Option<Arc<LockShared>>) {
        *self.waiting_for.lock() = lock;
    }

    pub(crate) fn push_held(&self, lock: Arc<LockShared>) {
        self.held.lock().insert_desc_by_key(lock, |l| l.ceiling());
    }

    pub(crate) fn remove_held(&self, lock: &Arc<LockShared>) {
        self.held.lock().remove_first(|l| Arc::ptr_eq(l, lock));
    }

    /// Re-files `lock` in the held set after its ceiling changed.
    pub(crate) fn reposition_held(&self, lock: &Arc<LockShared>) {
        let mut held = self.held.lock();
        if let Some(l) = held.remove_first(|l| Arc::ptr_eq(l, lock)) {
            held.insert_desc_by_key(l, |l| l.ceiling());
        }
    }

    /// Highest donation ceiling over the whole held set, scanned fresh.
    pub(crate) fn max_held_ceiling(&self) -> Option<Priority> {
        self.held.lock().iter().filter_map(|l| l.ceiling()).max()
    }
}
