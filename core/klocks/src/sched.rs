// SPDX-License-Identifier: Apache-2.0

//! Interface to the thread scheduler.
//!
//! The scheduler lives in another crate; this crate reaches it through a
//! [`crate_interface`] boundary, the same way preemption control reaches the
//! kernel through [`kernel_guard::KernelGuardIf`]. Exactly one implementation
//! must be linked into the final image:
//!
//! ```rust,ignore
//! struct Scheduler;
//!
//! #[crate_interface::impl_interface]
//! impl klocks::SchedIf for Scheduler {
//!     fn current() -> klocks::ThreadRef {
//!         // ...
//!     }
//!     // ...
//! }
//! ```
//!
//! The test suite links the cooperative simulation scheduler from
//! [`crate::sim`] instead.

use crate::thread::{Priority, ThreadRef};

/// Scheduler operations consumed by the synchronization primitives.
///
/// All of these are called with preemption and IRQs already suppressed by
/// the calling operation's critical section, except while the caller is
/// descheduled inside [`SchedIf::block_current`] or [`SchedIf::yield_now`].
#[crate_interface::def_interface]
pub trait SchedIf {
    /// The calling thread.
    fn current() -> ThreadRef;

    /// Suspends the calling thread until some other thread readies it with
    /// [`SchedIf::unblock`]. Preemption is re-enabled while the thread is
    /// off the processor and suppressed again before this returns.
    fn block_current();

    /// Marks a blocked thread ready. Does not reschedule by itself; the
    /// caller decides whether to yield.
    fn unblock(t: ThreadRef);

    /// Voluntarily gives up the processor.
    fn yield_now();

    /// Sets a thread's base priority, clearing any donated boost.
    fn set_priority(t: ThreadRef, priority: Priority);

    /// Donation-aware priority set: adjusts the effective priority, keeping
    /// the base and marking the thread boosted.
    fn donate_priority(t: ThreadRef, priority: Priority);

    /// Whether the active scheduling policy performs priority donation
    /// (as opposed to the rate-based/multilevel-feedback policy).
    fn donation_enabled() -> bool;

    /// Whether the caller is in a non-suspendable execution context
    /// (interrupt handling); blocking operations are fatal there.
    fn in_interrupt() -> bool;
}

pub(crate) fn current() -> ThreadRef {
    crate_interface::call_interface!(SchedIf::current)
}

pub(crate) fn block_current() {
    crate_interface::call_interface!(SchedIf::block_current)
}

pub(crate) fn unblock(t: ThreadRef) {
    crate_interface::call_interface!(SchedIf::unblock, t)
}

pub(crate) fn yield_now() {
    crate_interface::call_interface!(SchedIf::yield_now)
}

pub(crate) fn set_priority(t: ThreadRef, priority: Priority) {
    crate_interface::call_interface!(SchedIf::set_priority, t, priority)
}

pub(crate) fn donate_priority(t: ThreadRef, priority: Priority) {
    crate_interface::call_interface!(SchedIf::donate_priority, t, priority)
}

pub(crate) fn donation_enabled() -> bool {
    crate_interface::call_interface!(SchedIf::donation_enabled)
}

pub(crate) fn in_interrupt() -> bool {
    crate_interface::call_interface!(SchedIf::in_interrupt)
}
