// SPDX-License-Identifier: Apache-2.0

//! Blocking synchronization primitives for a preemptible kernel, with
//! priority donation.
//!
//! Three primitives layered on one another:
//!
//! - [`Semaphore`]: a counting semaphore whose wait queue is ordered by
//!   effective priority. `up` wakes every waiter and lets the scheduler
//!   sort out who actually gets the unit, so a waiter whose priority was
//!   raised while blocked is honored.
//! - [`Lock`]: a mutual-exclusion lock (a binary semaphore plus an owner)
//!   that donates the blocked acquirer's priority along the chain of
//!   owners, bounded at [`DONATION_DEPTH_LIMIT`] hops.
//! - [`CondVar`]: a Mesa-style condition variable over a [`Lock`]; signal
//!   is a hint, so waiters re-check their predicate in a loop.
//!
//! The crate does not schedule threads itself. The surrounding kernel
//! plugs its scheduler in through [`SchedIf`]:
//!
//! ```rust,ignore
//! struct SchedIfImpl;
//!
//! #[crate_interface::impl_interface]
//! impl klocks::SchedIf for SchedIfImpl {
//!     fn current() -> klocks::ThreadRef { /* ... */ }
//!     fn block_current() { /* ... */ }
//!     // ...
//! }
//! ```
//!
//! All operations establish an IRQ-disabled, preemption-disabled critical
//! section via [`kernel_guard`] before touching shared state, so they are
//! safe against both preemption and interrupt handlers on a single
//! processor. Blocking operations (`down`, `acquire`, `wait`) must not be
//! called from interrupt context; non-blocking ones (`up`, `try_down`,
//! `try_acquire`) may be.
//!
//! With the `sim` feature, [`sim`] provides a deterministic cooperative
//! scheduler so the primitives can be exercised on a host.

#![cfg_attr(not(any(test, feature = "sim")), no_std)]

#[macro_use]
extern crate log;
extern crate alloc;

mod condvar;
mod donation;
mod lock;
mod sched;
mod semaphore;
mod thread;

#[cfg(feature = "sim")]
pub mod sim;

pub use condvar::CondVar;
pub use donation::DONATION_DEPTH_LIMIT;
pub use lock::Lock;
pub use sched::SchedIf;
pub use semaphore::{Semaphore, SemaphoreGuard};
pub use thread::{
    PRI_DEFAULT, PRI_MAX, PRI_MIN, Priority, PriorityState, ThreadControl, ThreadRef, ThreadState,
};
