// SPDX-License-Identifier: Apache-2.0

//! The priority donation protocol.
//!
//! Donation is not an object but a walk over the live graph of threads and
//! locks: a contended acquire boosts the priority of every holder on the
//! ownership chain below it, and a release recomputes the releasing thread's
//! priority from the locks it still holds. Both halves run synchronously
//! inside [`crate::Lock`]'s critical sections.

use alloc::sync::Arc;

use crate::{lock::LockShared, sched, thread::ThreadRef};

/// Maximum number of ownership-chain hops donated through on one acquire.
///
/// The walk follows `holder.waiting_for` from lock to lock. Callers can (by
/// bug) make that graph cyclic; the depth bound tolerates cycles without
/// detecting them, and keeps a contended acquire O(limit). Hops beyond the
/// bound receive no donation.
pub const DONATION_DEPTH_LIMIT: usize = 8;

/// Propagates `caller`'s priority down the ownership chain rooted at
/// `start`, before `caller` blocks on it.
pub(crate) fn donate_on_acquire(start: &Arc<LockShared>, caller: &ThreadRef) {
    let priority = caller.effective_priority();
    let mut lock = start.clone();
    for _ in 0..DONATION_DEPTH_LIMIT {
        let holder = match lock.state.lock().holder.clone() {
            Some(h) => h,
            None => return,
        };
        if holder.effective_priority() >= priority {
            return;
        }

        trace!(
            "{} donates priority {} to {}",
            caller.id_name(),
            priority,
            holder.id_name()
        );
        sched::donate_priority(holder.clone(), priority);
        {
            let mut state = lock.state.lock();
            if state.ceiling.is_none_or(|c| c < priority) {
                state.ceiling = Some(priority);
            }
        }
        // The traversed lock's ceiling changed; keep its holder's held set
        // ordered by ceiling.
        holder.reposition_held(&lock);

        match holder.waiting_for() {
            Some(next) => lock = next,
            None => return,
        }
    }
    debug!("donation chain walk cut at depth {}", DONATION_DEPTH_LIMIT);
}

/// Recomputes a thread's effective priority after it releases a lock.
///
/// Scans the full remaining held set rather than trusting a single cached
/// ceiling, so a thread that was donated to through several independent
/// chains drops to the highest donation still justified, or back to its
/// base priority when none is.
pub(crate) fn refresh_priority(t: &ThreadRef) {
    let base = t.base_priority();
    match t.max_held_ceiling() {
        Some(ceiling) if ceiling > base => sched::donate_priority(t.clone(), ceiling),
        _ => sched::set_priority(t.clone(), base),
    }
}
