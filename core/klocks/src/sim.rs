// SPDX-License-Identifier: Apache-2.0

//! Deterministic cooperative scheduler for host-side tests.
//!
//! Models the kernel's execution model on a host OS: a single logical
//! processor with explicit preemption points. Every simulated thread is an
//! OS thread, but exactly one owns the processor at a time; ownership is
//! handed over through a mutex + condvar, so scenarios interleave the same
//! way on every run.
//!
//! Scheduling rules, mirroring the kernel scheduler this stands in for:
//! the highest effective priority runs (first-come tie-break); spawning a
//! higher-priority thread preempts the spawner; lowering the current
//! thread's priority reschedules; readying a thread does *not* preempt by
//! itself; the semaphore's explicit yield decision covers that.
//!
//! Scenarios are serialized behind a world lock:
//!
//! ```rust,ignore
//! #[test]
//! fn my_scenario() {
//!     sim::run(|| {
//!         let h = sim::spawn("worker", PRI_DEFAULT, || { /* ... */ });
//!         h.join();
//!     });
//! }
//! ```

use std::{
    cell::Cell,
    panic::{self, AssertUnwindSafe},
    sync::{Condvar, Mutex, MutexGuard},
    thread,
};

use alloc::{sync::Arc, vec::Vec};

use crate::{
    sched::SchedIf,
    thread::{PRI_DEFAULT, Priority, ThreadControl, ThreadRef, ThreadState},
};

/// The two mutually exclusive scheduling policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Priority scheduling with donation (the default).
    Donation,
    /// Rate-based/multilevel-feedback scheduling; no donation is performed.
    RateBased,
}

struct SimInner {
    current: Option<ThreadRef>,
    ready: Vec<ThreadRef>,
    /// Threads blocked in `JoinHandle::join`, keyed by joinee id.
    joiners: Vec<(u64, ThreadRef)>,
    policy: Policy,
    next_id: u64,
}

static INNER: Mutex<SimInner> = Mutex::new(SimInner {
    current: None,
    ready: Vec::new(),
    joiners: Vec::new(),
    policy: Policy::Donation,
    next_id: 2,
});
static CPU: Condvar = Condvar::new();
static WORLD: Mutex<()> = Mutex::new(());

thread_local! {
    static IN_IRQ: Cell<bool> = const { Cell::new(false) };
}

// A panicking scenario poisons the mutexes; later scenarios still run.
fn inner() -> MutexGuard<'static, SimInner> {
    INNER.lock().unwrap_or_else(|e| e.into_inner())
}

/// Hands the processor to the highest-priority ready thread.
///
/// Priorities are read live (a donation may have changed them since the
/// thread was readied); ties go to the earliest-readied thread.
fn dispatch(g: &mut SimInner) {
    debug_assert!(g.current.is_none());
    let mut best: Option<usize> = None;
    for (i, t) in g.ready.iter().enumerate() {
        let better = match best {
            None => true,
            Some(b) => t.effective_priority() > g.ready[b].effective_priority(),
        };
        if better {
            best = Some(i);
        }
    }
    let Some(i) = best else {
        panic!("sim: every simulated thread is blocked (deadlock)");
    };
    let next = g.ready.remove(i);
    next.set_state(ThreadState::Running);
    g.current = Some(next);
    CPU.notify_all();
}

fn wait_for_cpu(me: &ThreadRef) {
    let mut g = inner();
    while !g.current.as_ref().is_some_and(|c| Arc::ptr_eq(c, me)) {
        g = CPU.wait(g).unwrap_or_else(|e| e.into_inner());
    }
}

/// Deschedules the current thread if a ready thread now outranks it.
fn preempt_if_outranked() {
    let me = {
        let mut g = inner();
        let Some(cur) = g.current.clone() else { return };
        let outranked = g
            .ready
            .iter()
            .any(|t| t.effective_priority() > cur.effective_priority());
        if !outranked {
            return;
        }
        let me = g.current.take().unwrap();
        me.set_state(ThreadState::Ready);
        g.ready.push(me.clone());
        dispatch(&mut g);
        me
    };
    wait_for_cpu(&me);
}

struct SimSched;

#[crate_interface::impl_interface]
impl SchedIf for SimSched {
    fn current() -> ThreadRef {
        inner()
            .current
            .clone()
            .expect("sim: no scheduler world is active (wrap the test in sim::run)")
    }

    fn block_current() {
        let me = {
            let mut g = inner();
            let me = g.current.take().expect("sim: no current thread to block");
            me.set_state(ThreadState::Blocked);
            dispatch(&mut g);
            me
        };
        wait_for_cpu(&me);
    }

    fn unblock(t: ThreadRef) {
        let mut g = inner();
        if t.state() == ThreadState::Blocked {
            t.set_state(ThreadState::Ready);
            g.ready.push(t);
        }
    }

    fn yield_now() {
        let me = {
            let mut g = inner();
            let me = g.current.take().expect("sim: no current thread to yield");
            me.set_state(ThreadState::Ready);
            g.ready.push(me.clone());
            dispatch(&mut g);
            me
        };
        wait_for_cpu(&me);
    }

    fn set_priority(t: ThreadRef, priority: Priority) {
        t.set_base_priority(priority);
        let is_current = inner()
            .current
            .as_ref()
            .is_some_and(|c| Arc::ptr_eq(c, &t));
        if is_current {
            preempt_if_outranked();
        }
    }

    fn donate_priority(t: ThreadRef, priority: Priority) {
        // No reschedule: donation targets are blocked or ready, and the
        // donor is mid-operation inside a critical section.
        t.set_donated_priority(priority);
    }

    fn donation_enabled() -> bool {
        inner().policy == Policy::Donation
    }

    fn in_interrupt() -> bool {
        IN_IRQ.with(|c| c.get())
    }
}

struct SimKernelGuard;

#[crate_interface::impl_interface]
impl kernel_guard::KernelGuardIf for SimKernelGuard {
    // Preemption points in the simulation are explicit, so the guards have
    // nothing to suppress.
    fn enable_preempt() {}
    fn disable_preempt() {}
}

/// Runs `f` as the "main" simulated thread of a fresh world.
///
/// Scenarios are serialized process-wide; `main` runs at [`PRI_DEFAULT`]
/// under the donation policy. Panics from `f` (including `should_panic`
/// assertions) propagate to the caller after the world is torn down.
pub fn run(f: impl FnOnce()) {
    let _world = WORLD.lock().unwrap_or_else(|e| e.into_inner());
    let main: ThreadRef = Arc::new(ThreadControl::new(1, "main", PRI_DEFAULT));
    {
        let mut g = inner();
        g.current = Some(main.clone());
        g.ready.clear();
        g.joiners.clear();
        g.policy = Policy::Donation;
        g.next_id = 2;
        main.set_state(ThreadState::Running);
    }

    let result = panic::catch_unwind(AssertUnwindSafe(f));

    {
        let mut g = inner();
        g.current = None;
        g.ready.clear();
        g.joiners.clear();
    }
    if let Err(payload) = result {
        panic::resume_unwind(payload);
    }
}

/// Handle to a spawned simulated thread.
pub struct JoinHandle {
    thread: ThreadRef,
}

impl JoinHandle {
    /// The spawned thread's control block, for state and priority
    /// assertions.
    pub fn thread(&self) -> &ThreadRef {
        &self.thread
    }

    /// Blocks the calling simulated thread until the spawned one exits.
    pub fn join(self) {
        let me = {
            let mut g = inner();
            if self.thread.state() == ThreadState::Exited {
                return;
            }
            let me = g.current.take().expect("sim: join outside sim::run");
            assert!(
                !Arc::ptr_eq(&me, &self.thread),
                "sim: a thread cannot join itself"
            );
            me.set_state(ThreadState::Blocked);
            g.joiners.push((self.thread.id(), me.clone()));
            dispatch(&mut g);
            me
        };
        wait_for_cpu(&me);
    }
}

/// Spawns a simulated thread. Preempts the spawner when the new thread
/// outranks it, as the kernel scheduler would.
pub fn spawn<F>(name: &str, priority: Priority, f: F) -> JoinHandle
where
    F: FnOnce() + Send + 'static,
{
    let tcb: ThreadRef = {
        let mut g = inner();
        assert!(g.current.is_some(), "sim: spawn outside sim::run");
        let id = g.next_id;
        g.next_id += 1;
        let tcb: ThreadRef = Arc::new(ThreadControl::new(id, name, priority));
        g.ready.push(tcb.clone());
        tcb
    };

    let worker = tcb.clone();
    thread::spawn(move || {
        wait_for_cpu(&worker);
        f();
        exit_current();
    });

    preempt_if_outranked();
    JoinHandle { thread: tcb }
}

fn exit_current() {
    let mut g = inner();
    let me = g.current.take().expect("sim: exiting thread is not current");
    me.set_state(ThreadState::Exited);
    let mut i = 0;
    while i < g.joiners.len() {
        if g.joiners[i].0 == me.id() {
            let (_, joiner) = g.joiners.remove(i);
            if joiner.state() == ThreadState::Blocked {
                joiner.set_state(ThreadState::Ready);
                g.ready.push(joiner);
            }
        } else {
            i += 1;
        }
    }
    dispatch(&mut g);
    // The OS thread ends here; the processor has already moved on.
}

/// The calling simulated thread.
pub fn current() -> ThreadRef {
    <SimSched as SchedIf>::current()
}

/// Voluntary reschedule point, for yield-injection in stress tests.
pub fn yield_now() {
    <SimSched as SchedIf>::yield_now();
}

/// Sets the calling thread's base priority (the simulated equivalent of a
/// thread adjusting its own priority), rescheduling if it is no longer the
/// highest.
pub fn set_current_priority(priority: Priority) {
    let me = current();
    <SimSched as SchedIf>::set_priority(me, priority);
}

/// Selects the active scheduling policy for the current world.
pub fn set_policy(policy: Policy) {
    inner().policy = policy;
}

/// Runs `f` with the calling thread flagged as being in interrupt context:
/// blocking operations become fatal, non-blocking ones stay legal.
pub fn with_irq_context<R>(f: impl FnOnce() -> R) -> R {
    struct Reset;
    impl Drop for Reset {
        fn drop(&mut self) {
            IN_IRQ.with(|c| c.set(false));
        }
    }
    IN_IRQ.with(|c| c.set(true));
    let _reset = Reset;
    f()
}
