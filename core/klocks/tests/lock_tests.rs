// SPDX-License-Identifier: Apache-2.0

//! Lock and priority-donation scenarios on the simulation scheduler.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use klocks::{DONATION_DEPTH_LIMIT, Lock, Priority, Semaphore, sim};

#[test]
fn mutual_exclusion_under_yield_storm() {
    sim::run(|| {
        fastrand::seed(0xC0FFEE);
        let lock = Lock::new();
        let in_critical = Arc::new(AtomicBool::new(false));
        let entries = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|i| {
                let lock = lock.clone();
                let in_critical = in_critical.clone();
                let entries = entries.clone();
                sim::spawn(&format!("worker{i}"), klocks::PRI_DEFAULT, move || {
                    for _ in 0..8 {
                        lock.acquire();
                        assert!(
                            !in_critical.swap(true, Ordering::SeqCst),
                            "two threads inside the critical section"
                        );
                        for _ in 0..fastrand::usize(0..3) {
                            sim::yield_now();
                        }
                        in_critical.store(false, Ordering::SeqCst);
                        entries.fetch_add(1, Ordering::SeqCst);
                        lock.release();
                        sim::yield_now();
                    }
                })
            })
            .collect();

        for w in workers {
            w.join();
        }
        assert_eq!(entries.load(Ordering::SeqCst), 32);
        assert!(!lock.held_by_current());
    });
}

#[test]
fn contended_acquire_donates_priority() {
    sim::run(|| {
        let lock = Lock::new();
        let observed = Arc::new(Mutex::new(Vec::new()));

        let holder = {
            let lock = lock.clone();
            let observed = observed.clone();
            sim::spawn("holder", 40, move || {
                lock.acquire();
                // Drop below main so main can spawn the contender while the
                // lock is held.
                sim::set_current_priority(20);
                // Running again: the contender has donated by now.
                let me = sim::current();
                observed
                    .lock()
                    .unwrap()
                    .push(("while holding", me.effective_priority(), me.is_donated()));
                lock.release();
                observed
                    .lock()
                    .unwrap()
                    .push(("after release", me.effective_priority(), me.is_donated()));
            })
        };

        let contender = {
            let lock = lock.clone();
            let observed = observed.clone();
            sim::spawn("contender", 50, move || {
                lock.acquire();
                observed.lock().unwrap().push((
                    "contender acquired",
                    sim::current().effective_priority(),
                    false,
                ));
                lock.release();
            })
        };

        holder.join();
        contender.join();

        assert_eq!(
            *observed.lock().unwrap(),
            [
                ("while holding", 50, true),
                ("contender acquired", 50, false),
                ("after release", 20, false),
            ]
        );
    });
}

#[test]
fn release_recomputes_from_remaining_locks() {
    sim::run(|| {
        let lock_a = Lock::new();
        let lock_b = Lock::new();
        lock_a.acquire();
        lock_b.acquire();

        let spawn_contender = |name: &'static str, prio, lock: &Lock| {
            let lock = lock.clone();
            sim::spawn(name, prio, move || {
                lock.acquire();
                lock.release();
            })
        };
        // Each contender outranks main, donates, and blocks.
        let a = spawn_contender("wants_a", 45, &lock_a);
        let b = spawn_contender("wants_b", 50, &lock_b);

        let me = sim::current();
        assert_eq!(me.effective_priority(), 50);
        assert!(me.is_donated());

        // Releasing B must fall back to A's donation, not to base.
        lock_b.release();
        assert_eq!(me.effective_priority(), 45);
        assert!(me.is_donated());

        lock_a.release();
        assert_eq!(me.effective_priority(), klocks::PRI_DEFAULT);
        assert!(!me.is_donated());

        a.join();
        b.join();
    });
}

#[test]
fn donation_chain_is_depth_bounded() {
    sim::run(|| {
        let n = DONATION_DEPTH_LIMIT + 2;
        let locks: Vec<Lock> = (0..n).map(|_| Lock::new()).collect();
        let park = Arc::new(Semaphore::new(0));

        // link i holds locks[i] and blocks acquiring locks[i + 1]; the last
        // link parks so the chain stays in place while we measure.
        let mut links = Vec::new();
        for i in (0..n).rev() {
            let held = locks[i].clone();
            let next = locks.get(i + 1).cloned();
            let park = park.clone();
            links.push(sim::spawn(&format!("link{i}"), 40, move || {
                held.acquire();
                match next {
                    Some(next) => {
                        next.acquire();
                        next.release();
                    }
                    None => park.down(),
                }
                held.release();
            }));
        }

        let donor = {
            let front = locks[0].clone();
            sim::spawn("donor", 60, move || {
                front.acquire();
                front.release();
            })
        };

        // The walk covers exactly DONATION_DEPTH_LIMIT hops from the front
        // of the chain; links beyond it keep their own priority.
        for (i, lock) in locks.iter().enumerate() {
            let holder = lock.holder().expect("every link holds its lock");
            let expected: Priority = if i < DONATION_DEPTH_LIMIT { 60 } else { 40 };
            assert_eq!(holder.effective_priority(), expected, "link {i}");
        }

        park.up();
        for link in links {
            link.join();
        }
        donor.join();
    });
}

#[test]
fn rate_based_policy_skips_donation() {
    sim::run(|| {
        sim::set_policy(sim::Policy::RateBased);
        let lock = Lock::new();
        let held_seen = Arc::new(AtomicBool::new(false));

        let holder = {
            let lock = lock.clone();
            let held_seen = held_seen.clone();
            sim::spawn("holder", 40, move || {
                lock.acquire();
                // Ownership bookkeeping stays on under every policy.
                held_seen.store(lock.held_by_current(), Ordering::SeqCst);
                sim::set_current_priority(20);
                lock.release();
            })
        };

        let contender = {
            let lock = lock.clone();
            sim::spawn("contender", 50, move || {
                lock.acquire();
                lock.release();
            })
        };

        // The contender is blocked on the lock, yet the holder keeps its own
        // priority.
        assert_eq!(holder.thread().effective_priority(), 20);
        assert!(!holder.thread().is_donated());
        assert!(held_seen.load(Ordering::SeqCst));

        holder.join();
        contender.join();
    });
}

#[test]
fn ceiling_resets_on_release_under_any_policy() {
    sim::run(|| {
        let lock_a = Lock::new();
        let lock_b = Lock::new();
        lock_a.acquire();

        // Contention under the donation policy sets A's ceiling to 50.
        let contender = {
            let lock_a = lock_a.clone();
            sim::spawn("contender", 50, move || {
                lock_a.acquire();
                lock_a.release();
            })
        };
        let me = sim::current();
        assert_eq!(me.effective_priority(), 50);

        // The release happens under the rate-based policy; it must still
        // clear A's ceiling.
        sim::set_policy(sim::Policy::RateBased);
        lock_a.release();
        contender.join();

        // Back under donation, A is uncontended: releasing B recomputes
        // from the held set and must land on base, not on a stale ceiling.
        sim::set_policy(sim::Policy::Donation);
        lock_a.acquire();
        lock_b.acquire();
        lock_b.release();
        assert_eq!(me.effective_priority(), klocks::PRI_DEFAULT);
        assert!(!me.is_donated());
        lock_a.release();
    });
}

#[test]
fn try_acquire_never_blocks_or_donates() {
    sim::run(|| {
        let lock = Lock::new();
        lock.acquire();

        let h = {
            let lock = lock.clone();
            sim::spawn("prober", 50, move || {
                assert!(!lock.try_acquire());
            })
        };
        h.join();

        // The failed probe left no donation behind.
        let me = sim::current();
        assert!(!me.is_donated());
        assert_eq!(me.effective_priority(), klocks::PRI_DEFAULT);
        lock.release();

        assert!(lock.try_acquire());
        assert!(lock.held_by_current());
        lock.release();
    });
}

#[test]
#[should_panic(expected = "already holds")]
fn reacquiring_a_held_lock_is_fatal() {
    sim::run(|| {
        let lock = Lock::new();
        lock.acquire();
        lock.acquire();
    });
}

#[test]
#[should_panic(expected = "does not hold")]
fn releasing_an_unheld_lock_is_fatal() {
    sim::run(|| {
        Lock::new().release();
    });
}

#[test]
#[should_panic(expected = "interrupt context")]
fn acquire_in_interrupt_context_is_fatal() {
    sim::run(|| {
        let lock = Lock::new();
        sim::with_irq_context(|| lock.acquire());
    });
}
