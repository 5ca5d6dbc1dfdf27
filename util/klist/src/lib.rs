// SPDX-License-Identifier: Apache-2.0

//! A list kept sorted by a caller-supplied key, used for kernel wait queues.
//!
//! Wait queues in the synchronization layer are small (bounded by the number
//! of contending threads) and are always mutated inside a non-preemptible
//! critical section, so a plain `Vec` with ordered insertion beats anything
//! with per-node allocation. Keys are extracted per call rather than stored:
//! the same element type may be queued under different orderings, and the key
//! (a thread's priority) can change while the element sits in some *other*
//! container.
//!
//! Ordering discipline: [`SortedList::insert_desc_by_key`] keeps the list in
//! descending key order and places new elements *after* existing equal keys,
//! so equal-priority entries drain FIFO.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::vec::Vec;

mod tests;

/// A vector kept in descending key order by its insertion method.
///
/// The list itself stores no comparator; every ordered insertion names its
/// key extractor explicitly.
pub struct SortedList<T> {
    items: Vec<T>,
}

impl<T> SortedList<T> {
    /// Creates an empty list.
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Inserts `value` keeping the list in descending order of `key`.
    ///
    /// Among equal keys the new element goes last, so equal-priority
    /// elements leave the queue in arrival order.
    pub fn insert_desc_by_key<K: Ord>(&mut self, value: T, key: impl Fn(&T) -> K) {
        let k = key(&value);
        let pos = self
            .items
            .iter()
            .position(|it| key(it) < k)
            .unwrap_or(self.items.len());
        self.items.insert(pos, value);
    }

    /// Returns a reference to the first (highest-key) element.
    pub fn front(&self) -> Option<&T> {
        self.items.first()
    }

    /// Returns a reference to the last (lowest-key) element.
    pub fn back(&self) -> Option<&T> {
        self.items.last()
    }

    /// Removes and returns the first (highest-key) element.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    /// Removes and returns the last (lowest-key) element.
    pub fn pop_back(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Removes and returns the first element matching `pred`.
    pub fn remove_first(&mut self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let pos = self.items.iter().position(|it| pred(it))?;
        Some(self.items.remove(pos))
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of queued elements.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Iterates from highest to lowest key.
    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> Default for SortedList<T> {
    fn default() -> Self {
        Self::new()
    }
}
