// Copyright 2024 Shingo OKAWA and a number of other contributors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! This module contains the implementation of the timer queue which backs the "elapsed delay"
//! wait condition.

use std::{cell, cmp, collections, rc, task, time};

/// An entry in the timer queue, i.e., a scheduled wake-up at a specific deadline.
pub(crate) struct Entry {
    deadline: time::Instant,
    /// Breaks ties between equal deadlines so that timers fire in registration order.
    seq: u64,
    waker: task::Waker,
    /// Set by the owning `Sleep` once it is no longer interested in the wake-up.
    cancelled: rc::Rc<cell::Cell<bool>>,
}

impl Eq for Entry {}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for Entry {
    /// The comparison is reversed so that the `BinaryHeap` pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A min-heap of timers ordered by deadline.
#[derive(Default)]
pub(crate) struct Timers {
    heap: collections::BinaryHeap<Entry>,
    next_seq: u64,
}

impl Timers {
    /// Schedules `waker` to be woken once `deadline` has been reached, unless `cancelled` gets set.
    pub(crate) fn insert(
        &mut self,
        deadline: time::Instant,
        waker: task::Waker,
        cancelled: rc::Rc<cell::Cell<bool>>,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            deadline,
            seq,
            waker,
            cancelled,
        });
    }

    /// Returns the earliest deadline still of interest, discarding cancelled entries on the way.
    pub(crate) fn next_deadline(&mut self) -> Option<time::Instant> {
        while let Some(entry) = self.heap.peek() {
            if !entry.cancelled.get() {
                return Some(entry.deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Removes every entry whose deadline is not after `now` and returns the wakers of those which
    /// were not cancelled, earliest first. The caller wakes them once it no longer borrows `self`.
    pub(crate) fn expire(&mut self, now: time::Instant) -> Vec<task::Waker> {
        let mut expired = Vec::new();
        while let Some(entry) = self.heap.peek() {
            if entry.deadline > now {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                if !entry.cancelled.get() {
                    expired.push(entry.waker);
                }
            }
        }
        expired
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::Id as TaskId;
    use crate::core::waker::{Notifier, ReadyQueue};
    use std::sync;

    fn flag() -> rc::Rc<cell::Cell<bool>> {
        rc::Rc::new(cell::Cell::new(false))
    }

    #[test]
    fn expires_earliest_first_and_keeps_the_rest() {
        let queue = sync::Arc::new(ReadyQueue::default());
        let mut ids = TaskId::default();
        let (first, second, third) = (ids.increment(), ids.increment(), ids.increment());
        let origin = time::Instant::now();
        let mut timers = Timers::default();
        timers.insert(
            origin + time::Duration::from_secs(2),
            Notifier::waker(first, queue.clone()),
            flag(),
        );
        timers.insert(
            origin + time::Duration::from_secs(1),
            Notifier::waker(second, queue.clone()),
            flag(),
        );
        timers.insert(
            origin + time::Duration::from_secs(1),
            Notifier::waker(third, queue.clone()),
            flag(),
        );
        assert_eq!(
            timers.next_deadline(),
            Some(origin + time::Duration::from_secs(1))
        );

        for waker in timers.expire(origin + time::Duration::from_secs(1)) {
            waker.wake();
        }
        assert_eq!(Vec::from(queue.drain()), vec![second, third]);
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn cancelled_entries_never_fire() {
        let queue = sync::Arc::new(ReadyQueue::default());
        let origin = time::Instant::now();
        let cancelled = flag();
        let mut timers = Timers::default();
        timers.insert(
            origin,
            Notifier::waker(TaskId::default(), queue.clone()),
            cancelled.clone(),
        );
        cancelled.set(true);
        assert_eq!(timers.next_deadline(), None);
        assert!(timers.expire(origin).is_empty());
        assert!(queue.is_empty());
    }
}
