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

//! This module contains the implementation of the ready queue and of the vtable for dispatching
//! methods on `Waker`.

use crate::core::task::Id as TaskId;
use std::{collections, mem, sync, task, time};

/// Holds the identifiers of `Task`s ready to be polled. Wakers are `Send + Sync`, so this is the
/// one structure of the runtime which may be reached from another thread; a wake coming from
/// there unparks the loop through the `Condvar`.
#[derive(Default)]
pub(crate) struct ReadyQueue {
    ids: sync::Mutex<collections::VecDeque<TaskId>>,
    signal: sync::Condvar,
}

impl ReadyQueue {
    /// Appends `id` to the back of the queue.
    pub(crate) fn push(&self, id: TaskId) {
        self.lock().push_back(id);
        self.signal.notify_one();
    }

    /// Takes every queued identifier, in wake order.
    pub(crate) fn drain(&self) -> collections::VecDeque<TaskId> {
        mem::take(&mut *self.lock())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Blocks the current thread until an identifier gets pushed or the `timeout` elapses.
    /// Returns immediately if the queue is not empty.
    pub(crate) fn park(&self, timeout: Option<time::Duration>) {
        let ids = self.lock();
        if !ids.is_empty() {
            return;
        }
        match timeout {
            Some(timeout) => {
                let (ids, _) = self
                    .signal
                    .wait_timeout(ids, timeout)
                    .unwrap_or_else(sync::PoisonError::into_inner);
                mem::drop(ids);
            }
            None => {
                let ids = self
                    .signal
                    .wait(ids)
                    .unwrap_or_else(sync::PoisonError::into_inner);
                mem::drop(ids);
            }
        }
    }

    fn lock(&self) -> sync::MutexGuard<'_, collections::VecDeque<TaskId>> {
        self.ids.lock().unwrap_or_else(sync::PoisonError::into_inner)
    }
}

/// Represents the data behind a `Waker`: the task to re-queue and the queue to push it to.
pub(crate) struct Notifier {
    id: TaskId,
    queue: sync::Arc<ReadyQueue>,
}

impl Notifier {
    /// Creates a `Waker` which pushes `id` onto `queue` when woken.
    pub(crate) fn waker(id: TaskId, queue: sync::Arc<ReadyQueue>) -> task::Waker {
        let data = sync::Arc::into_raw(sync::Arc::new(Self { id, queue }));
        // SAFETY:
        // The data pointer comes from `Arc::into_raw` and every vtable function below keeps the
        // strong count balanced. `Notifier` is `Send + Sync`.
        unsafe { task::Waker::from_raw(task::RawWaker::new(data as *const (), &VTABLE)) }
    }

    fn notify(&self) {
        self.queue.push(self.id);
    }
}

/// The wake-related vtable functions associated with a reference counted `Notifier`.
static VTABLE: task::RawWakerVTable = task::RawWakerVTable::new(clone, wake, wake_by_ref, drop);

/// This function will be called when the 'Waker' gets cloned; it bumps the strong count of the
/// `Notifier` and creates a new `RawWaker` sharing it.
///
/// SAFETY:
/// `data` must come from `Notifier::waker`.
unsafe fn clone(data: *const ()) -> task::RawWaker {
    sync::Arc::increment_strong_count(data as *const Notifier);
    task::RawWaker::new(data, &VTABLE)
}

/// This function will be called when `wake` is called on the `Waker`. It schedules the `Task`
/// and consumes the reference.
///
/// SAFETY:
/// `data` must come from `Notifier::waker`.
unsafe fn wake(data: *const ()) {
    let notifier = sync::Arc::from_raw(data as *const Notifier);
    notifier.notify();
}

/// This function will be called when `wake_by_ref` is called on the `Waker` and schedules the
/// `Task` without consuming the reference.
///
/// SAFETY:
/// `data` must come from `Notifier::waker`.
unsafe fn wake_by_ref(data: *const ()) {
    let notifier = &*(data as *const Notifier);
    notifier.notify();
}

/// This function gets called when a `Waker` gets dropped.
///
/// SAFETY:
/// `data` must come from `Notifier::waker`.
unsafe fn drop(data: *const ()) {
    mem::drop(sync::Arc::from_raw(data as *const Notifier));
}
