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

//! This module contains the implementation of a `Task` which represents the unit of
//! computation (state machine) of the `EventLoop`, i.e., a `Future` implementation, and of the
//! `Shared` completion cell through which `TaskHandle`s observe it.

use crate::error::TaskError;
use once_cell::unsync::OnceCell;
use std::{any, cell, fmt, future, panic, pin, rc, task};

/// Represents a `Task` of the `EventLoop`, defined as a heap-allocated and `Pin`ned instance of the `Future`.
/// Every spawned coroutine is wrapped into a `Harness` first, which erases its output type.
pub(crate) type Task = pin::Pin<Box<dyn future::Future<Output = ()>>>;

/// Specifies the identifier of a `Task`, which is defined as an `usize` number. Identifiers are
/// handed out in spawn order and never reused by the same loop.
#[derive(Default, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Id(usize);

impl Id {
    /// Returns the copy of the current `Id` and increments the internal `usize` value.
    pub(crate) fn increment(&mut self) -> Self {
        let ret = Self(self.0);
        self.0 += 1;
        ret
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.0)?;
        Ok(())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "#{}", self.0)?;
        Ok(())
    }
}

/// Holds the outcome of a `Task` together with everything needed to hand it out to awaiters.
/// The result slot is written exactly once; afterwards it is only ever read.
pub(crate) struct Shared<T> {
    id: Id,
    result: OnceCell<Result<T, TaskError>>,
    /// Wakers of the tasks currently suspended on this one.
    waiters: cell::RefCell<Vec<task::Waker>>,
    cancel_requested: cell::Cell<bool>,
    observed: cell::Cell<bool>,
    /// The waker which re-queues this very task.
    waker: task::Waker,
}

impl<T> Shared<T> {
    pub(crate) fn new(id: Id, waker: task::Waker) -> Self {
        Self {
            id,
            result: OnceCell::new(),
            waiters: cell::RefCell::new(Vec::new()),
            cancel_requested: cell::Cell::new(false),
            observed: cell::Cell::new(false),
            waker,
        }
    }

    pub(crate) fn id(&self) -> Id {
        self.id
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.result.get().is_some()
    }

    /// Returns the stored outcome, if any. Reading it does not mark it observed.
    pub(crate) fn result(&self) -> Option<&Result<T, TaskError>> {
        self.result.get()
    }

    /// Records that somebody has seen the outcome, which silences the shutdown diagnostic.
    pub(crate) fn observe(&self) {
        self.observed.set(true);
    }

    /// Registers the `waker` of a task suspended on this one.
    pub(crate) fn register(&self, waker: &task::Waker) {
        let mut waiters = self.waiters.borrow_mut();
        if !waiters.iter().any(|w| w.will_wake(waker)) {
            waiters.push(waker.clone());
        }
    }

    /// Asks for the task to be cancelled and re-queues it so that the request is honoured on
    /// the next pass. A request made by the task during its own poll wins over the value that
    /// poll returns. Returns false if the task has already finished.
    pub(crate) fn request_cancel(&self) -> bool {
        if self.is_finished() {
            return false;
        }
        self.cancel_requested.set(true);
        self.waker.wake_by_ref();
        true
    }

    /// Stores the outcome and wakes every waiter. The waiters are woken strictly after the value
    /// is in place, so nobody can observe the completion before it happened.
    fn complete(&self, outcome: Result<T, TaskError>) {
        if self.result.set(outcome).is_err() {
            return;
        }
        for waker in self.waiters.take() {
            waker.wake();
        }
    }
}

/// Type-erased view over a `Shared` cell, used by the scheduler which does not know the output
/// types of the tasks it drives.
pub(crate) trait Completion {
    /// Returns the identifier of the task.
    fn id(&self) -> Id;

    /// Returns the waker which re-queues the task.
    fn waker(&self) -> &task::Waker;

    /// Completes the task as cancelled if it has not finished yet.
    fn abort(&self);

    /// Returns the captured panic of the task, if it failed with one.
    fn panic(&self) -> Option<TaskError>;

    /// Returns true if somebody has seen the outcome of the task.
    fn is_observed(&self) -> bool;
}

impl<T> Completion for Shared<T> {
    fn id(&self) -> Id {
        self.id
    }

    fn waker(&self) -> &task::Waker {
        &self.waker
    }

    fn abort(&self) {
        self.complete(Err(TaskError::Cancelled { id: self.id }));
    }

    fn panic(&self) -> Option<TaskError> {
        match self.result.get() {
            Some(Err(error)) if error.is_panic() => Some(error.clone()),
            _ => None,
        }
    }

    fn is_observed(&self) -> bool {
        self.observed.get()
    }
}

/// Drives a coroutine on behalf of the scheduler and stores its outcome into the `Shared` cell.
/// The coroutine is dropped the moment it completes, panics, or is cancelled, so it can never
/// be resumed twice.
pub(crate) struct Harness<F>
where
    F: future::Future,
{
    future: Option<pin::Pin<Box<F>>>,
    shared: rc::Rc<Shared<F::Output>>,
}

impl<F> Harness<F>
where
    F: future::Future + 'static,
    F::Output: 'static,
{
    /// Wraps the given `future` into an erased `Task` reporting to `shared`.
    pub(crate) fn task(future: F, shared: rc::Rc<Shared<F::Output>>) -> Task {
        Box::pin(Self {
            future: Some(Box::pin(future)),
            shared,
        })
    }
}

impl<F> future::Future for Harness<F>
where
    F: future::Future,
{
    type Output = ();

    fn poll(mut self: pin::Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Self::Output> {
        let this = &mut *self;
        let id = this.shared.id;
        if this.shared.cancel_requested.get() {
            this.future = None;
            tracing::trace!(task = %id, "task cancelled");
            this.shared.complete(Err(TaskError::Cancelled { id }));
            return task::Poll::Ready(());
        }
        let Some(future) = this.future.as_mut() else {
            return task::Poll::Ready(());
        };
        let outcome = match panic::catch_unwind(panic::AssertUnwindSafe(|| future.as_mut().poll(cx))) {
            Ok(task::Poll::Pending) => return task::Poll::Pending,
            Ok(task::Poll::Ready(_)) if this.shared.cancel_requested.get() => {
                tracing::trace!(task = %id, "task cancelled while running");
                Err(TaskError::Cancelled { id })
            }
            Ok(task::Poll::Ready(output)) => Ok(output),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::trace!(task = %id, %message, "task panicked");
                Err(TaskError::Panicked { id, message })
            }
        };
        this.future = None;
        this.shared.complete(outcome);
        task::Poll::Ready(())
    }
}

/// Extracts a readable message out of a panic payload.
fn panic_message(payload: &(dyn any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
