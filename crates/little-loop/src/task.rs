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

//! This module contains the public face of tasks: handles to await or inspect them, batch
//! awaiting, and voluntary yielding.

use crate::core::task::Shared;
use crate::error::TaskError;
use crate::utils::maybe_done::{maybe_done, MaybeDone};
use std::{fmt, future, pin, rc, task};

pub use crate::core::task::Id;

/// A handle to a task scheduled on an `EventLoop`.
///
/// Awaiting the handle suspends the caller until the task finishes and then yields its stored
/// outcome. The outcome is kept, so a handle can be cloned and awaited any number of times; the
/// task itself runs exactly once. Dropping every handle does not cancel the task.
pub struct TaskHandle<T> {
    shared: rc::Rc<Shared<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(shared: rc::Rc<Shared<T>>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> Id {
        self.shared.id()
    }

    /// Returns true once the task completed, failed, or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.shared.is_finished()
    }

    /// Requests the cancellation of the task. The coroutine is dropped at its next scheduling
    /// pass without being resumed, and the task completes with `TaskError::Cancelled`. A task
    /// cancelling itself completes as cancelled even if its current poll returns a value.
    ///
    /// Returns false if the task has already finished.
    pub fn cancel(&self) -> bool {
        self.shared.request_cancel()
    }

    /// Returns the failure of the task, if it finished with one. This counts as observing it.
    pub fn error(&self) -> Option<TaskError> {
        let result = self.shared.result()?;
        self.shared.observe();
        result.as_ref().err().cloned()
    }
}

impl<T: Clone> TaskHandle<T> {
    /// Returns the outcome of the task without suspending, or `None` if it is still pending.
    /// This counts as observing it.
    pub fn result(&self) -> Option<Result<T, TaskError>> {
        let result = self.shared.result()?;
        self.shared.observe();
        Some(result.clone())
    }
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone> future::Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(self: pin::Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Self::Output> {
        match self.shared.result() {
            Some(result) => {
                self.shared.observe();
                task::Poll::Ready(result.clone())
            }
            None => {
                self.shared.register(cx.waker());
                task::Poll::Pending
            }
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Awaits every task of `handles` and collects their values in the same order.
///
/// The returned future completes only once every member has finished. If any member failed, it
/// resolves to the failure of the first failed member in `handles` order. Members are never
/// cancelled on behalf of a failing sibling.
pub fn gather<T, I>(handles: I) -> Gather<T>
where
    T: Clone,
    I: IntoIterator<Item = TaskHandle<T>>,
{
    Gather {
        members: handles.into_iter().map(maybe_done).collect(),
    }
}

/// Future returned by [`gather`].
pub struct Gather<T: Clone> {
    members: Vec<MaybeDone<TaskHandle<T>>>,
}

impl<T: Clone> future::Future for Gather<T> {
    type Output = Result<Vec<T>, TaskError>;

    fn poll(mut self: pin::Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Self::Output> {
        let mut all_done = true;
        for member in self.members.iter_mut() {
            if pin::Pin::new(member).poll(cx).is_pending() {
                all_done = false;
            }
        }
        if !all_done {
            return task::Poll::Pending;
        }
        let outputs = self
            .members
            .iter_mut()
            .filter_map(|member| pin::Pin::new(member).take_output());
        task::Poll::Ready(outputs.collect())
    }
}

impl<T: Clone> fmt::Debug for Gather<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Gather")
            .field("members", &self.members.len())
            .finish()
    }
}

/// A future that yields execution back to the loop exactly once.
struct YieldOnce(bool);

impl future::Future for YieldOnce {
    type Output = ();

    fn poll(mut self: pin::Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Self::Output> {
        if self.0 {
            return task::Poll::Ready(());
        }
        self.0 = true;
        cx.waker().wake_by_ref();
        task::Poll::Pending
    }
}

/// Yields execution back to the loop. The caller goes to the back of the ready queue, so every
/// task that was already ready runs before it resumes.
pub async fn yield_now() {
    YieldOnce(false).await
}
