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

//! This module contains the timer futures of the event loop.

use crate::runtime::Handle;
use pin_project::pin_project;
use std::{cell, fmt, future, pin, rc, task, time};

pub use crate::error::Elapsed;

/// A future that completes once the loop's clock reaches a deadline. Created by
/// [`Handle::sleep`] and [`Handle::sleep_until`].
///
/// A sleep is always a suspension point: the first poll registers a timer and suspends, even if
/// the deadline has already passed. Dropping the sleep cancels its timer.
pub struct Sleep {
    handle: Handle,
    deadline: time::Instant,
    /// Cancellation flag shared with the timer queue, present once the timer is registered.
    registration: Option<rc::Rc<cell::Cell<bool>>>,
}

impl Sleep {
    pub(crate) fn new(handle: Handle, deadline: time::Instant) -> Self {
        Self {
            handle,
            deadline,
            registration: None,
        }
    }

    pub fn deadline(&self) -> time::Instant {
        self.deadline
    }

    /// Returns true if the loop's clock has reached the deadline.
    pub fn is_elapsed(&self) -> bool {
        self.handle.now() >= self.deadline
    }
}

impl future::Future for Sleep {
    type Output = ();

    fn poll(mut self: pin::Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Self::Output> {
        let this = &mut *self;
        if this.registration.is_none() {
            let cancelled = rc::Rc::new(cell::Cell::new(false));
            this.handle
                .scheduler
                .register_timer(this.deadline, cx.waker().clone(), cancelled.clone());
            this.registration = Some(cancelled);
            return task::Poll::Pending;
        }
        if this.is_elapsed() {
            task::Poll::Ready(())
        } else {
            task::Poll::Pending
        }
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(cancelled) = &self.registration {
            cancelled.set(true);
        }
    }
}

impl fmt::Debug for Sleep {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Sleep")
            .field("deadline", &self.deadline)
            .field("registered", &self.registration.is_some())
            .finish()
    }
}

/// A future bounding another one by a deadline. Created by [`Handle::timeout`].
///
/// Resolves to `Ok` with the inner output if the inner future completes first, or to
/// `Err(Elapsed)` once the deadline passes, in which case the inner future is dropped. Bounding a
/// `TaskHandle` only abandons the wait: the task itself keeps running.
#[pin_project]
pub struct Timeout<F> {
    #[pin]
    future: F,
    #[pin]
    sleep: Sleep,
}

impl<F> Timeout<F> {
    pub(crate) fn new(future: F, sleep: Sleep) -> Self {
        Self { future, sleep }
    }

    /// Returns a reference to the inner future.
    pub fn get_ref(&self) -> &F {
        &self.future
    }

    /// Consumes the `Timeout`, returning the inner future.
    pub fn into_inner(self) -> F {
        self.future
    }
}

impl<F> future::Future for Timeout<F>
where
    F: future::Future,
{
    type Output = Result<F::Output, Elapsed>;

    fn poll(self: pin::Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Self::Output> {
        let this = self.project();
        if let task::Poll::Ready(output) = this.future.poll(cx) {
            return task::Poll::Ready(Ok(output));
        }
        match this.sleep.poll(cx) {
            task::Poll::Ready(()) => task::Poll::Ready(Err(Elapsed(()))),
            task::Poll::Pending => task::Poll::Pending,
        }
    }
}

impl<F> fmt::Debug for Timeout<F> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Timeout")
            .field("sleep", &self.sleep)
            .finish()
    }
}
