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

//! This module contains the implementation of `MaybeDone` combinator.

use pin_project::pin_project;
use std::{future, pin, task};

/// Represents a `Future` that may have done. Once the inner future completes its output is kept
/// in place until it is taken with [`MaybeDone::take_output`].
#[pin_project(project = MaybeDoneProj, project_replace = MaybeDoneProjReplace)]
pub enum MaybeDone<F>
where
    F: future::Future,
{
    Future(#[pin] F),
    Done(F::Output),
    Gone,
}

impl<F> MaybeDone<F>
where
    F: future::Future,
{
    /// Takes the output out of a completed `MaybeDone`. Returns `None` if the inner future has not
    /// completed yet or if the output was already taken.
    pub fn take_output(self: pin::Pin<&mut Self>) -> Option<F::Output> {
        if !matches!(&*self, Self::Done(_)) {
            return None;
        }
        match self.project_replace(Self::Gone) {
            MaybeDoneProjReplace::Done(output) => Some(output),
            _ => None,
        }
    }
}

impl<F> future::Future for MaybeDone<F>
where
    F: future::Future,
{
    type Output = ();

    fn poll(mut self: pin::Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Self::Output> {
        match self.as_mut().project() {
            MaybeDoneProj::Future(future) => {
                let output = ready!(future.poll(cx));
                self.set(Self::Done(output));
            }
            MaybeDoneProj::Done(_) => {}
            MaybeDoneProj::Gone => panic!("MaybeDone polled after value taken"),
        }
        task::Poll::Ready(())
    }
}

/// Wraps a `Future` into a `MaybeDone`.
pub fn maybe_done<F>(future: F) -> MaybeDone<F>
where
    F: future::Future,
{
    MaybeDone::Future(future)
}
