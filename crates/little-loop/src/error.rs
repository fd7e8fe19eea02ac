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

//! This module contains the error types surfaced by the event loop and by its tasks.

use crate::core::task::Id as TaskId;
use thiserror::Error;

/// Errors returned when driving an `EventLoop` or scheduling work onto it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The loop has been closed; closed is terminal and no task may be scheduled or run on it.
    #[error("event loop is closed")]
    Closed,
    /// The entry task of `run_until_complete` did not produce a value.
    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Represents a failure captured at a task boundary. It is stored once in the task and handed to
/// every awaiter, which is why it is cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The coroutine panicked while being polled.
    #[error("task {id} panicked: {message}")]
    Panicked { id: TaskId, message: String },
    /// The task was cancelled before it could complete.
    #[error("task {id} was cancelled")]
    Cancelled { id: TaskId },
}

impl TaskError {
    /// Returns the identifier of the task which failed.
    pub fn id(&self) -> TaskId {
        match self {
            Self::Panicked { id, .. } | Self::Cancelled { id } => *id,
        }
    }

    /// Returns true if the failure is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns true if the failure is a captured panic.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }
}

/// Returned by `Timeout` when the deadline elapsed before the inner future completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline has elapsed")]
pub struct Elapsed(pub(crate) ());
