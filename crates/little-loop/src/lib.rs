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

//! This crate contains a minimal single threaded cooperative event loop for Rust `Future`s.
//!
//! A coroutine is any `Future`: it does nothing until it is polled, and it suspends wherever it
//! returns `Poll::Pending`. Spawning a coroutine on an [`EventLoop`] turns it into a task, which
//! the loop resumes each time its wait condition (an elapsed [`Sleep`](time::Sleep), a finished
//! [`TaskHandle`], or a [`yield_now`]) is satisfied. Only one task runs at any instant, and a task
//! never loses control except at its own suspension points.
//!
//! ```
//! use std::time::Duration;
//!
//! let mut event_loop = little_loop::EventLoop::builder().virtual_clock().build();
//! let handle = event_loop.handle();
//! let values = event_loop.run_until_complete(async move {
//!     let slow = handle.clone();
//!     let a = handle.spawn(async move {
//!         slow.sleep(Duration::from_secs(2)).await;
//!         "A done"
//!     })?;
//!     let fast = handle.clone();
//!     let b = handle.spawn(async move {
//!         fast.sleep(Duration::from_secs(1)).await;
//!         "B done"
//!     })?;
//!     Ok::<_, little_loop::Error>(little_loop::gather([a, b]).await?)
//! });
//! assert_eq!(values, Ok(Ok(vec!["A done", "B done"])));
//! assert_eq!(event_loop.time(), Duration::from_secs(2));
//! ```

mod core;
mod error;
mod runtime;
pub mod task;
pub mod time;
pub mod utils;

pub use crate::error::{Error, TaskError};
pub use crate::runtime::{Builder, ClockSource, Config, EventLoop, Handle, State};
pub use crate::task::{gather, yield_now, Id as TaskId, TaskHandle};
use std::future;

/// Runs the coroutine produced by `main` to completion on a new default loop, then closes the
/// loop. Tasks still pending once `main` completes are cancelled.
///
/// ```
/// let answer = little_loop::run(|handle| async move {
///     let task = handle.spawn(async { 6 * 7 })?;
///     Ok::<_, little_loop::Error>(task.await?)
/// });
/// assert_eq!(answer, Ok(Ok(42)));
/// ```
pub fn run<F, Fut>(main: F) -> Result<Fut::Output, Error>
where
    F: FnOnce(Handle) -> Fut,
    Fut: future::Future + 'static,
    Fut::Output: 'static,
{
    let mut event_loop = EventLoop::new();
    let output = event_loop.run_until_complete(main(event_loop.handle()));
    event_loop.close();
    output
}
