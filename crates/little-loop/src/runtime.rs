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

//! This module contains the implementation of a single threaded cooperative event loop and of the
//! `Handle` through which coroutines reach it.

use crate::core::scheduler::{Scheduler, Status};
use crate::error::{Error, TaskError};
use crate::task::TaskHandle;
use crate::time::{Sleep, Timeout};
use std::{cell, fmt, future, rc, time};

/// Represents the lifecycle of an `EventLoop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// The loop exists but is not driving tasks right now. Tasks may be spawned; they start on the
    /// next run.
    Idle,
    /// The loop is inside `run_until_complete`.
    Running,
    /// The loop has been closed. This state is terminal.
    Closed,
}

/// Selects how an `EventLoop` measures time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockSource {
    /// Real time: sleeping tasks are waited for.
    #[default]
    System,
    /// Simulated time: the clock stands still while tasks run and jumps to the next timer when
    /// every task is suspended. Useful for deterministic tests.
    Virtual,
}

/// Holds the settings an `EventLoop` is built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub clock: ClockSource,
    /// A single poll taking at least this long is reported with a `warn` event. `None` disables
    /// the report.
    pub slow_poll_threshold: Option<time::Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clock: ClockSource::System,
            slow_poll_threshold: Some(time::Duration::from_millis(100)),
        }
    }
}

/// Builder for configuring and creating an `EventLoop`.
///
/// ```
/// use std::time::Duration;
///
/// let event_loop = little_loop::EventLoop::builder()
///     .virtual_clock()
///     .slow_poll_threshold(Duration::from_millis(50))
///     .build();
/// assert_eq!(event_loop.state(), little_loop::State::Idle);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    /// Creates a new `Builder` with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Measures time with a virtual clock.
    pub fn virtual_clock(mut self) -> Self {
        self.config.clock = ClockSource::Virtual;
        self
    }

    /// Measures time with the given clock.
    pub fn clock(mut self, clock: ClockSource) -> Self {
        self.config.clock = clock;
        self
    }

    /// Reports polls taking at least `threshold`.
    pub fn slow_poll_threshold(mut self, threshold: time::Duration) -> Self {
        self.config.slow_poll_threshold = Some(threshold);
        self
    }

    /// Never reports slow polls.
    pub fn disable_slow_poll_warnings(mut self) -> Self {
        self.config.slow_poll_threshold = None;
        self
    }

    /// Builds an idle `EventLoop` with the configured options.
    pub fn build(self) -> EventLoop {
        EventLoop::with_config(self.config)
    }
}

/// The Little Loop event loop, which drives tasks on the current thread.
///
/// The loop starts `Idle`, is `Running` for the duration of each `run_until_complete` call, and
/// becomes `Closed` on `close` (or drop). A closed loop refuses any further work.
pub struct EventLoop {
    scheduler: rc::Rc<Scheduler>,
}

impl EventLoop {
    /// Creates an idle loop with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an idle loop with the given `config`.
    pub fn with_config(config: Config) -> Self {
        Self {
            scheduler: rc::Rc::new(Scheduler::new(config)),
        }
    }

    /// Returns a `Builder` to configure a new loop.
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Returns a `Handle` to this loop.
    pub fn handle(&self) -> Handle {
        Handle {
            scheduler: self.scheduler.clone(),
        }
    }

    pub fn state(&self) -> State {
        self.scheduler.state()
    }

    /// Returns the time elapsed on the loop's clock since the loop was created.
    pub fn time(&self) -> time::Duration {
        self.scheduler.elapsed()
    }

    /// Runs `entry` as the entry task and drives every task of the loop until the entry task
    /// completes. Other tasks still pending at that point stay suspended until the next run or
    /// until `close`.
    ///
    /// Fails with `Error::Closed` on a closed loop, and with `Error::Task` if the entry task
    /// panicked.
    pub fn run_until_complete<F>(&mut self, entry: F) -> Result<F::Output, Error>
    where
        F: future::Future + 'static,
        F::Output: 'static,
    {
        let slot = rc::Rc::new(cell::RefCell::new(None));
        let output = slot.clone();
        let main = self.scheduler.spawn(async move {
            let value = entry.await;
            *output.borrow_mut() = Some(value);
        })?;
        main.observe();

        self.scheduler.set_state(State::Running);
        let _span = tracing::debug_span!("run_until_complete", entry = %main.id()).entered();
        loop {
            self.scheduler.fire_timers();
            for id in self.scheduler.scheduled_ids() {
                self.scheduler.poll(id);
            }
            if main.is_finished() {
                break;
            }
            match self.scheduler.status() {
                Status::RunningTasks => continue,
                Status::WaitingForEvents => self.scheduler.turn(),
                Status::Done => break,
            }
        }
        self.scheduler.set_state(State::Idle);

        if let Some(Err(error)) = main.result() {
            return Err(Error::Task(error.clone()));
        }
        let value = slot.borrow_mut().take();
        value.ok_or(Error::Task(TaskError::Cancelled { id: main.id() }))
    }

    /// Closes the loop. Every pending task is cancelled and dropped, timers are released, and the
    /// failure of each task nobody awaited or inspected is reported with a `warn` event. Closing
    /// an already closed loop does nothing.
    pub fn close(&mut self) {
        if self.state() == State::Closed {
            return;
        }
        self.scheduler.shutdown();
    }

    /// Returns the failures of finished tasks which were neither awaited nor inspected.
    pub fn unobserved_failures(&self) -> Vec<TaskError> {
        self.scheduler.unobserved_failures()
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("EventLoop")
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

/// A cheap cloneable reference to an `EventLoop`, handed explicitly to coroutines which need to
/// spawn tasks, sleep, or read the clock.
#[derive(Clone)]
pub struct Handle {
    pub(crate) scheduler: rc::Rc<Scheduler>,
}

impl Handle {
    /// Schedules `future` as a new task and returns its handle immediately. None of the
    /// coroutine's logic runs before the loop's next pass.
    pub fn spawn<F>(&self, future: F) -> Result<TaskHandle<F::Output>, Error>
    where
        F: future::Future + 'static,
        F::Output: 'static,
    {
        self.scheduler.spawn(future).map(TaskHandle::new)
    }

    /// Returns a future which completes once `duration` has elapsed on the loop's clock.
    pub fn sleep(&self, duration: time::Duration) -> Sleep {
        Sleep::new(self.clone(), self.deadline_after(duration))
    }

    /// Returns a future which completes once the loop's clock reaches `deadline`.
    pub fn sleep_until(&self, deadline: time::Instant) -> Sleep {
        Sleep::new(self.clone(), deadline)
    }

    /// Bounds `future` by `duration`. The inner future is dropped if the deadline elapses first.
    pub fn timeout<F>(&self, duration: time::Duration, future: F) -> Timeout<F>
    where
        F: future::Future,
    {
        Timeout::new(future, self.sleep(duration))
    }

    /// Returns the current instant of the loop's clock.
    pub fn now(&self) -> time::Instant {
        self.scheduler.now()
    }

    /// Returns the time elapsed on the loop's clock since the loop was created.
    pub fn time(&self) -> time::Duration {
        self.scheduler.elapsed()
    }

    pub fn state(&self) -> State {
        self.scheduler.state()
    }

    /// Returns `now + duration`, saturating at a deadline far enough to never be reached.
    fn deadline_after(&self, duration: time::Duration) -> time::Instant {
        let now = self.now();
        now.checked_add(duration).unwrap_or_else(|| now + FAR_FUTURE)
    }
}

/// Roughly 30 years.
const FAR_FUTURE: time::Duration = time::Duration::from_secs(86400 * 365 * 30);

impl fmt::Debug for Handle {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Handle")
            .field("state", &self.state())
            .finish()
    }
}
