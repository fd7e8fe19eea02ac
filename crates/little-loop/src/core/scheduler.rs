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

//! This module contains the implementation of a single threaded `Future` scheduler.

use crate::core::clock::Clock;
use crate::core::task::{Completion, Harness, Id as TaskId, Shared, Task};
use crate::core::timer::Timers;
use crate::core::waker::{Notifier, ReadyQueue};
use crate::error::{Error, TaskError};
use crate::runtime::{ClockSource, Config, State};
use std::{cell, collections, fmt, future, mem, rc, sync, task, time};

/// Represents the current status of a `Scheduler` instance.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    /// Specifies when some tasks are ready to be polled.
    RunningTasks,
    /// Specifies when every pending task is suspended and the loop has to wait for a timer or a wake.
    WaitingForEvents,
    /// Specifies when no task is pending anymore.
    Done,
}

impl fmt::Debug for Status {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunningTasks => write!(fmt, "Status::RunningTasks")?,
            Self::WaitingForEvents => write!(fmt, "Status::WaitingForEvents")?,
            Self::Done => write!(fmt, "Status::Done")?,
        }
        Ok(())
    }
}

/// A pending task together with the erased view over its completion cell.
struct Entry {
    task: Task,
    completion: rc::Rc<dyn Completion>,
}

/// The Little Loop scheduler which is responsible for managing polling tasks. It is owned by the
/// `EventLoop` and shared with every `Handle`; nothing about it is global.
pub(crate) struct Scheduler {
    config: Config,
    clock: Clock,
    state: cell::Cell<State>,
    /// Holds the next `Id` value which will be assigned to the next `Task`.
    next_id: cell::Cell<TaskId>,
    /// Holds the `Task`s to be polled on the loop.
    pending_tasks: cell::RefCell<collections::HashMap<TaskId, Entry>>,
    /// Holds the identifiers of `Task`s ready to be polled.
    ready: sync::Arc<ReadyQueue>,
    timers: cell::RefCell<Timers>,
    /// Finished tasks which panicked; kept until shutdown so that unobserved failures get reported.
    failed: cell::RefCell<Vec<rc::Rc<dyn Completion>>>,
}

impl Scheduler {
    pub(crate) fn new(config: Config) -> Self {
        let clock = match config.clock {
            ClockSource::System => Clock::system(),
            ClockSource::Virtual => Clock::simulated(),
        };
        Self {
            config,
            clock,
            state: cell::Cell::new(State::Idle),
            next_id: cell::Cell::new(TaskId::default()),
            pending_tasks: cell::RefCell::new(collections::HashMap::new()),
            ready: sync::Arc::new(ReadyQueue::default()),
            timers: cell::RefCell::new(Timers::default()),
            failed: cell::RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn state(&self) -> State {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: State) {
        let previous = self.state.replace(state);
        if previous != state {
            tracing::debug!(from = ?previous, to = ?state, "event loop state changed");
        }
    }

    pub(crate) fn now(&self) -> time::Instant {
        self.clock.now()
    }

    pub(crate) fn elapsed(&self) -> time::Duration {
        self.clock.elapsed()
    }

    /// Registers `future` as a new task. None of its logic runs here: the task is only queued for
    /// the next pass.
    pub(crate) fn spawn<F>(&self, future: F) -> Result<rc::Rc<Shared<F::Output>>, Error>
    where
        F: future::Future + 'static,
        F::Output: 'static,
    {
        if self.state() == State::Closed {
            return Err(Error::Closed);
        }
        let mut next_id = self.next_id.get();
        let id = next_id.increment();
        self.next_id.set(next_id);

        let shared = rc::Rc::new(Shared::new(id, Notifier::waker(id, self.ready.clone())));
        let task = Harness::task(future, shared.clone());
        self.pending_tasks.borrow_mut().insert(
            id,
            Entry {
                task,
                completion: shared.clone(),
            },
        );
        self.ready.push(id);
        tracing::trace!(task = %id, "task spawned");
        Ok(shared)
    }

    /// Returns the scheduled tasks ids to perform further execution.
    pub(crate) fn scheduled_ids(&self) -> impl IntoIterator<Item = TaskId> {
        self.ready.drain()
    }

    /// Polls the `Task` associated with a given `id`. The task is taken out of the table while it
    /// runs, so the coroutine is free to spawn or register timers through its `Handle`.
    pub(crate) fn poll(&self, id: TaskId) {
        let entry = self.pending_tasks.borrow_mut().remove(&id);
        let Some(mut entry) = entry else {
            return;
        };
        tracing::trace!(task = %id, "polling task");
        let started = time::Instant::now();
        let poll = entry
            .task
            .as_mut()
            .poll(&mut task::Context::from_waker(entry.completion.waker()));
        self.check_slow_poll(id, started.elapsed());
        match poll {
            task::Poll::Pending => {
                self.pending_tasks.borrow_mut().insert(id, entry);
            }
            task::Poll::Ready(()) => {
                tracing::trace!(task = %id, "task finished");
                if entry.completion.panic().is_some() {
                    self.failed.borrow_mut().push(entry.completion);
                }
            }
        }
    }

    fn check_slow_poll(&self, id: TaskId, elapsed: time::Duration) {
        if let Some(threshold) = self.config.slow_poll_threshold {
            if elapsed >= threshold {
                tracing::warn!(task = %id, ?elapsed, "task blocked the event loop");
            }
        }
    }

    /// Returns the current `Status` of the scheduler.
    pub(crate) fn status(&self) -> Status {
        if self.pending_tasks.borrow().is_empty() {
            Status::Done
        } else if self.ready.is_empty() {
            Status::WaitingForEvents
        } else {
            Status::RunningTasks
        }
    }

    /// Schedules `waker` to be woken at `deadline` unless `cancelled` gets set first.
    pub(crate) fn register_timer(
        &self,
        deadline: time::Instant,
        waker: task::Waker,
        cancelled: rc::Rc<cell::Cell<bool>>,
    ) {
        self.timers.borrow_mut().insert(deadline, waker, cancelled);
    }

    /// Wakes every task whose timer has expired.
    pub(crate) fn fire_timers(&self) {
        let expired = self.timers.borrow_mut().expire(self.clock.now());
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "timers fired");
        }
        for waker in expired {
            waker.wake();
        }
    }

    /// Performs one iteration of the event loop while every task is suspended: waits for the
    /// earliest timer or for a wake coming from another thread. With a virtual clock, time jumps
    /// to the earliest deadline instead of being waited for.
    pub(crate) fn turn(&self) {
        let deadline = self.timers.borrow_mut().next_deadline();
        match deadline {
            Some(deadline) if self.clock.is_virtual() => {
                if self.ready.is_empty() {
                    tracing::debug!(?deadline, "advancing virtual clock");
                    self.clock.advance_to(deadline);
                }
            }
            Some(deadline) => {
                let timeout = deadline.saturating_duration_since(self.clock.now());
                self.ready.park(Some(timeout));
            }
            None => {
                tracing::debug!("no timer pending, parking until woken");
                self.ready.park(None);
            }
        }
    }

    /// Returns the captured panics of finished tasks nobody has observed yet.
    pub(crate) fn unobserved_failures(&self) -> Vec<TaskError> {
        self.failed
            .borrow()
            .iter()
            .filter(|completion| !completion.is_observed())
            .filter_map(|completion| completion.panic())
            .collect()
    }

    /// Closes the scheduler: every pending task completes as cancelled and gets dropped, timers
    /// are cleared, and unobserved failures are reported.
    pub(crate) fn shutdown(&self) {
        self.set_state(State::Closed);
        let tasks = mem::take(&mut *self.pending_tasks.borrow_mut());
        if !tasks.is_empty() {
            tracing::debug!(count = tasks.len(), "cancelling pending tasks");
        }
        for (_, entry) in tasks {
            tracing::trace!(task = %entry.completion.id(), "task cancelled by shutdown");
            entry.completion.abort();
            mem::drop(entry.task);
        }
        self.timers.borrow_mut().clear();
        self.ready.drain();
        for error in self.unobserved_failures() {
            tracing::warn!(task = %error.id(), %error, "task failed and its failure was never observed");
        }
        self.failed.borrow_mut().clear();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Scheduler")
            .field("state", &self.state.get())
            .field("clock", &self.clock)
            .field("pending_tasks", &self.pending_tasks.borrow().len())
            .field("timers", &self.timers.borrow().len())
            .finish()
    }
}
