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

//! This module contains the clocks an `EventLoop` can measure time with.

use std::{cell, time};

/// The source of time of an `EventLoop`.
#[derive(Debug)]
pub(crate) enum Clock {
    /// Follows the system monotonic clock; waiting on a timer parks the thread.
    System { origin: time::Instant },
    /// Stands still while tasks run and jumps straight to the next deadline once the loop has
    /// nothing else to do. Waiting on a timer never blocks.
    Virtual {
        origin: time::Instant,
        offset: cell::Cell<time::Duration>,
    },
}

impl Clock {
    pub(crate) fn system() -> Self {
        Self::System {
            origin: time::Instant::now(),
        }
    }

    pub(crate) fn simulated() -> Self {
        Self::Virtual {
            origin: time::Instant::now(),
            offset: cell::Cell::new(time::Duration::ZERO),
        }
    }

    /// Returns the current instant as seen by the loop.
    pub(crate) fn now(&self) -> time::Instant {
        match self {
            Self::System { .. } => time::Instant::now(),
            Self::Virtual { origin, offset } => *origin + offset.get(),
        }
    }

    /// Returns the time elapsed since the clock was created.
    pub(crate) fn elapsed(&self) -> time::Duration {
        match self {
            Self::System { origin } => origin.elapsed(),
            Self::Virtual { offset, .. } => offset.get(),
        }
    }

    pub(crate) fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual { .. })
    }

    /// Moves a virtual clock forward to `deadline`. Time never goes backwards, and a system clock
    /// is left untouched.
    pub(crate) fn advance_to(&self, deadline: time::Instant) {
        if let Self::Virtual { origin, offset } = self {
            let target = deadline.saturating_duration_since(*origin);
            if target > offset.get() {
                offset.set(target);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_only_moves_forward() {
        let clock = Clock::simulated();
        let start = clock.now();
        clock.advance_to(start + time::Duration::from_secs(3));
        clock.advance_to(start + time::Duration::from_secs(1));
        assert_eq!(clock.elapsed(), time::Duration::from_secs(3));
        assert_eq!(clock.now(), start + time::Duration::from_secs(3));
    }

    #[test]
    fn system_clock_ignores_advances() {
        let clock = Clock::system();
        clock.advance_to(clock.now() + time::Duration::from_secs(60));
        assert!(clock.elapsed() < time::Duration::from_secs(60));
        assert!(!clock.is_virtual());
    }
}
