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

use little_loop::{yield_now, Error, EventLoop};
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread;
use std::time::{Duration, Instant};

fn event_loop() -> EventLoop {
    EventLoop::builder().virtual_clock().build()
}

#[test]
fn sleepers_wake_in_deadline_order() {
    let mut event_loop = event_loop();
    let handle = event_loop.handle();
    let woken = Rc::new(RefCell::new(Vec::new()));

    let order = woken.clone();
    event_loop
        .run_until_complete(async move {
            let mut tasks = Vec::new();
            for secs in [3, 1, 2] {
                let (sleeper, order) = (handle.clone(), order.clone());
                tasks.push(handle.spawn(async move {
                    sleeper.sleep(Duration::from_secs(secs)).await;
                    order.borrow_mut().push(secs);
                })?);
            }
            little_loop::gather(tasks).await?;
            Ok::<_, Error>(())
        })
        .unwrap()
        .unwrap();

    assert_eq!(*woken.borrow(), vec![1, 2, 3]);
    assert_eq!(event_loop.time(), Duration::from_secs(3));
}

#[test]
fn zero_sleep_is_still_a_suspension_point() {
    let mut event_loop = event_loop();
    let handle = event_loop.handle();
    let trace = Rc::new(RefCell::new(Vec::new()));

    let (a_trace, b_trace) = (trace.clone(), trace.clone());
    let sleeper = handle.clone();
    event_loop
        .run_until_complete(async move {
            let a = handle.spawn(async move {
                a_trace.borrow_mut().push("A before");
                sleeper.sleep(Duration::ZERO).await;
                a_trace.borrow_mut().push("A after");
            })?;
            let b = handle.spawn(async move { b_trace.borrow_mut().push("B") })?;
            little_loop::gather([a, b]).await?;
            Ok::<_, Error>(())
        })
        .unwrap()
        .unwrap();

    assert_eq!(*trace.borrow(), vec!["A before", "B", "A after"]);
    assert_eq!(event_loop.time(), Duration::ZERO);
}

#[test]
fn sleep_until_targets_an_instant() {
    let mut event_loop = event_loop();
    let handle = event_loop.handle();
    let deadline = handle.now() + Duration::from_millis(1500);

    let sleeper = handle.clone();
    let elapsed = event_loop
        .run_until_complete(async move {
            let sleep = sleeper.sleep_until(deadline);
            assert!(!sleep.is_elapsed());
            sleep.await;
            sleeper.time()
        })
        .unwrap();

    assert_eq!(elapsed, Duration::from_millis(1500));
}

#[test]
fn timeout_passes_through_a_fast_future() {
    let mut event_loop = event_loop();
    let handle = event_loop.handle();

    let result = event_loop.run_until_complete(async move {
        let work = handle.sleep(Duration::from_secs(1));
        handle.timeout(Duration::from_secs(2), work).await
    });

    assert_eq!(result, Ok(Ok(())));
    assert_eq!(event_loop.time(), Duration::from_secs(1));
}

#[test]
fn timeout_without_a_reachable_deadline_never_elapses() {
    let mut event_loop = event_loop();
    let handle = event_loop.handle();

    let result = event_loop.run_until_complete(async move {
        handle.timeout(Duration::MAX, async { 5 }).await
    });

    assert_eq!(result, Ok(Ok(5)));
}

#[test]
fn sleep_beyond_the_clock_range_stays_pending() {
    let mut event_loop = event_loop();
    let handle = event_loop.handle();

    let result = event_loop.run_until_complete(async move {
        let forever = handle.sleep(Duration::MAX);
        assert!(forever.deadline() > handle.now());
        handle.timeout(Duration::from_secs(2), forever).await.is_err()
    });

    assert_eq!(result, Ok(true));
    assert_eq!(event_loop.time(), Duration::from_secs(2));
}

#[test]
fn timeout_elapses_and_drops_a_slow_future() {
    let mut event_loop = event_loop();
    let handle = event_loop.handle();

    let result = event_loop.run_until_complete(async move {
        let work = handle.sleep(Duration::from_secs(5));
        handle.timeout(Duration::from_secs(1), work).await
    });

    assert!(result.unwrap().is_err());
    assert_eq!(event_loop.time(), Duration::from_secs(1));
}

#[test]
fn timeout_on_a_task_only_abandons_the_wait() {
    let mut event_loop = event_loop();
    let handle = event_loop.handle();

    let sleeper = handle.clone();
    let result = event_loop.run_until_complete(async move {
        let task = handle.spawn(async move {
            sleeper.sleep(Duration::from_secs(3)).await;
            "still finished"
        })?;
        let waited = handle.timeout(Duration::from_secs(1), task.clone()).await;
        Ok::<_, Error>((waited.is_err(), task.await?))
    });

    assert_eq!(result, Ok(Ok((true, "still finished"))));
    assert_eq!(event_loop.time(), Duration::from_secs(3));
}

#[test]
fn yield_now_round_robins_ready_tasks() {
    let mut event_loop = event_loop();
    let handle = event_loop.handle();
    let trace = Rc::new(RefCell::new(Vec::new()));

    let worker = |name: &'static str| {
        let trace = trace.clone();
        async move {
            for step in 0..3 {
                trace.borrow_mut().push(format!("{name}{step}"));
                yield_now().await;
            }
        }
    };
    let (a, b) = (worker("A"), worker("B"));
    event_loop
        .run_until_complete(async move {
            let a = handle.spawn(a)?;
            let b = handle.spawn(b)?;
            little_loop::gather([a, b]).await?;
            Ok::<_, Error>(())
        })
        .unwrap()
        .unwrap();

    assert_eq!(*trace.borrow(), vec!["A0", "B0", "A1", "B1", "A2", "B2"]);
}

#[test]
fn system_clock_waits_for_real_time() {
    let started = Instant::now();
    let result = little_loop::run(|handle| async move {
        handle.sleep(Duration::from_millis(20)).await;
    });
    assert_eq!(result, Ok(()));
    assert!(started.elapsed() >= Duration::from_millis(20));
}

/// Completes once another thread has flipped the flag and woken the task.
struct ThreadSignal {
    fired: Arc<AtomicBool>,
    started: bool,
}

impl Future for ThreadSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.fired.load(Ordering::Acquire) {
            return Poll::Ready(());
        }
        if !self.started {
            self.started = true;
            let (fired, waker) = (self.fired.clone(), cx.waker().clone());
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                fired.store(true, Ordering::Release);
                waker.wake();
            });
        }
        Poll::Pending
    }
}

#[test]
fn wake_from_another_thread_unparks_the_loop() {
    let mut event_loop = EventLoop::new();
    let signal = ThreadSignal {
        fired: Arc::new(AtomicBool::new(false)),
        started: false,
    };
    assert_eq!(event_loop.run_until_complete(signal), Ok(()));
}
