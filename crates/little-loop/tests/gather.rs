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

use little_loop::{gather, Error, EventLoop, Handle, TaskError, TaskHandle};
use std::time::{Duration, Instant};

fn sleepy(handle: &Handle, delay: Duration, value: &'static str) -> TaskHandle<&'static str> {
    let sleeper = handle.clone();
    handle
        .spawn(async move {
            sleeper.sleep(delay).await;
            value
        })
        .unwrap()
}

fn failing(handle: &Handle, delay: Duration, message: &'static str) -> TaskHandle<&'static str> {
    let sleeper = handle.clone();
    handle
        .spawn(async move {
            sleeper.sleep(delay).await;
            if true {
                panic!("{message}");
            }
            "unreachable"
        })
        .unwrap()
}

#[test]
fn concurrent_sleeps_overlap_on_the_virtual_clock() {
    let mut event_loop = EventLoop::builder().virtual_clock().build();
    let handle = event_loop.handle();

    let result = event_loop.run_until_complete(async move {
        let a = sleepy(&handle, Duration::from_secs(2), "A done");
        let b = sleepy(&handle, Duration::from_secs(1), "B done");
        gather([a, b]).await
    });

    assert_eq!(result, Ok(Ok(vec!["A done", "B done"])));
    assert_eq!(event_loop.time(), Duration::from_secs(2));
}

#[test]
fn concurrent_sleeps_overlap_on_the_system_clock() {
    let mut event_loop = EventLoop::new();
    let handle = event_loop.handle();
    let started = Instant::now();

    let result = event_loop.run_until_complete(async move {
        let a = sleepy(&handle, Duration::from_millis(300), "A done");
        let b = sleepy(&handle, Duration::from_millis(200), "B done");
        gather([a, b]).await
    });

    let elapsed = started.elapsed();
    assert_eq!(result, Ok(Ok(vec!["A done", "B done"])));
    assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(500), "{elapsed:?}");
}

#[test]
fn failure_surfaces_only_after_every_member_finished() {
    let mut event_loop = EventLoop::builder().virtual_clock().build();
    let handle = event_loop.handle();

    let result = event_loop.run_until_complete(async move {
        let a = failing(&handle, Duration::from_secs(1), "A failed");
        let b = sleepy(&handle, Duration::from_secs(2), "B done");
        let outcome = gather([a.clone(), b.clone()]).await;
        Ok::<_, Error>((a.id(), outcome, b.result()))
    });

    let (a, outcome, b) = result.unwrap().unwrap();
    assert_eq!(
        outcome,
        Err(TaskError::Panicked {
            id: a,
            message: "A failed".to_string()
        })
    );
    assert_eq!(b, Some(Ok("B done")));
    assert_eq!(event_loop.time(), Duration::from_secs(2));
}

#[test]
fn first_failure_in_member_order_wins() {
    let mut event_loop = EventLoop::builder().virtual_clock().build();
    let handle = event_loop.handle();

    let result = event_loop.run_until_complete(async move {
        let late = failing(&handle, Duration::from_secs(2), "late");
        let early = failing(&handle, Duration::from_secs(1), "early");
        gather([late, early]).await
    });

    match result {
        Ok(Err(TaskError::Panicked { message, .. })) => assert_eq!(message, "late"),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn empty_gather_completes_immediately() {
    let mut event_loop = EventLoop::builder().virtual_clock().build();
    let result = event_loop.run_until_complete(gather(Vec::<TaskHandle<u8>>::new()));
    assert_eq!(result, Ok(Ok(Vec::new())));
}
