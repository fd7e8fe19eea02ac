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

//! This file contains a minimal demonstration of the single threaded cooperative event loop offered
//! by Little Loop: two tasks sleep concurrently and are awaited as a batch.

use clap::Parser;
use little_loop::{gather, EventLoop, Handle};
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(version, about, author, long_about = None)]
struct Cli {
    #[arg(long, default_value_t = 2000, help = "Delay of the first task in milliseconds")]
    first_ms: u64,
    #[arg(long, default_value_t = 1000, help = "Delay of the second task in milliseconds")]
    second_ms: u64,
    #[arg(long, help = "Simulate time instead of waiting on the system clock")]
    virtual_clock: bool,
    #[arg(
        long,
        default_value_t = 100,
        help = "Warn about polls taking at least this many milliseconds (0 disables)"
    )]
    slow_poll_ms: u64,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn main() -> Result<(), little_loop::Error> {
    init_tracing();
    let args = Cli::parse();

    let mut builder = EventLoop::builder();
    if args.virtual_clock {
        builder = builder.virtual_clock();
    }
    builder = match args.slow_poll_ms {
        0 => builder.disable_slow_poll_warnings(),
        ms => builder.slow_poll_threshold(Duration::from_millis(ms)),
    };
    let mut event_loop = builder.build();
    let handle = event_loop.handle();

    let first = Duration::from_millis(args.first_ms);
    let second = Duration::from_millis(args.second_ms);
    let results = event_loop.run_until_complete(async move {
        let a = handle.spawn(delayed(handle.clone(), "A", first))?;
        let b = handle.spawn(delayed(handle.clone(), "B", second))?;
        Ok::<_, little_loop::Error>(gather([a, b]).await?)
    })??;

    for result in results {
        println!("{result}");
    }
    println!("elapsed: {:?}", event_loop.time());
    event_loop.close();
    Ok(())
}

async fn delayed(handle: Handle, name: &'static str, delay: Duration) -> String {
    tracing::info!(task = name, ?delay, "sleeping");
    handle.sleep(delay).await;
    tracing::info!(task = name, "woke up");
    format!("{name} done")
}
