// SPDX-License-Identifier: MIT
use anyhow::Result;
use hello_otel::config::initial_wait;
use hello_otel::telemetry::{bootstrap, DEFAULT_SHUTDOWN_TIMEOUT};
use opentelemetry::{global, KeyValue};
use tracing::{info, instrument};

const NAME: &str = "hello-otel";

#[instrument(name = "run", fields(key1 = "value1"))]
fn say_hello() {
    let invocations = global::meter(NAME)
        .u64_counter("hello.invocations")
        .with_description("The number of invocations")
        .with_unit("{invocation}")
        .build();
    invocations.add(1, &[KeyValue::new("key1", "value1")]);

    info!(key1 = "value1", "Hello World!");
    println!("[INFO] Hello World!");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Give the collector a moment to discover a freshly started process.
    tokio::time::sleep(initial_wait()?).await;

    let mut telemetry = bootstrap()?;
    let result = telemetry.init_subscriber().map_err(anyhow::Error::from);
    if result.is_ok() {
        say_hello();
    }

    let shutdown = telemetry.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
    match (result, shutdown) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) => Err(e),
        (Ok(()), Err(s)) => Err(s.into()),
        (Err(e), Err(s)) => Err(e.context(format!("telemetry shutdown also failed: {s}"))),
    }
}
