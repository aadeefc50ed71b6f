// SPDX-License-Identifier: MIT
//! Environment-driven OpenTelemetry bootstrap for Rust services.
//!
//! This library builds three telemetry pipelines (traces, metrics, logs) from the
//! standard `OTEL_*` environment variables and hands back one handle that shuts all
//! of them down together:
//! * Exporters per signal are chosen with `OTEL_TRACES_EXPORTER`, `OTEL_METRICS_EXPORTER`
//!   and `OTEL_LOGS_EXPORTER` (`otlp`, `console`, `none`, comma-separated).
//! * Propagators are chosen with `OTEL_PROPAGATORS` (`tracecontext`, `baggage`).
//! * `tracing` spans and events are bridged into the pipelines by
//!   [`telemetry::Telemetry::init_subscriber`].
//!
//! The primary entry points are found in the [`telemetry`] module: [`telemetry::bootstrap`]
//! and [`telemetry::Telemetry`].
//!
//! # Feature Flags
//! * `console-log` – add a compact console formatter (file/line/thread id).
//!
//! # Quick Start
//! ```no_run
//! use std::time::Duration;
//! use hello_otel::telemetry::bootstrap;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut telemetry = bootstrap()?;
//!     telemetry.init_subscriber()?;
//!     // business logic
//!     telemetry.shutdown(Duration::from_secs(5))?;
//!     Ok(())
//! }
//! ```
pub mod config;
pub mod console;
pub mod error;
pub mod pipeline;
pub mod propagator;
pub mod shutdown;
pub mod telemetry;

pub use error::{BootstrapError, ConfigError, ShutdownError, Signal};
pub use telemetry::{bootstrap, bootstrap_with_config, Telemetry};
