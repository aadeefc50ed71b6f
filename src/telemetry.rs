// SPDX-License-Identifier: MIT
//! Telemetry pipeline bootstrap and coordinated shutdown.
//!
//! The public API is intentionally minimal:
//!
//! * [`bootstrap`] – builds propagator, tracer, meter and logger providers from the
//!   process environment and installs them process-wide.
//! * [`Telemetry`] – owns the providers and their shutdown; exposes them explicitly.
//! * [`Telemetry::init_subscriber`] – routes `tracing` spans and events into the pipelines.
//!
//! # Example
//! ```no_run
//! use std::time::Duration;
//! use hello_otel::telemetry::bootstrap;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut telemetry = bootstrap()?;
//!     // ... application logic ...
//!     telemetry.shutdown(Duration::from_secs(5))?; // flush final batches
//!     Ok(())
//! }
//! ```
//!
//! # Bootstrap
//! Steps run in a fixed order: propagator, tracer provider, meter provider, logger
//! provider. If any step fails, every provider built so far is shut down before the
//! error is returned, and nothing is installed globally.
//!
//! # Shutdown
//! [`Telemetry::shutdown`] shuts the providers down in creation order against one
//! deadline, joins all failures, and is a no-op on repeat calls. Dropping a
//! [`Telemetry`] that was never shut down runs the same shutdown.
//!
//! # Threading Model
//! Batch processors and periodic readers run their own background threads. OTLP gRPC
//! exporters must be built inside a Tokio runtime.
use std::time::Duration;

use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_opentelemetry::OpenTelemetryLayer;
#[cfg(feature = "console-log")]
use tracing_subscriber::fmt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

use crate::config::PipelineConfig;
use crate::console::ConsoleSink;
use crate::error::{BootstrapError, ShutdownError};
use crate::pipeline::{new_logger_provider, new_meter_provider, new_tracer_provider, PipelineContext};
use crate::propagator::new_propagator;
use crate::shutdown::ShutdownRegistry;

/// Instrumentation scope used for the `tracing` bridge.
pub const INSTRUMENTATION_NAME: &str = "hello-otel";

/// Budget for shutdowns nobody gave a deadline to: cleanup after a failed
/// bootstrap and shutdown on drop.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Progress of a bootstrap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootstrapState {
    Idle,
    PropagatorSet,
    TracerReady,
    MeterReady,
    LoggerReady,
    Complete,
    Failed,
}

/// Drives the bootstrap steps. Holds every provider built so far, and their
/// shutdown hooks, until they are handed to [`Telemetry`].
struct Bootstrap {
    state: BootstrapState,
    registry: ShutdownRegistry,
    cleanup_timeout: Duration,
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
    logger_provider: Option<SdkLoggerProvider>,
}

impl Bootstrap {
    fn new(cleanup_timeout: Duration) -> Self {
        Self {
            state: BootstrapState::Idle,
            registry: ShutdownRegistry::new(),
            cleanup_timeout,
            tracer_provider: None,
            meter_provider: None,
            logger_provider: None,
        }
    }

    /// Run one step. On success move to `next`; on failure shut down whatever
    /// was registered so far and return the joined error.
    fn step<T, E>(
        &mut self,
        next: BootstrapState,
        build: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, BootstrapError>
    where
        E: Into<BootstrapError>,
    {
        match build() {
            Ok(value) => {
                tracing::debug!(target: "otel_lifecycle", from = ?self.state, to = ?next, "bootstrap step complete");
                self.state = next;
                Ok(value)
            }
            Err(err) => {
                let err: BootstrapError = err.into();
                tracing::error!(target: "otel_lifecycle", state = ?self.state, error = %err, "bootstrap failed");
                self.state = BootstrapState::Failed;
                let cleanup = self.registry.shutdown(self.cleanup_timeout);
                Err(err.with_cleanup(cleanup))
            }
        }
    }

    fn run(
        &mut self,
        cfg: &PipelineConfig,
        console: ConsoleSink,
    ) -> Result<Telemetry, BootstrapError> {
        // The OTLP transport is checked with the propagators, before any
        // provider exists.
        let (propagator, cx) = self.step(BootstrapState::PropagatorSet, || {
            let propagator = new_propagator(&cfg.propagators)?;
            Ok::<_, BootstrapError>((propagator, PipelineContext::new(cfg, console)?))
        })?;

        let tracer_provider = self.step(BootstrapState::TracerReady, || {
            new_tracer_provider(&cfg.traces, &cx)
        })?;
        self.registry.register_tracer_provider(&tracer_provider);
        self.tracer_provider = Some(tracer_provider.clone());

        let meter_provider = self.step(BootstrapState::MeterReady, || {
            new_meter_provider(&cfg.metrics, &cx)
        })?;
        self.registry.register_meter_provider(&meter_provider);
        self.meter_provider = Some(meter_provider.clone());

        let logger_provider = self.step(BootstrapState::LoggerReady, || {
            new_logger_provider(&cfg.logs, &cx)
        })?;
        self.registry.register_logger_provider(&logger_provider);
        self.logger_provider = Some(logger_provider.clone());

        // Only a fully built pipeline becomes visible process-wide. The logger
        // provider has no global slot; `init_subscriber` installs it.
        global::set_text_map_propagator(propagator);
        global::set_tracer_provider(tracer_provider.clone());
        global::set_meter_provider(meter_provider.clone());
        self.state = BootstrapState::Complete;
        tracing::info!(
            target: "otel_lifecycle",
            traces = %cfg.traces.exporters.value,
            metrics = %cfg.metrics.exporters.value,
            logs = %cfg.logs.exporters.value,
            "telemetry pipelines ready"
        );

        // The handle owns the providers and their shutdown from here on.
        self.tracer_provider.take();
        self.meter_provider.take();
        self.logger_provider.take();
        Ok(Telemetry {
            tracer_provider,
            meter_provider,
            logger_provider,
            registry: std::mem::take(&mut self.registry),
            state: self.state,
        })
    }
}

/// Bootstrap the pipelines from the process environment.
///
/// On success the returned [`Telemetry`] must be shut down (explicitly, or by
/// dropping it) before the process exits. On failure no provider is active.
///
/// # Errors
/// Returns a configuration error for unrecognised propagator, exporter or
/// protocol names, and a construction error if an OTLP exporter cannot be built.
pub fn bootstrap() -> Result<Telemetry, BootstrapError> {
    bootstrap_with_config(&PipelineConfig::from_env())
}

/// Bootstrap the pipelines from an explicit configuration; console exporters
/// write to standard output.
pub fn bootstrap_with_config(cfg: &PipelineConfig) -> Result<Telemetry, BootstrapError> {
    bootstrap_with_sink(cfg, ConsoleSink::stdout())
}

/// Bootstrap the pipelines, sending console exporter output to `console`.
pub fn bootstrap_with_sink(
    cfg: &PipelineConfig,
    console: ConsoleSink,
) -> Result<Telemetry, BootstrapError> {
    Bootstrap::new(DEFAULT_SHUTDOWN_TIMEOUT).run(cfg, console)
}

/// Handle to a fully bootstrapped set of pipelines.
///
/// Call [`Telemetry::shutdown`] at a controlled point (typically just before
/// process exit) to flush final batches. If the handle is dropped first, the
/// drop performs the shutdown with [`DEFAULT_SHUTDOWN_TIMEOUT`] and reports
/// failures on stderr.
pub struct Telemetry {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: SdkLoggerProvider,
    registry: ShutdownRegistry,
    state: BootstrapState,
}

impl Telemetry {
    pub fn tracer_provider(&self) -> &SdkTracerProvider {
        &self.tracer_provider
    }

    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.meter_provider
    }

    pub fn logger_provider(&self) -> &SdkLoggerProvider {
        &self.logger_provider
    }

    pub fn state(&self) -> BootstrapState {
        self.state
    }

    /// Whether shutdown has already run.
    pub fn is_shut_down(&self) -> bool {
        self.registry.is_empty()
    }

    /// Flush and shut down every provider, in creation order (traces, metrics,
    /// logs), within `timeout`.
    ///
    /// Every provider is attempted even when an earlier one fails or the
    /// deadline passes. Returns `Ok(())` if every provider shut down cleanly,
    /// otherwise a [`ShutdownError`] naming each failing provider. Calling it
    /// again is a no-op returning `Ok(())`.
    ///
    /// # Examples
    /// ```no_run
    /// # use std::time::Duration;
    /// # use hello_otel::telemetry::bootstrap;
    /// # fn main() -> anyhow::Result<()> {
    /// let mut telemetry = bootstrap()?;
    /// // work...
    /// telemetry.shutdown(Duration::from_secs(5))?;
    /// assert!(telemetry.shutdown(Duration::from_secs(5)).is_ok());
    /// # Ok(()) }
    /// ```
    pub fn shutdown(&mut self, timeout: Duration) -> Result<(), ShutdownError> {
        if !self.registry.is_empty() {
            tracing::info!(target: "otel_lifecycle", "shutting down telemetry pipelines");
        }
        self.registry.shutdown(timeout)
    }

    /// Install the global `tracing` subscriber for this pipeline.
    ///
    /// Spans are exported through the tracer provider, events through the
    /// logger provider. The filter comes from `RUST_LOG` (default `info`).
    /// With the `console-log` feature a compact console layer is added.
    ///
    /// # Errors
    /// Fails if a global subscriber is already installed.
    pub fn init_subscriber(&self) -> Result<(), TryInitError> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let otel_trace_layer =
            OpenTelemetryLayer::new(self.tracer_provider.tracer(INSTRUMENTATION_NAME));
        let bridge_layer = OpenTelemetryTracingBridge::new(&self.logger_provider);

        // Console formatting: plain compact single-line output.
        #[cfg(feature = "console-log")]
        let fmt_layer_plain = fmt::layer()
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .compact();

        #[cfg(feature = "console-log")]
        return Registry::default()
            .with(filter)
            .with(fmt_layer_plain)
            .with(bridge_layer)
            .with(otel_trace_layer)
            .try_init();

        #[cfg(not(feature = "console-log"))]
        return Registry::default()
            .with(filter)
            .with(bridge_layer)
            .with(otel_trace_layer)
            .try_init();
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Err(e) = self.registry.shutdown(DEFAULT_SHUTDOWN_TIMEOUT) {
            eprintln!("Error shutting down telemetry: {e}");
        }
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("state", &self.state)
            .field("pending_shutdown", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{METRICS_EXPORTER_KEY, OTLP_PROTOCOL_KEY, TRACES_EXPORTER_KEY};
    use crate::error::{ConfigError, ConfigErrorKind, Signal};
    use crate::shutdown::tests::recording_hook;
    use opentelemetry_sdk::error::OTelSdkError;
    use std::sync::{Arc, Mutex};

    fn config_error(token: &str) -> ConfigError {
        ConfigError {
            kind: ConfigErrorKind::Exporter,
            token: token.to_string(),
            variable: METRICS_EXPORTER_KEY,
            value: token.to_string(),
        }
    }

    #[test]
    fn successful_steps_advance_state() {
        let mut boot = Bootstrap::new(Duration::from_secs(1));
        let value = boot
            .step(BootstrapState::PropagatorSet, || Ok::<_, ConfigError>(7))
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(boot.state, BootstrapState::PropagatorSet);
    }

    #[test]
    fn failed_step_shuts_down_earlier_providers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut boot = Bootstrap::new(Duration::from_secs(1));
        boot.step(BootstrapState::TracerReady, || Ok::<_, ConfigError>(()))
            .unwrap();
        boot.registry
            .register(Signal::Traces, recording_hook(Signal::Traces, &log, Ok(())));

        let err = boot
            .step(BootstrapState::MeterReady, || {
                Err::<(), _>(config_error("bogus"))
            })
            .unwrap_err();

        assert_eq!(boot.state, BootstrapState::Failed);
        assert_eq!(*log.lock().unwrap(), vec![Signal::Traces]);
        assert!(boot.registry.is_empty());
        assert!(matches!(err, BootstrapError::Config(_)));
        assert_eq!(err.config_error().map(|e| e.token.as_str()), Some("bogus"));
    }

    #[test]
    fn cleanup_failure_is_joined_with_the_cause() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut boot = Bootstrap::new(Duration::from_secs(1));
        boot.registry.register(
            Signal::Traces,
            recording_hook(
                Signal::Traces,
                &log,
                Err(OTelSdkError::InternalFailure("flush failed".into())),
            ),
        );

        let err = boot
            .step(BootstrapState::MeterReady, || {
                Err::<(), _>(config_error("bogus"))
            })
            .unwrap_err();

        match &err {
            BootstrapError::Cleanup { cause, cleanup } => {
                assert!(matches!(**cause, BootstrapError::Config(_)));
                assert_eq!(cleanup.signals().collect::<Vec<_>>(), vec![Signal::Traces]);
            }
            other => panic!("expected cleanup error, got {other:?}"),
        }
        assert_eq!(err.config_error().map(|e| e.token.as_str()), Some("bogus"));
    }

    #[test]
    fn metric_failure_shuts_down_the_built_tracer_provider() {
        let cfg = PipelineConfig::from_pairs([
            (TRACES_EXPORTER_KEY, "console"),
            (METRICS_EXPORTER_KEY, "console,statsd"),
        ]);
        let mut boot = Bootstrap::new(Duration::from_secs(1));
        let err = boot
            .run(&cfg, ConsoleSink::from_writer(std::io::sink()))
            .unwrap_err();

        assert_eq!(err.config_error().map(|e| e.token.as_str()), Some("statsd"));
        assert_eq!(
            err.config_error().map(|e| e.variable),
            Some("OTEL_METRICS_EXPORTER")
        );
        assert!(matches!(err, BootstrapError::Config(_)), "{err:?}");
        assert_eq!(boot.state, BootstrapState::Failed);
        assert!(boot.registry.is_empty());
        assert!(boot.meter_provider.is_none());

        // Cleanup already shut the tracer provider down.
        let tracer_provider = boot.tracer_provider.take().expect("tracer provider");
        assert!(
            matches!(tracer_provider.shutdown(), Err(OTelSdkError::AlreadyShutdown)),
            "tracer provider was not shut down during cleanup"
        );
    }

    #[test]
    fn bad_protocol_fails_before_any_provider_is_built() {
        let cfg = PipelineConfig::from_pairs([
            (TRACES_EXPORTER_KEY, "console"),
            (OTLP_PROTOCOL_KEY, "http/json"),
        ]);
        let mut boot = Bootstrap::new(Duration::from_secs(1));
        let err = boot
            .run(&cfg, ConsoleSink::from_writer(std::io::sink()))
            .unwrap_err();

        assert_eq!(err.config_error().map(|e| e.kind), Some(ConfigErrorKind::Protocol));
        assert_eq!(boot.state, BootstrapState::Failed);
        assert!(boot.tracer_provider.is_none());
    }
}
