// SPDX-License-Identifier: MIT
//! Ordered registry of provider shutdown hooks.
//!
//! One hook is registered per provider as soon as the provider exists, in
//! creation order. [`ShutdownRegistry::shutdown`] drains the registry, runs
//! every hook against a shared deadline and joins the failures. A drained
//! registry shuts down to `Ok(())` without doing anything.

use std::fmt;
use std::time::{Duration, Instant};

use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;

use crate::error::{ShutdownError, Signal};

/// Shuts one provider down within the given time budget.
pub type ShutdownHook = Box<dyn FnOnce(Duration) -> OTelSdkResult + Send>;

#[derive(Default)]
pub struct ShutdownRegistry {
    hooks: Vec<(Signal, ShutdownHook)>,
}

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, signal: Signal, hook: ShutdownHook) {
        self.hooks.push((signal, hook));
    }

    pub fn register_tracer_provider(&mut self, provider: &SdkTracerProvider) {
        let provider = provider.clone();
        self.register(
            Signal::Traces,
            Box::new(move |timeout| provider.shutdown_with_timeout(timeout)),
        );
    }

    pub fn register_meter_provider(&mut self, provider: &SdkMeterProvider) {
        let provider = provider.clone();
        self.register(
            Signal::Metrics,
            Box::new(move |timeout| provider.shutdown_with_timeout(timeout)),
        );
    }

    pub fn register_logger_provider(&mut self, provider: &SdkLoggerProvider) {
        let provider = provider.clone();
        self.register(
            Signal::Logs,
            Box::new(move |timeout| provider.shutdown_with_timeout(timeout)),
        );
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every registered hook in order and clear the registry.
    ///
    /// All hooks share one deadline, `timeout` from now. Once it has passed
    /// the remaining hooks still run, with a zero budget; their timeouts are
    /// reported like any other failure. A timeout too large to form a
    /// deadline (such as `Duration::MAX`) is handed to every hook as is.
    pub fn shutdown(&mut self, timeout: Duration) -> Result<(), ShutdownError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut failures = Vec::new();

        for (signal, hook) in self.hooks.drain(..) {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            match hook(remaining) {
                Ok(()) => tracing::debug!(target: "otel_lifecycle", %signal, "provider shut down"),
                Err(err) => {
                    tracing::warn!(target: "otel_lifecycle", %signal, error = %err, "provider shutdown failed");
                    failures.push((signal, err));
                }
            }
        }

        match ShutdownError::from_failures(failures) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

impl fmt::Debug for ShutdownRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|(signal, _)| signal))
            .finish()
    }
}
