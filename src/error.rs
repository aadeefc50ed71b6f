// SPDX-License-Identifier: MIT
//! Error types for pipeline bootstrap and shutdown.

use std::fmt;

use opentelemetry_otlp::ExporterBuildError;
use opentelemetry_sdk::error::OTelSdkError;
use thiserror::Error;

use crate::config::Setting;

/// One of the three telemetry signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl Signal {
    /// Name of the provider that owns this signal, as used in error messages.
    pub fn provider_name(self) -> &'static str {
        match self {
            Signal::Traces => "tracer provider",
            Signal::Metrics => "meter provider",
            Signal::Logs => "logger provider",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
            Signal::Logs => "logs",
        })
    }
}

/// What kind of token was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigErrorKind {
    Propagator,
    Exporter,
    Protocol,
    Duration,
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigErrorKind::Propagator => "propagator",
            ConfigErrorKind::Exporter => "exporter",
            ConfigErrorKind::Protocol => "OTLP protocol",
            ConfigErrorKind::Duration => "duration",
        })
    }
}

/// An unrecognised value in one of the configuration variables.
///
/// Carries the offending token, the variable name and the variable's full
/// value. Never retryable.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unsupported {kind}: {token:?} from {variable}={value:?}")]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub token: String,
    pub variable: &'static str,
    pub value: String,
}

impl ConfigError {
    pub(crate) fn new(kind: ConfigErrorKind, token: &str, setting: &Setting) -> Self {
        Self {
            kind,
            token: token.to_string(),
            variable: setting.key,
            value: setting.value.clone(),
        }
    }
}

/// Shutdown failures of one or more providers, in the order they occurred.
#[derive(Debug, Error)]
pub struct ShutdownError {
    failures: Vec<(Signal, OTelSdkError)>,
}

impl ShutdownError {
    pub(crate) fn from_failures(failures: Vec<(Signal, OTelSdkError)>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self { failures })
        }
    }

    /// Every `(signal, error)` pair that contributed to this error.
    pub fn failures(&self) -> &[(Signal, OTelSdkError)] {
        &self.failures
    }

    pub fn signals(&self) -> impl Iterator<Item = Signal> + '_ {
        self.failures.iter().map(|(signal, _)| *signal)
    }
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (signal, err)) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {err}", signal.provider_name())?;
        }
        Ok(())
    }
}

/// Errors returned by [`crate::telemetry::bootstrap`].
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Unrecognised propagator, exporter or protocol name.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The underlying exporter could not be constructed.
    #[error("failed to build {signal} exporter")]
    Exporter {
        signal: Signal,
        #[source]
        source: ExporterBuildError,
    },

    /// A bootstrap step failed and shutting down the providers built so far
    /// failed too. Both causes are kept.
    #[error("{cause}; cleanup after failed bootstrap: {cleanup}")]
    Cleanup {
        cause: Box<BootstrapError>,
        #[source]
        cleanup: ShutdownError,
    },
}

impl BootstrapError {
    /// The configuration error behind this failure, if there is one.
    pub fn config_error(&self) -> Option<&ConfigError> {
        match self {
            BootstrapError::Config(err) => Some(err),
            BootstrapError::Cleanup { cause, .. } => cause.config_error(),
            BootstrapError::Exporter { .. } => None,
        }
    }

    /// Join a cleanup outcome onto the error that triggered it.
    pub(crate) fn with_cleanup(self, cleanup: Result<(), ShutdownError>) -> Self {
        match cleanup {
            Ok(()) => self,
            Err(cleanup) => BootstrapError::Cleanup {
                cause: Box::new(self),
                cleanup,
            },
        }
    }
}
