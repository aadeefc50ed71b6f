// SPDX-License-Identifier: MIT
//! Environment-driven pipeline configuration.
//!
//! Every variable is optional. An empty value is treated exactly like an unset
//! one and falls back to the default. Values are kept as raw strings here;
//! the propagator and exporter factories parse them and report errors that
//! name the variable they came from.

use std::fmt;
use std::time::Duration;

use crate::error::{ConfigError, ConfigErrorKind};

pub const PROPAGATORS_KEY: &str = "OTEL_PROPAGATORS";
pub const DEFAULT_PROPAGATORS: &str = "tracecontext,baggage";

// cf. https://opentelemetry.io/docs/specs/otel/configuration/sdk-environment-variables/#exporter-selection
pub const TRACES_EXPORTER_KEY: &str = "OTEL_TRACES_EXPORTER";
pub const METRICS_EXPORTER_KEY: &str = "OTEL_METRICS_EXPORTER";
pub const LOGS_EXPORTER_KEY: &str = "OTEL_LOGS_EXPORTER";
pub const DEFAULT_EXPORTER: &str = "otlp";

// Not standard OTel variables; named after the OTLP exporter ones.
pub const CONSOLE_TRACES_PRETTY_PRINT_KEY: &str = "OTEL_EXPORTER_CONSOLE_TRACES_PRETTY_PRINT";
pub const CONSOLE_METRICS_PRETTY_PRINT_KEY: &str = "OTEL_EXPORTER_CONSOLE_METRICS_PRETTY_PRINT";
pub const CONSOLE_LOGS_PRETTY_PRINT_KEY: &str = "OTEL_EXPORTER_CONSOLE_LOGS_PRETTY_PRINT";
pub const DEFAULT_PRETTY_PRINT: &str = "false";

pub const OTLP_PROTOCOL_KEY: &str = "OTEL_EXPORTER_OTLP_PROTOCOL";
pub const DEFAULT_OTLP_PROTOCOL: &str = "grpc";

pub const SERVICE_NAME_KEY: &str = "OTEL_SERVICE_NAME";
pub const DEFAULT_SERVICE_NAME: &str = "hello-otel";
pub const DEPLOYMENT_ENV_KEY: &str = "RUST_ENV";
pub const DEFAULT_DEPLOYMENT_ENV: &str = "dev";

/// Startup delay so a collector can discover a freshly started process.
pub const INITIAL_WAIT_KEY: &str = "INITIAL_WAIT_SECONDS";
pub const DEFAULT_INITIAL_WAIT: &str = "1s";

/// Returns the value of `name` from the process environment, or `default`
/// when the variable is unset, empty, or not valid unicode.
pub fn get_config(name: &str, default: &str) -> String {
    lookup_or(|key| std::env::var(key).ok(), name, default)
}

fn lookup_or<F>(lookup: F, name: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

/// A resolved configuration value together with the variable it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Setting {
    pub key: &'static str,
    pub value: String,
}

impl Setting {
    fn resolve<F>(lookup: &F, key: &'static str, default: &str) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            key,
            value: lookup_or(lookup, key, default),
        }
    }

    /// Comma-separated tokens in their original order, exactly as written.
    /// Empty or padded tokens are kept so they can be rejected.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.value.split(',')
    }

    /// Only the exact string `true` enables a flag.
    pub fn is_true(&self) -> bool {
        self.value == "true"
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:?}", self.key, self.value)
    }
}

/// Per-signal exporter selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalConfig {
    /// Comma-separated exporter names.
    pub exporters: Setting,
    /// Pretty-print flag for the `console` exporter.
    pub console_pretty_print: Setting,
}

impl SignalConfig {
    pub fn pretty_print(&self) -> bool {
        self.console_pretty_print.is_true()
    }
}

/// Everything the bootstrap reads from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub propagators: Setting,
    pub traces: SignalConfig,
    pub metrics: SignalConfig,
    pub logs: SignalConfig,
    /// Transport used by every `otlp` exporter.
    pub otlp_protocol: Setting,
    /// Service name reported in resource attributes (`service.name`).
    pub service_name: String,
    /// Service version reported in resource attributes (`service.version`).
    pub service_version: String,
    /// Deployment environment (`deployment.environment`).
    pub deployment_environment: String,
}

impl PipelineConfig {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration through an arbitrary lookup function.
    ///
    /// ```
    /// use hello_otel::config::PipelineConfig;
    ///
    /// let cfg = PipelineConfig::from_lookup(|key| match key {
    ///     "OTEL_TRACES_EXPORTER" => Some("console".to_string()),
    ///     _ => None,
    /// });
    /// assert_eq!(cfg.traces.exporters.value, "console");
    /// assert_eq!(cfg.metrics.exporters.value, "otlp");
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let signal = |exporters_key: &'static str, pretty_key: &'static str| SignalConfig {
            exporters: Setting::resolve(&lookup, exporters_key, DEFAULT_EXPORTER),
            console_pretty_print: Setting::resolve(&lookup, pretty_key, DEFAULT_PRETTY_PRINT),
        };

        Self {
            propagators: Setting::resolve(&lookup, PROPAGATORS_KEY, DEFAULT_PROPAGATORS),
            traces: signal(TRACES_EXPORTER_KEY, CONSOLE_TRACES_PRETTY_PRINT_KEY),
            metrics: signal(METRICS_EXPORTER_KEY, CONSOLE_METRICS_PRETTY_PRINT_KEY),
            logs: signal(LOGS_EXPORTER_KEY, CONSOLE_LOGS_PRETTY_PRINT_KEY),
            otlp_protocol: Setting::resolve(&lookup, OTLP_PROTOCOL_KEY, DEFAULT_OTLP_PROTOCOL),
            service_name: lookup_or(&lookup, SERVICE_NAME_KEY, DEFAULT_SERVICE_NAME),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            deployment_environment: lookup_or(&lookup, DEPLOYMENT_ENV_KEY, DEFAULT_DEPLOYMENT_ENV),
        }
    }

    /// Configuration built from explicit `(variable, value)` pairs; anything
    /// not listed takes its default.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let pairs: Vec<(&str, &str)> = pairs.into_iter().collect();
        Self::from_lookup(|key| {
            pairs
                .iter()
                .rev()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
    }
}

/// Parse a duration such as `300ms`, `1.5s` or `1h30m`.
///
/// Units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`; every number needs
/// one, except a lone `0`. Negative durations are rejected.
pub fn parse_duration(s: &str) -> Option<Duration> {
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() {
        return None;
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut rest = s;
    let mut seconds = 0f64;
    while !rest.is_empty() {
        let number_len = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest.find(is_number).unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        seconds += value * scale;
        rest = &rest[unit_len..];
    }
    Duration::try_from_secs_f64(seconds).ok()
}

/// The startup delay from `INITIAL_WAIT_SECONDS` (default `1s`).
pub fn initial_wait() -> Result<Duration, ConfigError> {
    initial_wait_from(&Setting {
        key: INITIAL_WAIT_KEY,
        value: get_config(INITIAL_WAIT_KEY, DEFAULT_INITIAL_WAIT),
    })
}

fn initial_wait_from(setting: &Setting) -> Result<Duration, ConfigError> {
    parse_duration(&setting.value)
        .ok_or_else(|| ConfigError::new(ConfigErrorKind::Duration, &setting.value, setting))
}
