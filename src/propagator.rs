// SPDX-License-Identifier: MIT
//! Text map propagator selection (`OTEL_PROPAGATORS`).

use std::str::FromStr;

use opentelemetry::propagation::{TextMapCompositePropagator, TextMapPropagator};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};

use crate::config::Setting;
use crate::error::{ConfigError, ConfigErrorKind};

/// Propagators that can be named in `OTEL_PROPAGATORS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropagatorKind {
    TraceContext,
    Baggage,
}

impl FromStr for PropagatorKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tracecontext" => Ok(PropagatorKind::TraceContext),
            "baggage" => Ok(PropagatorKind::Baggage),
            _ => Err(()),
        }
    }
}

impl PropagatorKind {
    fn build(self) -> Box<dyn TextMapPropagator + Send + Sync> {
        match self {
            PropagatorKind::TraceContext => Box::new(TraceContextPropagator::new()),
            PropagatorKind::Baggage => Box::new(BaggagePropagator::new()),
        }
    }
}

/// Parse the propagator list, preserving order. Fails on the first
/// unrecognised token.
pub fn parse_propagators(setting: &Setting) -> Result<Vec<PropagatorKind>, ConfigError> {
    setting
        .tokens()
        .map(|token| {
            token
                .parse()
                .map_err(|()| ConfigError::new(ConfigErrorKind::Propagator, token, setting))
        })
        .collect()
}

/// Build the composite propagator described by `setting`.
///
/// Later propagators may overwrite carrier keys written by earlier ones, so
/// the order in the variable is kept as-is.
pub fn new_propagator(setting: &Setting) -> Result<TextMapCompositePropagator, ConfigError> {
    let propagators = parse_propagators(setting)?
        .into_iter()
        .map(PropagatorKind::build)
        .collect();
    Ok(TextMapCompositePropagator::new(propagators))
}
