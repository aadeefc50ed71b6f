// SPDX-License-Identifier: MIT
//! Exporter selection and per-signal provider construction.
//!
//! Each factory walks its exporter list in order and attaches one exporter per
//! name: `otlp` through the SDK's OTLP exporter, `console` through
//! [`crate::console`], `none` not at all. OTLP endpoint, headers and TLS come
//! from the exporter's own `OTEL_EXPORTER_OTLP_*` handling.
//!
//! Building an exporter never waits for a connection; only malformed
//! transport configuration fails here.

use std::str::FromStr;

use opentelemetry::KeyValue;
use opentelemetry_otlp::{LogExporter, MetricExporter, Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;

use crate::config::{PipelineConfig, Setting, SignalConfig};
use crate::console::{ConsoleLogExporter, ConsoleMetricExporter, ConsoleSink, ConsoleSpanExporter};
use crate::error::{BootstrapError, ConfigError, ConfigErrorKind, Signal};

/// Exporters that can be named in `OTEL_{TRACES,METRICS,LOGS}_EXPORTER`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExporterKind {
    Otlp,
    Console,
    None,
}

impl FromStr for ExporterKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "otlp" => Ok(ExporterKind::Otlp),
            "console" => Ok(ExporterKind::Console),
            "none" => Ok(ExporterKind::None),
            _ => Err(()),
        }
    }
}

/// Transport for `otlp` exporters (`OTEL_EXPORTER_OTLP_PROTOCOL`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtlpProtocol {
    Grpc,
    HttpProtobuf,
}

impl OtlpProtocol {
    pub fn from_setting(setting: &Setting) -> Result<Self, ConfigError> {
        match setting.value.as_str() {
            "grpc" => Ok(OtlpProtocol::Grpc),
            "http/protobuf" => Ok(OtlpProtocol::HttpProtobuf),
            other => Err(ConfigError::new(ConfigErrorKind::Protocol, other, setting)),
        }
    }
}

/// Parse an exporter list, preserving order and repeats.
pub fn parse_exporters(setting: &Setting) -> Result<Vec<ExporterKind>, ConfigError> {
    setting
        .tokens()
        .map(|token| {
            token
                .parse()
                .map_err(|()| ConfigError::new(ConfigErrorKind::Exporter, token, setting))
        })
        .collect()
}

/// Resource shared by all three providers.
pub fn build_resource(cfg: &PipelineConfig) -> Resource {
    Resource::builder()
        .with_service_name(cfg.service_name.clone())
        .with_attributes([
            KeyValue::new("service.version", cfg.service_version.clone()),
            KeyValue::new("deployment.environment", cfg.deployment_environment.clone()),
        ])
        .build()
}

/// Everything a provider factory needs besides its own signal settings.
#[derive(Clone, Debug)]
pub struct PipelineContext {
    pub resource: Resource,
    pub protocol: OtlpProtocol,
    pub console: ConsoleSink,
}

impl PipelineContext {
    pub fn new(cfg: &PipelineConfig, console: ConsoleSink) -> Result<Self, ConfigError> {
        Ok(Self {
            resource: build_resource(cfg),
            protocol: OtlpProtocol::from_setting(&cfg.otlp_protocol)?,
            console,
        })
    }
}

fn exporter_error(signal: Signal) -> impl FnOnce(opentelemetry_otlp::ExporterBuildError) -> BootstrapError {
    move |source| BootstrapError::Exporter { signal, source }
}

fn otlp_span_exporter(protocol: OtlpProtocol) -> Result<SpanExporter, BootstrapError> {
    let built = match protocol {
        OtlpProtocol::Grpc => SpanExporter::builder().with_tonic().build(),
        OtlpProtocol::HttpProtobuf => SpanExporter::builder()
            .with_http()
            .with_protocol(Protocol::HttpBinary)
            .build(),
    };
    built.map_err(exporter_error(Signal::Traces))
}

fn otlp_metric_exporter(protocol: OtlpProtocol) -> Result<MetricExporter, BootstrapError> {
    let built = match protocol {
        OtlpProtocol::Grpc => MetricExporter::builder().with_tonic().build(),
        OtlpProtocol::HttpProtobuf => MetricExporter::builder()
            .with_http()
            .with_protocol(Protocol::HttpBinary)
            .build(),
    };
    built.map_err(exporter_error(Signal::Metrics))
}

fn otlp_log_exporter(protocol: OtlpProtocol) -> Result<LogExporter, BootstrapError> {
    let built = match protocol {
        OtlpProtocol::Grpc => LogExporter::builder().with_tonic().build(),
        OtlpProtocol::HttpProtobuf => LogExporter::builder()
            .with_http()
            .with_protocol(Protocol::HttpBinary)
            .build(),
    };
    built.map_err(exporter_error(Signal::Logs))
}

/// Build the tracer provider; every exporter is attached through a batch
/// span processor.
pub fn new_tracer_provider(
    signal: &SignalConfig,
    cx: &PipelineContext,
) -> Result<SdkTracerProvider, BootstrapError> {
    let mut builder = SdkTracerProvider::builder().with_resource(cx.resource.clone());
    for exporter in parse_exporters(&signal.exporters)? {
        builder = match exporter {
            ExporterKind::Otlp => builder.with_batch_exporter(otlp_span_exporter(cx.protocol)?),
            ExporterKind::Console => builder.with_batch_exporter(ConsoleSpanExporter::new(
                cx.console.clone(),
                signal.pretty_print(),
            )),
            ExporterKind::None => builder,
        };
    }
    Ok(builder.build())
}

/// Build the meter provider; every exporter is attached through a periodic
/// reader.
pub fn new_meter_provider(
    signal: &SignalConfig,
    cx: &PipelineContext,
) -> Result<SdkMeterProvider, BootstrapError> {
    let mut builder = SdkMeterProvider::builder().with_resource(cx.resource.clone());
    for exporter in parse_exporters(&signal.exporters)? {
        builder = match exporter {
            ExporterKind::Otlp => builder
                .with_reader(PeriodicReader::builder(otlp_metric_exporter(cx.protocol)?).build()),
            ExporterKind::Console => builder.with_reader(
                PeriodicReader::builder(ConsoleMetricExporter::new(
                    cx.console.clone(),
                    signal.pretty_print(),
                ))
                .build(),
            ),
            ExporterKind::None => builder,
        };
    }
    Ok(builder.build())
}

/// Build the logger provider; every exporter is attached through a batch log
/// processor.
pub fn new_logger_provider(
    signal: &SignalConfig,
    cx: &PipelineContext,
) -> Result<SdkLoggerProvider, BootstrapError> {
    let mut builder = SdkLoggerProvider::builder().with_resource(cx.resource.clone());
    for exporter in parse_exporters(&signal.exporters)? {
        builder = match exporter {
            ExporterKind::Otlp => builder.with_batch_exporter(otlp_log_exporter(cx.protocol)?),
            ExporterKind::Console => builder.with_batch_exporter(ConsoleLogExporter::new(
                cx.console.clone(),
                signal.pretty_print(),
            )),
            ExporterKind::None => builder,
        };
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CONSOLE_LOGS_PRETTY_PRINT_KEY, CONSOLE_TRACES_PRETTY_PRINT_KEY, LOGS_EXPORTER_KEY,
        METRICS_EXPORTER_KEY, OTLP_PROTOCOL_KEY, TRACES_EXPORTER_KEY,
    };
    use crate::console::tests::Captured;
    use opentelemetry::logs::{LogRecord as _, Logger as _, LoggerProvider as _, Severity};
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry::trace::{Tracer as _, TracerProvider as _};
    use serde_json::Value;

    fn context(cfg: &PipelineConfig, captured: &Captured) -> PipelineContext {
        PipelineContext::new(cfg, ConsoleSink::from_writer(captured.clone())).unwrap()
    }

    #[test]
    fn exporter_lists_keep_order_and_repeats() {
        let setting = Setting {
            key: TRACES_EXPORTER_KEY,
            value: "console,otlp,console,none".to_string(),
        };
        assert_eq!(
            parse_exporters(&setting).unwrap(),
            vec![
                ExporterKind::Console,
                ExporterKind::Otlp,
                ExporterKind::Console,
                ExporterKind::None
            ]
        );
    }

    #[test]
    fn unknown_exporter_names_token_variable_and_value() {
        let setting = Setting {
            key: METRICS_EXPORTER_KEY,
            value: "console,prometheus".to_string(),
        };
        let err = parse_exporters(&setting).unwrap_err();
        assert_eq!(err.token, "prometheus");
        assert_eq!(
            err.to_string(),
            r#"unsupported exporter: "prometheus" from OTEL_METRICS_EXPORTER="console,prometheus""#
        );
    }

    #[test]
    fn exporter_names_are_case_sensitive() {
        let setting = Setting {
            key: LOGS_EXPORTER_KEY,
            value: "OTLP".to_string(),
        };
        assert_eq!(parse_exporters(&setting).unwrap_err().token, "OTLP");
    }

    #[test]
    fn padded_exporter_name_is_reported_as_written() {
        let setting = Setting {
            key: TRACES_EXPORTER_KEY,
            value: "none, console".to_string(),
        };
        let err = parse_exporters(&setting).unwrap_err();
        assert_eq!(err.token, " console");
        assert_eq!(err.value, "none, console");
    }

    #[test]
    fn protocol_selection() {
        let grpc = PipelineConfig::from_pairs([]);
        assert_eq!(OtlpProtocol::from_setting(&grpc.otlp_protocol), Ok(OtlpProtocol::Grpc));

        let http = PipelineConfig::from_pairs([(OTLP_PROTOCOL_KEY, "http/protobuf")]);
        assert_eq!(
            OtlpProtocol::from_setting(&http.otlp_protocol),
            Ok(OtlpProtocol::HttpProtobuf)
        );

        let json = PipelineConfig::from_pairs([(OTLP_PROTOCOL_KEY, "http/json")]);
        let err = OtlpProtocol::from_setting(&json.otlp_protocol).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::Protocol);
        assert_eq!(err.token, "http/json");

        let padded = PipelineConfig::from_pairs([(OTLP_PROTOCOL_KEY, " grpc")]);
        let err = OtlpProtocol::from_setting(&padded.otlp_protocol).unwrap_err();
        assert_eq!(err.token, " grpc");
    }

    #[test]
    fn unknown_exporter_returns_no_provider() {
        let cfg = PipelineConfig::from_pairs([(TRACES_EXPORTER_KEY, "console,jaeger")]);
        let captured = Captured::default();
        let err = new_tracer_provider(&cfg.traces, &context(&cfg, &captured)).unwrap_err();
        assert_eq!(err.config_error().map(|e| e.token.as_str()), Some("jaeger"));
    }

    #[test]
    fn console_traces_pretty_print_to_the_sink() {
        let cfg = PipelineConfig::from_pairs([
            (TRACES_EXPORTER_KEY, "console"),
            (CONSOLE_TRACES_PRETTY_PRINT_KEY, "true"),
        ]);
        let captured = Captured::default();
        let provider = new_tracer_provider(&cfg.traces, &context(&cfg, &captured)).unwrap();

        provider.tracer("pipeline-test").in_span("work", |_cx| {});
        provider.force_flush().unwrap();
        provider.shutdown().unwrap();

        let out = captured.contents();
        assert!(out.lines().count() > 1, "{out}");
        let doc: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(doc["name"], "work");
    }

    #[test]
    fn console_metrics_report_counter_values() {
        let cfg = PipelineConfig::from_pairs([(METRICS_EXPORTER_KEY, "console")]);
        let captured = Captured::default();
        let provider = new_meter_provider(&cfg.metrics, &context(&cfg, &captured)).unwrap();

        let counter = provider
            .meter("pipeline-test")
            .u64_counter("hello.invocations")
            .build();
        counter.add(1, &[KeyValue::new("key1", "value1")]);
        provider.force_flush().unwrap();
        provider.shutdown().unwrap();

        let out = captured.contents();
        let doc: Value = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert_eq!(doc["name"], "hello.invocations");
        assert_eq!(doc["data"]["type"], "sum");
        assert_eq!(doc["data"]["data_points"][0]["value"], 1);
        assert_eq!(doc["data"]["data_points"][0]["attributes"]["key1"], "value1");
    }

    #[test]
    fn console_logs_compact_by_default() {
        let cfg = PipelineConfig::from_pairs([
            (LOGS_EXPORTER_KEY, "console"),
            (CONSOLE_LOGS_PRETTY_PRINT_KEY, "false"),
        ]);
        let captured = Captured::default();
        let provider = new_logger_provider(&cfg.logs, &context(&cfg, &captured)).unwrap();

        let logger = provider.logger("pipeline-test");
        let mut record = logger.create_log_record();
        record.set_body("Hello World!".into());
        record.set_severity_number(Severity::Info);
        record.set_severity_text("INFO");
        logger.emit(record);
        provider.force_flush().unwrap();
        provider.shutdown().unwrap();

        let out = captured.contents();
        assert_eq!(out.lines().count(), 1, "{out}");
        let doc: Value = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(doc["body"], "Hello World!");
        assert_eq!(doc["severity_text"], "INFO");
    }

    #[test]
    fn none_builds_an_empty_provider() {
        let cfg = PipelineConfig::from_pairs([
            (TRACES_EXPORTER_KEY, "none"),
            (METRICS_EXPORTER_KEY, "none"),
            (LOGS_EXPORTER_KEY, "none"),
        ]);
        let captured = Captured::default();
        let cx = context(&cfg, &captured);

        let tracer_provider = new_tracer_provider(&cfg.traces, &cx).unwrap();
        tracer_provider.tracer("pipeline-test").in_span("dropped", |_cx| {});
        tracer_provider.shutdown().unwrap();
        new_meter_provider(&cfg.metrics, &cx).unwrap().shutdown().unwrap();
        new_logger_provider(&cfg.logs, &cx).unwrap().shutdown().unwrap();

        assert!(captured.contents().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn otlp_exporters_build_without_a_collector() {
        let cfg = PipelineConfig::from_pairs([]);
        let captured = Captured::default();
        let cx = context(&cfg, &captured);

        assert!(new_tracer_provider(&cfg.traces, &cx).is_ok());
        assert!(new_meter_provider(&cfg.metrics, &cx).is_ok());
        assert!(new_logger_provider(&cfg.logs, &cx).is_ok());
    }
}
