// SPDX-License-Identifier: MIT
//! Human-readable exporters writing to standard output.
//!
//! Each exported span, metric or log record becomes one JSON document. By
//! default documents are single-line; with pretty printing enabled they are
//! indented over several lines. Output goes through a [`ConsoleSink`] so tests
//! can capture it.

use std::fmt;
use std::future::{ready, Future};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use opentelemetry::logs::AnyValue;
use opentelemetry::{InstrumentationScope, KeyValue};
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::logs::{LogBatch, LogExporter};
use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData, ResourceMetrics};
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_sdk::metrics::Temporality;
use opentelemetry_sdk::trace::{SpanData, SpanExporter};
use opentelemetry_sdk::Resource;
use serde_json::{json, Map, Value};

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Destination shared by the console exporters.
#[derive(Clone)]
pub struct ConsoleSink {
    writer: SharedWriter,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    fn write_documents(&self, documents: &[Value], pretty: bool) -> OTelSdkResult {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| OTelSdkError::InternalFailure("console writer poisoned".into()))?;
        for doc in documents {
            let rendered = if pretty {
                serde_json::to_string_pretty(doc)
            } else {
                serde_json::to_string(doc)
            }
            .map_err(|e| OTelSdkError::InternalFailure(e.to_string()))?;
            writeln!(writer, "{rendered}").map_err(|e| OTelSdkError::InternalFailure(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| OTelSdkError::InternalFailure(e.to_string()))
    }
}

impl fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleSink").finish_non_exhaustive()
    }
}

fn unix_nanos(t: SystemTime) -> u64 {
    let nanos = t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_nanos();
    u64::try_from(nanos).unwrap_or(u64::MAX)
}

fn attributes_json<'a>(attrs: impl IntoIterator<Item = &'a KeyValue>) -> Value {
    let map: Map<String, Value> = attrs
        .into_iter()
        .map(|kv| (kv.key.to_string(), Value::String(kv.value.to_string())))
        .collect();
    Value::Object(map)
}

fn scope_json(scope: &InstrumentationScope) -> Value {
    json!({
        "name": scope.name(),
        "version": scope.version(),
    })
}

fn resource_json(resource: &Resource) -> Value {
    let map: Map<String, Value> = resource
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
    Value::Object(map)
}

/// Span exporter rendering [`SpanData`] as JSON.
#[derive(Debug)]
pub struct ConsoleSpanExporter {
    sink: ConsoleSink,
    pretty: bool,
    resource: Value,
}

impl ConsoleSpanExporter {
    pub fn new(sink: ConsoleSink, pretty: bool) -> Self {
        Self {
            sink,
            pretty,
            resource: Value::Null,
        }
    }

    fn render(&self, span: &SpanData) -> Value {
        let events: Vec<Value> = span
            .events
            .events
            .iter()
            .map(|event| {
                json!({
                    "name": event.name,
                    "time_unix_nano": unix_nanos(event.timestamp),
                    "attributes": attributes_json(&event.attributes),
                })
            })
            .collect();

        json!({
            "name": span.name,
            "trace_id": span.span_context.trace_id().to_string(),
            "span_id": span.span_context.span_id().to_string(),
            "parent_span_id": span.parent_span_id.to_string(),
            "kind": format!("{:?}", span.span_kind),
            "start_time_unix_nano": unix_nanos(span.start_time),
            "end_time_unix_nano": unix_nanos(span.end_time),
            "attributes": attributes_json(&span.attributes),
            "events": events,
            "status": format!("{:?}", span.status),
            "scope": scope_json(&span.instrumentation_scope),
            "resource": self.resource,
        })
    }
}

impl SpanExporter for ConsoleSpanExporter {
    fn export(&self, batch: Vec<SpanData>) -> impl Future<Output = OTelSdkResult> + Send {
        let documents: Vec<Value> = batch.iter().map(|span| self.render(span)).collect();
        ready(self.sink.write_documents(&documents, self.pretty))
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.resource = resource_json(resource);
    }
}

fn any_value_json(value: &AnyValue) -> Value {
    match value {
        AnyValue::Int(i) => json!(i),
        AnyValue::Double(d) => json!(d),
        AnyValue::String(s) => Value::String(s.as_str().to_string()),
        AnyValue::Boolean(b) => Value::Bool(*b),
        AnyValue::ListAny(items) => Value::Array(items.iter().map(any_value_json).collect()),
        AnyValue::Map(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.to_string(), any_value_json(v)))
                .collect(),
        ),
        other => Value::String(format!("{other:?}")),
    }
}

/// Log exporter rendering each record of a [`LogBatch`] as JSON.
#[derive(Debug)]
pub struct ConsoleLogExporter {
    sink: ConsoleSink,
    pretty: bool,
    resource: Value,
}

impl ConsoleLogExporter {
    pub fn new(sink: ConsoleSink, pretty: bool) -> Self {
        Self {
            sink,
            pretty,
            resource: Value::Null,
        }
    }
}

impl LogExporter for ConsoleLogExporter {
    fn export(&self, batch: LogBatch<'_>) -> impl Future<Output = OTelSdkResult> + Send {
        let documents: Vec<Value> = batch
            .iter()
            .map(|(record, scope)| {
                let attributes: Map<String, Value> = record
                    .attributes_iter()
                    .map(|(k, v)| (k.to_string(), any_value_json(v)))
                    .collect();
                let trace = record.trace_context().map(|cx| {
                    json!({
                        "trace_id": cx.trace_id.to_string(),
                        "span_id": cx.span_id.to_string(),
                    })
                });
                json!({
                    "time_unix_nano": record.timestamp().map(unix_nanos),
                    "severity_text": record.severity_text(),
                    "severity_number": record.severity_number().map(|s| s as i32),
                    "body": record.body().map(any_value_json),
                    "attributes": attributes,
                    "trace_context": trace,
                    "scope": scope_json(scope),
                    "resource": self.resource,
                })
            })
            .collect();
        ready(self.sink.write_documents(&documents, self.pretty))
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.resource = resource_json(resource);
    }
}

macro_rules! data_points_json {
    ($data:expr) => {
        match $data {
            MetricData::Sum(sum) => json!({
                "type": "sum",
                "monotonic": sum.is_monotonic(),
                "data_points": sum
                    .data_points()
                    .map(|dp| json!({
                        "value": dp.value(),
                        "attributes": attributes_json(dp.attributes()),
                    }))
                    .collect::<Vec<_>>(),
            }),
            MetricData::Gauge(gauge) => json!({
                "type": "gauge",
                "data_points": gauge
                    .data_points()
                    .map(|dp| json!({
                        "value": dp.value(),
                        "attributes": attributes_json(dp.attributes()),
                    }))
                    .collect::<Vec<_>>(),
            }),
            MetricData::Histogram(hist) => json!({
                "type": "histogram",
                "data_points": hist
                    .data_points()
                    .map(|dp| json!({
                        "count": dp.count(),
                        "sum": dp.sum(),
                        "attributes": attributes_json(dp.attributes()),
                    }))
                    .collect::<Vec<_>>(),
            }),
            MetricData::ExponentialHistogram(hist) => json!({
                "type": "exponential_histogram",
                "data_points": hist
                    .data_points()
                    .map(|dp| json!({
                        "count": dp.count(),
                        "sum": dp.sum(),
                        "attributes": attributes_json(dp.attributes()),
                    }))
                    .collect::<Vec<_>>(),
            }),
        }
    };
}

/// Push exporter rendering each collected metric as JSON.
#[derive(Debug)]
pub struct ConsoleMetricExporter {
    sink: ConsoleSink,
    pretty: bool,
}

impl ConsoleMetricExporter {
    pub fn new(sink: ConsoleSink, pretty: bool) -> Self {
        Self { sink, pretty }
    }

    fn render(&self, metrics: &ResourceMetrics) -> Vec<Value> {
        let resource = resource_json(metrics.resource());
        let mut documents = Vec::new();
        for scope_metrics in metrics.scope_metrics() {
            for metric in scope_metrics.metrics() {
                let data = match metric.data() {
                    AggregatedMetrics::F64(data) => data_points_json!(data),
                    AggregatedMetrics::U64(data) => data_points_json!(data),
                    AggregatedMetrics::I64(data) => data_points_json!(data),
                };
                documents.push(json!({
                    "name": metric.name(),
                    "description": metric.description(),
                    "unit": metric.unit(),
                    "data": data,
                    "scope": scope_json(scope_metrics.scope()),
                    "resource": resource,
                }));
            }
        }
        documents
    }
}

impl PushMetricExporter for ConsoleMetricExporter {
    fn export(&self, metrics: &ResourceMetrics) -> impl Future<Output = OTelSdkResult> + Send {
        let documents = self.render(metrics);
        ready(self.sink.write_documents(&documents, self.pretty))
    }

    fn force_flush(&self) -> OTelSdkResult {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
        Ok(())
    }

    fn temporality(&self) -> Temporality {
        Temporality::Cumulative
    }
}
