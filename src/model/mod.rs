//! The telemetry data model the core operates on.
//!
//! This is deliberately not wire-compatible with any specific OTLP protobuf
//! crate -- the transport and wire format are external collaborators
//! (`spec.md` §1). Receivers/exporters convert to and from these shapes at
//! the pipeline boundary.

mod attributes;
mod telemetry;

pub use attributes::{AttributeValue, Attributes, set_attribute};
pub use telemetry::{
    LogBatch, LogRecord, Metric, MetricBatch, MetricPoint, MetricPointValue, Resource,
    ResourceLogs, ResourceMetrics, ResourceSpans, Scope, ScopeLogs, ScopeMetrics, ScopeSpans,
    Span, SpanEvent, SpanKind, SpanStatus, StatusCode, TraceBatch,
};
