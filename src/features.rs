//! Feature record construction (`spec.md` §3).
//!
//! The feature record is both the WASM call's input and the cache key's
//! preimage, so its shape must be exact: the keys named in `spec.md` §3,
//! serialized as canonical JSON with sorted keys (handled by
//! [`crate::fingerprint::canonicalize`] downstream -- this module only
//! builds the `serde_json::Value` tree).

use serde_json::{Map, Value, json};

use crate::model::{Attributes, LogRecord, Metric, MetricPoint, MetricPointValue, Resource, Span};

fn attributes_to_json(attributes: &Attributes) -> Value {
    let mut map = Map::new();
    for (key, value) in attributes {
        map.insert(key.clone(), value.to_json());
    }
    Value::Object(map)
}

/// Builds the feature record for a span (`spec.md` §3: `name`, `status`,
/// `kind`, `duration` in milliseconds, `attributes`, `resource`).
#[must_use]
pub fn span_feature_record(span: &Span, resource: &Resource) -> Value {
    json!({
        "name": span.name,
        "status": span.status.message,
        "kind": span.kind.as_str(),
        "duration": span.duration_ms(),
        "attributes": attributes_to_json(&span.attributes),
        "resource": attributes_to_json(&resource.attributes),
    })
}

/// Builds the feature record for a log record. `kind` and `duration` are
/// empty/zero -- logs have neither a span kind nor a duration.
#[must_use]
pub fn log_feature_record(record: &LogRecord, resource: &Resource) -> Value {
    json!({
        "name": record.severity_text,
        "status": record.body,
        "kind": "",
        "duration": 0,
        "attributes": attributes_to_json(&record.attributes),
        "resource": attributes_to_json(&resource.attributes),
    })
}

/// Builds the feature record for one data point of a metric, including
/// the type-specific metadata `spec.md` §3/§4.4.3 permit
/// (`description`, `unit`, `is_monotonic`, the point's `value`).
#[must_use]
pub fn metric_point_feature_record(
    metric: &Metric,
    point: &MetricPoint,
    resource: &Resource,
) -> Value {
    let value = point.value.as_ref().map_or(Value::Null, |v| match v {
        MetricPointValue::Gauge(v) | MetricPointValue::Sum(v) => {
            serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number)
        }
        MetricPointValue::Histogram { sum, .. }
        | MetricPointValue::Summary { sum, .. }
        | MetricPointValue::ExponentialHistogram { sum, .. } => {
            serde_json::Number::from_f64(*sum).map_or(Value::Null, Value::Number)
        }
    });

    json!({
        "name": metric.name,
        "status": "",
        "kind": "",
        "duration": 0,
        "attributes": attributes_to_json(&point.attributes),
        "resource": attributes_to_json(&resource.attributes),
        "description": metric.description,
        "unit": metric.unit,
        "is_monotonic": metric.is_monotonic,
        "value": value,
    })
}
