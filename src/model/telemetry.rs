use super::attributes::Attributes;

/// The attribute set describing the origin of a group of items
/// (`spec.md` GLOSSARY: "Resource").
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resource {
    pub attributes: Attributes,
}

/// An instrumentation library identifier within a resource group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Scope {
    pub name: String,
    pub version: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpanKind {
    #[default]
    Unspecified,
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

impl SpanKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "",
            Self::Internal => "internal",
            Self::Server => "server",
            Self::Client => "client",
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusCode {
    #[default]
    Unset,
    Ok,
    Error,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanStatus {
    pub code: StatusCode,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp_unix_nano: u64,
    pub attributes: Attributes,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Span {
    pub name: String,
    pub kind: SpanKind,
    pub status: SpanStatus,
    pub start_unix_nano: u64,
    pub end_unix_nano: u64,
    pub attributes: Attributes,
    pub events: Vec<SpanEvent>,
}

impl Span {
    /// Span duration in whole milliseconds, per `spec.md` §3's feature
    /// record layout: `(end - start) / 1_000_000`.
    #[must_use]
    pub const fn duration_ms(&self) -> u64 {
        self.end_unix_nano.saturating_sub(self.start_unix_nano) / 1_000_000
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScopeSpans {
    pub scope: Scope,
    pub spans: Vec<Span>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceSpans {
    pub resource: Resource,
    pub scopes: Vec<ScopeSpans>,
}

/// A trace batch: `ResourceSpans -> ScopeSpans -> Span` (`spec.md` §3).
pub type TraceBatch = Vec<ResourceSpans>;

/// Severity number ordinal; `spec.md` §3: values >= 17 mean ERROR.
pub const SEVERITY_ERROR_THRESHOLD: i32 = 17;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogRecord {
    pub timestamp_unix_nano: u64,
    pub severity_number: i32,
    pub severity_text: String,
    pub body: String,
    pub attributes: Attributes,
}

impl LogRecord {
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.severity_number >= SEVERITY_ERROR_THRESHOLD
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScopeLogs {
    pub scope: Scope,
    pub records: Vec<LogRecord>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceLogs {
    pub resource: Resource,
    pub scopes: Vec<ScopeLogs>,
}

pub type LogBatch = Vec<ResourceLogs>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MetricTemporality {
    #[default]
    Unspecified,
    Delta,
    Cumulative,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MetricPointValue {
    Gauge(f64),
    Sum(f64),
    Histogram { count: u64, sum: f64 },
    Summary { count: u64, sum: f64 },
    ExponentialHistogram { count: u64, sum: f64 },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricPoint {
    pub attributes: Attributes,
    pub timestamp_unix_nano: u64,
    pub value: Option<MetricPointValue>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metric {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub is_monotonic: bool,
    pub temporality: MetricTemporality,
    pub points: Vec<MetricPoint>,
}

impl Default for MetricPointValue {
    fn default() -> Self {
        Self::Gauge(0.0)
    }
}

impl Metric {
    /// Whether this metric's points are, by default, passed through
    /// inference opaquely (`spec.md` §4.4.3: histograms/summaries are
    /// traversed but not inferred on by default).
    #[must_use]
    pub fn is_opaque_by_default(&self) -> bool {
        self.points.iter().any(|p| {
            matches!(
                p.value,
                Some(
                    MetricPointValue::Histogram { .. }
                        | MetricPointValue::Summary { .. }
                        | MetricPointValue::ExponentialHistogram { .. }
                )
            )
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScopeMetrics {
    pub scope: Scope,
    pub metrics: Vec<Metric>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceMetrics {
    pub resource: Resource,
    pub scopes: Vec<ScopeMetrics>,
}

pub type MetricBatch = Vec<ResourceMetrics>;
