//! End-to-end scenarios spanning the public API: a shared inference
//! runtime driving all three signal processors plus the factory's
//! wiring with a real (unloaded) `WasmRuntime`.

use std::sync::Arc;

use ai_telemetry_stage::config::Config;
use ai_telemetry_stage::factory::ProcessorFactory;
use ai_telemetry_stage::model::{
    Attributes, LogBatch, LogRecord, MetricBatch, MetricPoint, MetricPointValue, Resource,
    ResourceLogs, ResourceMetrics, ResourceSpans, Scope, ScopeLogs, ScopeMetrics, ScopeSpans,
    Span, SpanStatus, StatusCode, TraceBatch, Metric,
};
use ai_telemetry_stage::signal::{Consumer, logs::LogsProcessor, traces::TracesProcessor};
use ai_telemetry_stage::wasm::FakeInferenceRuntime;
use ai_telemetry_stage::config::{FeaturesConfig, OutputConfig, ProcessingConfig, SamplingConfig};
use serde_json::json;

struct CapturingConsumer<T>(tokio::sync::Mutex<Vec<T>>);

impl<T> CapturingConsumer<T> {
    fn new() -> Self {
        Self(tokio::sync::Mutex::new(Vec::new()))
    }
}

#[async_trait::async_trait]
impl Consumer<TraceBatch> for CapturingConsumer<TraceBatch> {
    async fn consume(&self, batch: TraceBatch) -> anyhow::Result<()> {
        self.0.lock().await.push(batch);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Consumer<LogBatch> for CapturingConsumer<LogBatch> {
    async fn consume(&self, batch: LogBatch) -> anyhow::Result<()> {
        self.0.lock().await.push(batch);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Consumer<MetricBatch> for CapturingConsumer<MetricBatch> {
    async fn consume(&self, batch: MetricBatch) -> anyhow::Result<()> {
        self.0.lock().await.push(batch);
        Ok(())
    }
}

fn error_span() -> Span {
    Span {
        name: "checkout".to_string(),
        status: SpanStatus {
            code: StatusCode::Error,
            message: "payment gateway timeout".to_string(),
        },
        start_unix_nano: 0,
        end_unix_nano: 2_000_000,
        attributes: Attributes::new(),
        ..Span::default()
    }
}

#[tokio::test]
async fn factory_with_no_configured_models_passes_batches_through_unmodified() {
    let factory = ProcessorFactory::new(Config::default()).expect("default config validates");
    let next = Arc::new(CapturingConsumer::<TraceBatch>::new());
    let processor = factory.create_traces(next.clone());

    let input: TraceBatch = vec![ResourceSpans {
        resource: Resource::default(),
        scopes: vec![ScopeSpans {
            scope: Scope::default(),
            spans: vec![error_span()],
        }],
    }];
    processor.consume(input.clone()).await.unwrap();

    let out = next.0.lock().await;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0], input);
}

#[tokio::test]
async fn shared_runtime_drives_traces_and_logs_consistently() {
    let runtime: Arc<dyn ai_telemetry_stage::wasm::InferenceRuntime> =
        Arc::new(FakeInferenceRuntime {
            classify: Box::new(|_| {
                Ok(json!({
                    "category": "timeout",
                    "confidence": 0.9,
                }))
            }),
            sample: Box::new(|_| Ok(json!({"importance": 1.0}))),
            extract: Box::new(|_| Ok(json!({}))),
        });

    let trace_next = Arc::new(CapturingConsumer::<TraceBatch>::new());
    let traces = TracesProcessor::new(
        runtime.clone(),
        trace_next.clone(),
        &ProcessingConfig::default(),
        FeaturesConfig {
            error_classification: true,
            ..FeaturesConfig::default()
        },
        SamplingConfig {
            error_events: 1.0,
            slow_spans: 0.0,
            normal_spans: 0.0,
            threshold_ms: 500,
        },
        OutputConfig::default(),
    );

    let log_next = Arc::new(CapturingConsumer::<LogBatch>::new());
    let logs = LogsProcessor::new(
        runtime,
        log_next.clone(),
        &ProcessingConfig::default(),
        FeaturesConfig {
            error_classification: true,
            ..FeaturesConfig::default()
        },
        SamplingConfig {
            error_events: 1.0,
            slow_spans: 0.0,
            normal_spans: 0.0,
            threshold_ms: 500,
        },
        OutputConfig::default(),
    );

    traces
        .consume(vec![ResourceSpans {
            resource: Resource::default(),
            scopes: vec![ScopeSpans {
                scope: Scope::default(),
                spans: vec![error_span()],
            }],
        }])
        .await
        .unwrap();

    logs.consume(vec![ResourceLogs {
        resource: Resource::default(),
        scopes: vec![ScopeLogs {
            scope: Scope::default(),
            records: vec![LogRecord {
                body: "payment gateway timeout".to_string(),
                severity_number: 17,
                attributes: Attributes::new(),
                ..LogRecord::default()
            }],
        }],
    }])
    .await
    .unwrap();

    let trace_out = trace_next.0.lock().await;
    let log_out = log_next.0.lock().await;

    let span_attrs = &trace_out[0][0].scopes[0].spans[0].attributes;
    let log_attrs = &log_out[0][0].scopes[0].records[0].attributes;

    for attrs in [span_attrs, log_attrs] {
        assert_eq!(
            attrs.get("ai.category"),
            Some(&ai_telemetry_stage::model::AttributeValue::Str("timeout".into()))
        );
    }
}

#[tokio::test]
async fn metrics_processor_prunes_only_the_metric_whose_point_is_dropped() {
    // importance == 1.0 for "keep-me", 0.0 for "drop-me"; normal_spans == 1.0
    // so p == importance exactly, making the keep decision deterministic.
    let runtime: Arc<dyn ai_telemetry_stage::wasm::InferenceRuntime> =
        Arc::new(FakeInferenceRuntime {
            classify: Box::new(|_| Ok(json!({}))),
            sample: Box::new(|features| {
                let importance = if features["name"] == "keep-me" { 1.0 } else { 0.0 };
                Ok(json!({"importance": importance}))
            }),
            extract: Box::new(|_| Ok(json!({}))),
        });

    let next = Arc::new(CapturingConsumer::<MetricBatch>::new());
    let processor = ai_telemetry_stage::signal::metrics::MetricsProcessor::new(
        runtime,
        next.clone(),
        &ProcessingConfig::default(),
        FeaturesConfig {
            smart_sampling: true,
            ..FeaturesConfig::default()
        },
        SamplingConfig {
            normal_spans: 1.0,
            ..SamplingConfig::default()
        },
        OutputConfig::default(),
    );

    let gauge_point = || MetricPoint {
        value: Some(MetricPointValue::Gauge(1.0)),
        ..MetricPoint::default()
    };
    let batch: MetricBatch = vec![ResourceMetrics {
        resource: Resource::default(),
        scopes: vec![ScopeMetrics {
            scope: Scope::default(),
            metrics: vec![
                Metric {
                    name: "keep-me".to_string(),
                    points: vec![gauge_point()],
                    ..Metric::default()
                },
                Metric {
                    name: "drop-me".to_string(),
                    points: vec![gauge_point()],
                    ..Metric::default()
                },
            ],
        }],
    }];
    processor.consume(batch).await.unwrap();

    let out = next.0.lock().await;
    let metrics = &out[0][0].scopes[0].metrics;
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].name, "keep-me");
}
