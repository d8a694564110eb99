//! Traces processor (`spec.md` §4.4.1).

use std::sync::Arc;

use crate::config::{FeaturesConfig, OutputConfig, ProcessingConfig, SamplingConfig};
use crate::error::{Error, Result};
use crate::features::span_feature_record;
use crate::model::{ResourceSpans, Scope, ScopeSpans, StatusCode, TraceBatch};
use crate::pool::WorkerPool;
use crate::wasm::InferenceRuntime;

use super::{Consumer, map_parallel_or_serial, sample_fallback_to_normal_rate, write_enrichment};

/// Enriches spans with error-classification/entity-extraction attributes,
/// then rebuilds the batch according to the sampling verdicts
/// (`spec.md` §4.4.1). `context_linking` is accepted in configuration but
/// has no effect (reserved, `spec.md` §9).
pub struct TracesProcessor {
    runtime: Arc<dyn InferenceRuntime>,
    pool: Option<WorkerPool>,
    next: Arc<dyn Consumer<TraceBatch>>,
    features: FeaturesConfig,
    sampling: SamplingConfig,
    output: OutputConfig,
}

impl TracesProcessor {
    #[must_use]
    pub fn new(
        runtime: Arc<dyn InferenceRuntime>,
        next: Arc<dyn Consumer<TraceBatch>>,
        processing: &ProcessingConfig,
        features: FeaturesConfig,
        sampling: SamplingConfig,
        output: OutputConfig,
    ) -> Self {
        let pool = processing
            .enable_parallel_processing
            .then(|| WorkerPool::new(processing.max_parallel_workers));
        Self {
            runtime,
            pool,
            next,
            features,
            sampling,
            output,
        }
    }

    /// # Errors
    /// Surfaces only downstream forwarding failures -- per-item inference
    /// failures are swallowed (`spec.md` §4.4 "Failure semantics").
    pub async fn consume(&self, mut batch: TraceBatch) -> Result<()> {
        self.enrich(&mut batch).await;

        let sampling_enabled = self.features.smart_sampling
            || self.sampling.error_events > 0.0
            || self.sampling.slow_spans > 0.0;
        let out = if sampling_enabled {
            self.sample(&batch).await
        } else {
            batch
        };

        self.next
            .consume(out)
            .await
            .map_err(Error::Pipeline)
    }

    pub async fn shutdown(self) -> Result<()> {
        if let Some(pool) = self.pool {
            pool.shutdown().await;
        }
        Ok(())
    }

    async fn enrich(&self, batch: &mut TraceBatch) {
        if !(self.features.error_classification || self.features.entity_extraction) {
            return;
        }

        let mut index = Vec::new();
        let mut items = Vec::new();
        for (ri, rs) in batch.iter().enumerate() {
            for (si, ss) in rs.scopes.iter().enumerate() {
                for (spi, span) in ss.spans.iter().enumerate() {
                    let features = span_feature_record(span, &rs.resource);
                    let is_error = span.status.code == StatusCode::Error;
                    index.push((ri, si, spi));
                    items.push((features, is_error));
                }
            }
        }
        if items.is_empty() {
            return;
        }

        let runtime = self.runtime.clone();
        let do_classify = self.features.error_classification;
        let do_extract = self.features.entity_extraction;
        let results = map_parallel_or_serial(
            self.pool.as_ref(),
            items,
            move |(features, is_error)| {
                let runtime = runtime.clone();
                async move {
                    let classify = if do_classify && is_error {
                        runtime.classify_error(&features).await.ok()
                    } else {
                        None
                    };
                    let extract = if do_extract {
                        runtime.extract_entities(&features).await.ok()
                    } else {
                        None
                    };
                    (classify, extract)
                }
            },
        )
        .await;

        let namespace = self.output.attribute_namespace.as_str();
        let max_len = self.output.max_attribute_length;
        for ((ri, si, spi), (classify, extract)) in index.into_iter().zip(results) {
            let span = &mut batch[ri].scopes[si].spans[spi];
            if let Some(result) = classify {
                write_enrichment(&mut span.attributes, &result, namespace, max_len);
            }
            if let Some(result) = extract {
                write_enrichment(&mut span.attributes, &result, namespace, max_len);
            }
        }
    }

    async fn sample(&self, batch: &TraceBatch) -> TraceBatch {
        let mut index = Vec::new();
        let mut items = Vec::new();
        for (ri, rs) in batch.iter().enumerate() {
            for (si, ss) in rs.scopes.iter().enumerate() {
                for (spi, span) in ss.spans.iter().enumerate() {
                    let is_error = span.status.code == StatusCode::Error;
                    let is_slow = span.duration_ms() > self.sampling.threshold_ms;
                    let features = span_feature_record(span, &rs.resource);
                    index.push((ri, si, spi));
                    items.push((features, is_error, is_slow));
                }
            }
        }

        let runtime = self.runtime.clone();
        let error_events = self.sampling.error_events;
        let slow_spans = self.sampling.slow_spans;
        let normal_spans = self.sampling.normal_spans;
        let do_sample = self.features.smart_sampling;

        let keep = map_parallel_or_serial(
            self.pool.as_ref(),
            items,
            move |(features, is_error, is_slow)| {
                let runtime = runtime.clone();
                async move {
                    if is_error && error_events >= 1.0 {
                        return true;
                    }
                    if is_slow && slow_spans >= 1.0 {
                        return true;
                    }
                    if !do_sample {
                        return true;
                    }
                    matches!(
                        sample_fallback_to_normal_rate(runtime.as_ref(), &features, normal_spans)
                            .await,
                        super::Verdict::Keep
                    )
                }
            },
        )
        .await;

        rebuild(batch, &index, &keep)
    }
}

/// Rebuilds the output batch, preserving `(resource, scope)` grouping and
/// input order, dropping spans not flagged `keep` and pruning any scope
/// or resource group left empty as a result (`spec.md` §3 invariant 4,
/// §5 "Ordering").
fn rebuild(
    batch: &TraceBatch,
    index: &[(usize, usize, usize)],
    keep: &[bool],
) -> TraceBatch {
    let mut keep_flags = vec![false; index.len()];
    for (pos, &k) in keep.iter().enumerate() {
        keep_flags[pos] = k;
    }
    let mut flag_iter = index.iter().zip(keep_flags.iter());

    let mut out = Vec::with_capacity(batch.len());
    for (ri, rs) in batch.iter().enumerate() {
        let mut out_scopes = Vec::with_capacity(rs.scopes.len());
        for (si, ss) in rs.scopes.iter().enumerate() {
            let mut out_spans = Vec::with_capacity(ss.spans.len());
            for (spi, span) in ss.spans.iter().enumerate() {
                let (&(fri, fsi, fspi), &should_keep) = flag_iter
                    .next()
                    .expect("index/keep vectors cover every span in input order");
                debug_assert_eq!((fri, fsi, fspi), (ri, si, spi));
                if should_keep {
                    out_spans.push(span.clone());
                }
            }
            if !out_spans.is_empty() {
                out_scopes.push(ScopeSpans {
                    scope: Scope {
                        name: ss.scope.name.clone(),
                        version: ss.scope.version.clone(),
                    },
                    spans: out_spans,
                });
            }
        }
        if !out_scopes.is_empty() {
            out.push(ResourceSpans {
                resource: rs.resource.clone(),
                scopes: out_scopes,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attributes, Resource, Span, SpanStatus};
    use crate::wasm::FakeInferenceRuntime;
    use serde_json::json;

    struct VecConsumer(tokio::sync::Mutex<Vec<TraceBatch>>);

    #[async_trait::async_trait]
    impl Consumer<TraceBatch> for VecConsumer {
        async fn consume(&self, batch: TraceBatch) -> anyhow::Result<()> {
            self.0.lock().await.push(batch);
            Ok(())
        }
    }

    fn span(name: &str, code: StatusCode, duration_ms: u64) -> Span {
        Span {
            name: name.to_string(),
            status: SpanStatus {
                code,
                message: if code == StatusCode::Error {
                    "boom".to_string()
                } else {
                    String::new()
                },
            },
            start_unix_nano: 0,
            end_unix_nano: duration_ms * 1_000_000,
            attributes: Attributes::new(),
            ..Span::default()
        }
    }

    fn batch(spans: Vec<Span>) -> TraceBatch {
        vec![ResourceSpans {
            resource: Resource::default(),
            scopes: vec![ScopeSpans {
                scope: Scope::default(),
                spans,
            }],
        }]
    }

    #[tokio::test]
    async fn error_span_is_always_kept_when_error_events_is_one() {
        let runtime = Arc::new(FakeInferenceRuntime::always_fails());
        let next = Arc::new(VecConsumer(tokio::sync::Mutex::new(Vec::new())));
        let processor = TracesProcessor::new(
            runtime,
            next.clone(),
            &ProcessingConfig::default(),
            FeaturesConfig {
                smart_sampling: true,
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

        let input = batch(vec![
            span("err", StatusCode::Error, 1),
            span("ok", StatusCode::Ok, 1),
        ]);
        processor.consume(input).await.unwrap();

        let out = next.0.lock().await.clone();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0][0].scopes[0].spans.len(), 1);
        assert_eq!(out[0][0].scopes[0].spans[0].name, "err");
    }

    #[tokio::test]
    async fn slow_span_is_kept_when_over_threshold() {
        let runtime = Arc::new(FakeInferenceRuntime::always_fails());
        let next = Arc::new(VecConsumer(tokio::sync::Mutex::new(Vec::new())));
        let processor = TracesProcessor::new(
            runtime,
            next.clone(),
            &ProcessingConfig::default(),
            FeaturesConfig {
                smart_sampling: true,
                ..FeaturesConfig::default()
            },
            SamplingConfig {
                error_events: 0.0,
                slow_spans: 1.0,
                normal_spans: 0.0,
                threshold_ms: 500,
            },
            OutputConfig::default(),
        );

        let input = batch(vec![span("slow", StatusCode::Ok, 600)]);
        processor.consume(input).await.unwrap();

        let out = next.0.lock().await.clone();
        assert_eq!(out[0][0].scopes[0].spans.len(), 1);
    }

    #[tokio::test]
    async fn sampler_drop_all_yields_empty_batch() {
        let runtime = Arc::new(FakeInferenceRuntime {
            classify: Box::new(|_| Ok(json!({}))),
            sample: Box::new(|_| Ok(json!({"importance": 1.0, "keep": false}))),
            extract: Box::new(|_| Ok(json!({}))),
        });
        let next = Arc::new(VecConsumer(tokio::sync::Mutex::new(Vec::new())));
        let processor = TracesProcessor::new(
            runtime,
            next.clone(),
            &ProcessingConfig::default(),
            FeaturesConfig {
                smart_sampling: true,
                ..FeaturesConfig::default()
            },
            SamplingConfig {
                error_events: 0.0,
                slow_spans: 0.0,
                normal_spans: 0.0,
                threshold_ms: 500,
            },
            OutputConfig::default(),
        );

        let input = batch((0..100).map(|i| span(&i.to_string(), StatusCode::Ok, 1)).collect());
        processor.consume(input).await.unwrap();

        let out = next.0.lock().await.clone();
        assert!(out[0].is_empty());
    }

    #[tokio::test]
    async fn error_classification_writes_namespaced_attributes() {
        let runtime = Arc::new(FakeInferenceRuntime {
            classify: Box::new(|_| {
                Ok(json!({
                    "category": "database_error",
                    "system": "postgres",
                    "owner": "database-team",
                    "severity": "high",
                    "impact": "medium",
                    "confidence": 0.85
                }))
            }),
            sample: Box::new(|_| Ok(json!({"importance": 1.0}))),
            extract: Box::new(|_| Ok(json!({}))),
        });
        let next = Arc::new(VecConsumer(tokio::sync::Mutex::new(Vec::new())));
        let processor = TracesProcessor::new(
            runtime,
            next.clone(),
            &ProcessingConfig::default(),
            FeaturesConfig {
                error_classification: true,
                ..FeaturesConfig::default()
            },
            SamplingConfig::default(),
            OutputConfig::default(),
        );

        let input = batch(vec![span("err", StatusCode::Error, 1)]);
        processor.consume(input).await.unwrap();

        let out = next.0.lock().await.clone();
        let attrs = &out[0][0].scopes[0].spans[0].attributes;
        assert_eq!(
            attrs.get("ai.category"),
            Some(&crate::model::AttributeValue::Str("database_error".into()))
        );
        assert_eq!(
            attrs.get("ai.confidence"),
            Some(&crate::model::AttributeValue::Double(0.85))
        );
    }
}
