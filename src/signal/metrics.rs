//! Metrics processor (`spec.md` §4.4.3).
//!
//! Granularity is the individual data point, not the metric: a metric
//! survives into the output batch if at least one of its points does.
//! Histogram/summary/exponential-histogram metrics are opaque by default
//! (`Metric::is_opaque_by_default`) -- traversed for batch bookkeeping but
//! never fed to inference, and passed through untouched.

use std::sync::Arc;

use crate::config::{FeaturesConfig, OutputConfig, ProcessingConfig, SamplingConfig};
use crate::error::{Error, Result};
use crate::features::metric_point_feature_record;
use crate::model::{Metric, MetricBatch, ResourceMetrics, Scope, ScopeMetrics};
use crate::pool::WorkerPool;
use crate::wasm::InferenceRuntime;

use super::{Consumer, map_parallel_or_serial, sample_fallback_to_normal_rate, write_enrichment};

pub struct MetricsProcessor {
    runtime: Arc<dyn InferenceRuntime>,
    pool: Option<WorkerPool>,
    next: Arc<dyn Consumer<MetricBatch>>,
    features: FeaturesConfig,
    sampling: SamplingConfig,
    output: OutputConfig,
}

impl MetricsProcessor {
    #[must_use]
    pub fn new(
        runtime: Arc<dyn InferenceRuntime>,
        next: Arc<dyn Consumer<MetricBatch>>,
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
    /// Surfaces only downstream forwarding failures.
    pub async fn consume(&self, mut batch: MetricBatch) -> Result<()> {
        self.process(&mut batch).await;
        self.next.consume(batch).await.map_err(Error::Pipeline)
    }

    pub async fn shutdown(self) -> Result<()> {
        if let Some(pool) = self.pool {
            pool.shutdown().await;
        }
        Ok(())
    }

    async fn process(&self, batch: &mut MetricBatch) {
        if !(self.features.entity_extraction || self.features.smart_sampling) {
            return;
        }

        let mut index = Vec::new();
        let mut items = Vec::new();
        for (ri, rm) in batch.iter().enumerate() {
            for (si, sm) in rm.scopes.iter().enumerate() {
                for (mi, metric) in sm.metrics.iter().enumerate() {
                    if metric.is_opaque_by_default() {
                        continue;
                    }
                    for (pi, point) in metric.points.iter().enumerate() {
                        let features = metric_point_feature_record(metric, point, &rm.resource);
                        index.push((ri, si, mi, pi));
                        items.push(features);
                    }
                }
            }
        }
        if items.is_empty() {
            return;
        }

        let runtime = self.runtime.clone();
        let do_extract = self.features.entity_extraction;
        let do_sample = self.features.smart_sampling;
        let normal_rate = self.sampling.normal_spans;
        let decisions = map_parallel_or_serial(self.pool.as_ref(), items, move |features| {
            let runtime = runtime.clone();
            async move {
                let extract = if do_extract {
                    runtime.extract_entities(&features).await.ok()
                } else {
                    None
                };
                let keep = if do_sample {
                    matches!(
                        sample_fallback_to_normal_rate(runtime.as_ref(), &features, normal_rate)
                            .await,
                        super::Verdict::Keep
                    )
                } else {
                    true
                };
                (extract, keep)
            }
        })
        .await;

        let namespace = self.output.attribute_namespace.as_str();
        let max_len = self.output.max_attribute_length;
        let mut keep_of: std::collections::HashMap<(usize, usize, usize, usize), bool> =
            std::collections::HashMap::with_capacity(index.len());
        for ((ri, si, mi, pi), (extract, keep)) in index.into_iter().zip(decisions) {
            keep_of.insert((ri, si, mi, pi), keep);
            if let Some(result) = extract {
                let point = &mut batch[ri].scopes[si].metrics[mi].points[pi];
                write_enrichment(&mut point.attributes, &result, namespace, max_len);
            }
        }

        prune(batch, &keep_of);
    }
}

/// Drops points not flagged `keep`, then drops any metric/scope/resource
/// group left empty as a result (`spec.md` §4.4.3: "drops metrics with
/// zero kept points and prunes empty scopes").
fn prune(
    batch: &mut MetricBatch,
    keep_of: &std::collections::HashMap<(usize, usize, usize, usize), bool>,
) {
    for ri in 0..batch.len() {
        let mut out_scopes = Vec::with_capacity(batch[ri].scopes.len());
        for si in 0..batch[ri].scopes.len() {
            let metric_count = batch[ri].scopes[si].metrics.len();
            let mut out_metrics = Vec::with_capacity(metric_count);
            for mi in 0..metric_count {
                let metric = std::mem::take(&mut batch[ri].scopes[si].metrics[mi]);
                if metric.is_opaque_by_default() {
                    out_metrics.push(metric);
                    continue;
                }
                let mut kept_points = Vec::with_capacity(metric.points.len());
                for (pi, point) in metric.points.into_iter().enumerate() {
                    if *keep_of.get(&(ri, si, mi, pi)).unwrap_or(&true) {
                        kept_points.push(point);
                    }
                }
                if !kept_points.is_empty() {
                    out_metrics.push(Metric {
                        points: kept_points,
                        ..metric
                    });
                }
            }
            if !out_metrics.is_empty() {
                out_scopes.push(ScopeMetrics {
                    scope: Scope {
                        name: batch[ri].scopes[si].scope.name.clone(),
                        version: batch[ri].scopes[si].scope.version.clone(),
                    },
                    metrics: out_metrics,
                });
            }
        }
        batch[ri].scopes = out_scopes;
    }
    batch.retain(|rm| !rm.scopes.is_empty());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attributes, MetricPoint, MetricPointValue, Resource};
    use crate::wasm::FakeInferenceRuntime;
    use serde_json::json;

    struct VecConsumer(tokio::sync::Mutex<Vec<MetricBatch>>);

    #[async_trait::async_trait]
    impl Consumer<MetricBatch> for VecConsumer {
        async fn consume(&self, batch: MetricBatch) -> anyhow::Result<()> {
            self.0.lock().await.push(batch);
            Ok(())
        }
    }

    fn gauge_point(value: f64) -> MetricPoint {
        MetricPoint {
            attributes: Attributes::new(),
            timestamp_unix_nano: 0,
            value: Some(MetricPointValue::Gauge(value)),
        }
    }

    fn batch(metrics: Vec<Metric>) -> MetricBatch {
        vec![ResourceMetrics {
            resource: Resource::default(),
            scopes: vec![ScopeMetrics {
                scope: Scope::default(),
                metrics,
            }],
        }]
    }

    #[tokio::test]
    async fn opaque_histogram_metrics_pass_through_untouched() {
        let runtime = Arc::new(FakeInferenceRuntime::always_fails());
        let next = Arc::new(VecConsumer(tokio::sync::Mutex::new(Vec::new())));
        let processor = MetricsProcessor::new(
            runtime,
            next.clone(),
            &ProcessingConfig::default(),
            FeaturesConfig {
                smart_sampling: true,
                ..FeaturesConfig::default()
            },
            SamplingConfig {
                normal_spans: 0.0,
                ..SamplingConfig::default()
            },
            OutputConfig::default(),
        );

        let histogram = Metric {
            name: "latency".to_string(),
            points: vec![MetricPoint {
                value: Some(MetricPointValue::Histogram { count: 3, sum: 10.0 }),
                ..MetricPoint::default()
            }],
            ..Metric::default()
        };
        processor.consume(batch(vec![histogram])).await.unwrap();

        let out = next.0.lock().await.clone();
        assert_eq!(out[0][0].scopes[0].metrics[0].points.len(), 1);
    }

    #[tokio::test]
    async fn gauge_points_dropped_by_sampler_prune_empty_metric() {
        let runtime = Arc::new(FakeInferenceRuntime {
            classify: Box::new(|_| Ok(json!({}))),
            sample: Box::new(|_| Ok(json!({"importance": 1.0, "keep": false}))),
            extract: Box::new(|_| Ok(json!({}))),
        });
        let next = Arc::new(VecConsumer(tokio::sync::Mutex::new(Vec::new())));
        let processor = MetricsProcessor::new(
            runtime,
            next.clone(),
            &ProcessingConfig::default(),
            FeaturesConfig {
                smart_sampling: true,
                ..FeaturesConfig::default()
            },
            SamplingConfig {
                normal_spans: 0.0,
                ..SamplingConfig::default()
            },
            OutputConfig::default(),
        );

        let gauge = Metric {
            name: "cpu".to_string(),
            points: vec![gauge_point(0.5)],
            ..Metric::default()
        };
        processor.consume(batch(vec![gauge])).await.unwrap();

        let out = next.0.lock().await.clone();
        assert!(out[0].is_empty());
    }
}
