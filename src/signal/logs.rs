//! Logs processor (`spec.md` §4.4.2).

use std::sync::Arc;

use crate::config::{FeaturesConfig, OutputConfig, ProcessingConfig, SamplingConfig};
use crate::error::{Error, Result};
use crate::features::log_feature_record;
use crate::model::{LogBatch, ResourceLogs, Scope, ScopeLogs};
use crate::pool::WorkerPool;
use crate::wasm::InferenceRuntime;

use super::{Consumer, map_parallel_or_serial, sample_fallback_to_normal_rate, write_enrichment};

/// Mirrors [`super::traces::TracesProcessor`] minus the slow-span
/// condition -- logs have no duration (`spec.md` §4.4.2).
pub struct LogsProcessor {
    runtime: Arc<dyn InferenceRuntime>,
    pool: Option<WorkerPool>,
    next: Arc<dyn Consumer<LogBatch>>,
    features: FeaturesConfig,
    sampling: SamplingConfig,
    output: OutputConfig,
}

impl LogsProcessor {
    #[must_use]
    pub fn new(
        runtime: Arc<dyn InferenceRuntime>,
        next: Arc<dyn Consumer<LogBatch>>,
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
    pub async fn consume(&self, mut batch: LogBatch) -> Result<()> {
        self.enrich(&mut batch).await;

        let sampling_enabled = self.features.smart_sampling || self.sampling.error_events > 0.0;
        let out = if sampling_enabled {
            self.sample(&batch).await
        } else {
            batch
        };

        self.next.consume(out).await.map_err(Error::Pipeline)
    }

    pub async fn shutdown(self) -> Result<()> {
        if let Some(pool) = self.pool {
            pool.shutdown().await;
        }
        Ok(())
    }

    async fn enrich(&self, batch: &mut LogBatch) {
        if !(self.features.error_classification || self.features.entity_extraction) {
            return;
        }

        let mut index = Vec::new();
        let mut items = Vec::new();
        for (ri, rl) in batch.iter().enumerate() {
            for (si, sl) in rl.scopes.iter().enumerate() {
                for (lri, record) in sl.records.iter().enumerate() {
                    let features = log_feature_record(record, &rl.resource);
                    let is_error = record.is_error();
                    index.push((ri, si, lri));
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
        for ((ri, si, lri), (classify, extract)) in index.into_iter().zip(results) {
            let record = &mut batch[ri].scopes[si].records[lri];
            if let Some(result) = classify {
                write_enrichment(&mut record.attributes, &result, namespace, max_len);
            }
            if let Some(result) = extract {
                write_enrichment(&mut record.attributes, &result, namespace, max_len);
            }
        }
    }

    async fn sample(&self, batch: &LogBatch) -> LogBatch {
        let mut index = Vec::new();
        let mut items = Vec::new();
        for (ri, rl) in batch.iter().enumerate() {
            for (si, sl) in rl.scopes.iter().enumerate() {
                for (lri, record) in sl.records.iter().enumerate() {
                    let is_error = record.is_error();
                    let features = log_feature_record(record, &rl.resource);
                    index.push((ri, si, lri));
                    items.push((features, is_error));
                }
            }
        }

        let runtime = self.runtime.clone();
        let error_events = self.sampling.error_events;
        let normal_spans = self.sampling.normal_spans;
        let do_sample = self.features.smart_sampling;

        let keep = map_parallel_or_serial(
            self.pool.as_ref(),
            items,
            move |(features, is_error)| {
                let runtime = runtime.clone();
                async move {
                    if is_error && error_events >= 1.0 {
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

fn rebuild(batch: &LogBatch, index: &[(usize, usize, usize)], keep: &[bool]) -> LogBatch {
    let mut flag_iter = index.iter().zip(keep.iter());

    let mut out = Vec::with_capacity(batch.len());
    for (ri, rl) in batch.iter().enumerate() {
        let mut out_scopes = Vec::with_capacity(rl.scopes.len());
        for (si, sl) in rl.scopes.iter().enumerate() {
            let mut out_records = Vec::with_capacity(sl.records.len());
            for (lri, record) in sl.records.iter().enumerate() {
                let (&(fri, fsi, flri), &should_keep) = flag_iter
                    .next()
                    .expect("index/keep vectors cover every record in input order");
                debug_assert_eq!((fri, fsi, flri), (ri, si, lri));
                if should_keep {
                    out_records.push(record.clone());
                }
            }
            if !out_records.is_empty() {
                out_scopes.push(ScopeLogs {
                    scope: Scope {
                        name: sl.scope.name.clone(),
                        version: sl.scope.version.clone(),
                    },
                    records: out_records,
                });
            }
        }
        if !out_scopes.is_empty() {
            out.push(ResourceLogs {
                resource: rl.resource.clone(),
                scopes: out_scopes,
            });
        }
    }
    out
}
