//! Processor factory (`spec.md` §4.5): wires a [`WasmRuntime`] and an
//! optional [`WorkerPool`] into the three signal processors from one
//! validated [`Config`].

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::model::{LogBatch, MetricBatch, TraceBatch};
use crate::signal::logs::LogsProcessor;
use crate::signal::metrics::MetricsProcessor;
use crate::signal::traces::TracesProcessor;
use crate::signal::{Capabilities, Consumer};
use crate::wasm::{InferenceRuntime, WasmRuntime};

/// Builds processors from one validated configuration, sharing a single
/// [`WasmRuntime`] across all three signals.
pub struct ProcessorFactory {
    config: Config,
    runtime: Arc<WasmRuntime>,
}

impl ProcessorFactory {
    /// # Errors
    /// Returns an error if `config` fails validation or a configured
    /// model path cannot be loaded.
    pub fn new(config: Config) -> Result<Self> {
        let config = config.validate().map_err(crate::error::Error::Config)?;
        let runtime = Arc::new(WasmRuntime::new(&config)?);
        Ok(Self { config, runtime })
    }

    #[must_use]
    pub fn runtime(&self) -> Arc<WasmRuntime> {
        self.runtime.clone()
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        Capabilities { mutates_data: true }
    }

    /// Reloads the model backing `kind` (one of `"error_classifier"`,
    /// `"importance_sampler"`, `"entity_extractor"`) from `path`
    /// (`spec.md` §4.1 `ReloadModel`).
    ///
    /// # Errors
    /// Returns [`crate::error::Error::UnsupportedKind`] if `kind` does not
    /// name one of the three supported model kinds, or
    /// [`crate::error::Error::ModuleLoad`] if the new module fails to load.
    pub async fn reload_model(&self, kind: &str, path: &Path) -> Result<()> {
        self.runtime.reload_by_name(kind, path).await
    }

    #[must_use]
    pub fn create_traces(&self, next: Arc<dyn Consumer<TraceBatch>>) -> TracesProcessor {
        TracesProcessor::new(
            self.runtime.clone(),
            next,
            &self.config.processing,
            self.config.features.clone(),
            self.config.sampling.clone(),
            self.config.output.clone(),
        )
    }

    #[must_use]
    pub fn create_logs(&self, next: Arc<dyn Consumer<LogBatch>>) -> LogsProcessor {
        LogsProcessor::new(
            self.runtime.clone(),
            next,
            &self.config.processing,
            self.config.features.clone(),
            self.config.sampling.clone(),
            self.config.output.clone(),
        )
    }

    #[must_use]
    pub fn create_metrics(&self, next: Arc<dyn Consumer<MetricBatch>>) -> MetricsProcessor {
        MetricsProcessor::new(
            self.runtime.clone(),
            next,
            &self.config.processing,
            self.config.features.clone(),
            self.config.sampling.clone(),
            self.config.output.clone(),
        )
    }
}
