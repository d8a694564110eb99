//! Configuration schema (`spec.md` §4.5) and validation.
//!
//! Loading the configuration value itself (from JSON/YAML/TOML/env) is an
//! external concern (`spec.md` §1); this module only defines the typed
//! shape and the validation/clamping rules the factory applies to it.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_timeout_ms() -> u64 {
    40
}

fn default_memory_limit_mb() -> u64 {
    100
}

/// Per-model settings (`models.{error_classifier, importance_sampler,
/// entity_extractor}`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Missing/empty path means "feature disabled for that model"
    /// (`spec.md` §4.5).
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            memory_limit_mb: default_memory_limit_mb(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ModelConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_mb * 1024 * 1024
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.path.as_ref().is_some_and(|p| !p.as_os_str().is_empty())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default)]
    pub error_classifier: ModelConfig,
    #[serde(default)]
    pub importance_sampler: ModelConfig,
    #[serde(default)]
    pub entity_extractor: ModelConfig,
}

fn default_batch_size() -> usize {
    512
}
fn default_concurrency() -> usize {
    8
}
fn default_queue_size() -> usize {
    1024
}
fn default_processing_timeout_ms() -> u64 {
    5000
}
fn default_max_parallel_workers() -> usize {
    8
}
fn default_attribute_cache_size() -> usize {
    1000
}
fn default_resource_cache_size() -> usize {
    100
}
fn default_model_results_cache_size() -> usize {
    1000
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_processing_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub enable_parallel_processing: bool,
    #[serde(default = "default_max_parallel_workers")]
    pub max_parallel_workers: usize,
    #[serde(default = "default_attribute_cache_size")]
    pub attribute_cache_size: usize,
    #[serde(default = "default_resource_cache_size")]
    pub resource_cache_size: usize,
    #[serde(default = "default_true")]
    pub model_cache_results: bool,
    #[serde(default = "default_model_results_cache_size")]
    pub model_results_cache_size: usize,
}

fn default_true() -> bool {
    true
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            queue_size: default_queue_size(),
            timeout_ms: default_processing_timeout_ms(),
            enable_parallel_processing: false,
            max_parallel_workers: default_max_parallel_workers(),
            attribute_cache_size: default_attribute_cache_size(),
            resource_cache_size: default_resource_cache_size(),
            model_cache_results: true,
            model_results_cache_size: default_model_results_cache_size(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default)]
    pub error_classification: bool,
    #[serde(default)]
    pub smart_sampling: bool,
    #[serde(default)]
    pub entity_extraction: bool,
    /// Reserved; currently a no-op beyond passthrough (`spec.md` §4.4.1).
    #[serde(default)]
    pub context_linking: bool,
}

fn default_threshold_ms() -> u64 {
    500
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default)]
    pub error_events: f64,
    #[serde(default)]
    pub slow_spans: f64,
    #[serde(default)]
    pub normal_spans: f64,
    #[serde(default = "default_threshold_ms")]
    pub threshold_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            error_events: 1.0,
            slow_spans: 0.0,
            normal_spans: 1.0,
            threshold_ms: default_threshold_ms(),
        }
    }
}

fn default_namespace() -> String {
    "ai.".to_string()
}
fn default_max_attribute_length() -> usize {
    256
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_namespace")]
    pub attribute_namespace: String,
    #[serde(default = "default_true")]
    pub include_confidence_scores: bool,
    #[serde(default = "default_max_attribute_length")]
    pub max_attribute_length: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            attribute_namespace: default_namespace(),
            include_confidence_scores: true,
            max_attribute_length: default_max_attribute_length(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Validates and normalizes the configuration. Rates are clamped into
    /// `[0,1]`; negative sizes/timeouts are rejected; missing model paths
    /// are not errors (`spec.md` §4.5: "missing model paths as feature
    /// disabled for that model").
    ///
    /// Unlike a fail-fast validator, every problem is collected into one
    /// report (see `SPEC_FULL.md` §9) so the operator sees the whole
    /// picture at once.
    ///
    /// # Errors
    /// Returns a newline-joined list of problems if any field is
    /// incoherent.
    pub fn validate(mut self) -> Result<Self, String> {
        let mut problems = Vec::new();

        self.sampling.error_events = clamp_rate(self.sampling.error_events);
        self.sampling.slow_spans = clamp_rate(self.sampling.slow_spans);
        self.sampling.normal_spans = clamp_rate(self.sampling.normal_spans);

        if self.processing.batch_size == 0 {
            problems.push("processing.batch_size must be > 0".to_string());
        }
        if self.processing.concurrency == 0 {
            problems.push("processing.concurrency must be > 0".to_string());
        }
        if self.processing.max_parallel_workers == 0 {
            problems.push("processing.max_parallel_workers must be > 0".to_string());
        }
        if self.output.max_attribute_length == 0 {
            problems.push("output.max_attribute_length must be > 0".to_string());
        }
        if self.output.attribute_namespace.is_empty() {
            problems.push("output.attribute_namespace must not be empty".to_string());
        }
        for (name, model) in [
            ("models.error_classifier", &self.models.error_classifier),
            ("models.importance_sampler", &self.models.importance_sampler),
            ("models.entity_extractor", &self.models.entity_extractor),
        ] {
            if model.timeout_ms == 0 {
                problems.push(format!("{name}.timeout_ms must be > 0"));
            }
            if model.memory_limit_mb == 0 {
                problems.push(format!("{name}.memory_limit_mb must be > 0"));
            }
        }

        if problems.is_empty() {
            Ok(self)
        } else {
            Err(problems.join("; "))
        }
    }
}

fn clamp_rate(rate: f64) -> f64 {
    rate.clamp(0.0, 1.0)
}
