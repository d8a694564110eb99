//! The shared WASM runtime: owns the three module slots, the cache in
//! front of each, and the epoch ticker that drives every instance's
//! wall-clock timeout.
//!
//! Grounded on `promptkit-executor::vm_manager::VmManager`: a single
//! `Engine`, a background ticker task incrementing its epoch on an
//! interval, and an `Arc`-based swap for hot-reloading the loaded module
//! (the teacher reloads by cache replacement; here it's an explicit
//! `ArcSwapOption` per `spec.md` §4.1's "atomically swaps the instance").

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::ResultCache;
use crate::config::{Config, ModelConfig};
use crate::error::{Error, Result};
use crate::fingerprint;

use super::ModelKind;
use super::instance::{CallOutcome, ModuleInstance};
use super::rate_limit::RateLimiter;

/// The calling surface the signal processors depend on. Implemented by
/// [`WasmRuntime`] in production and by [`FakeInferenceRuntime`] in tests,
/// the same way `promptkit-executor` tests its policy logic against a
/// fake `Env` rather than a real compiled guest module.
#[async_trait]
pub trait InferenceRuntime: Send + Sync {
    async fn classify_error(&self, features: &Value) -> Result<Value>;
    async fn sample_telemetry(&self, features: &Value) -> Result<Value>;
    async fn extract_entities(&self, features: &Value) -> Result<Value>;

    /// Atomically swaps the instance backing `kind`. In-flight calls
    /// against the prior instance complete against it; a reload failure
    /// leaves the prior instance in place (`spec.md` §4.1 "Reload").
    async fn reload(&self, kind: ModelKind, path: &Path) -> Result<()>;

    /// String-keyed entry point for `ReloadModel(kind, path)` (`spec.md`
    /// §4.1), for callers (config-driven reload requests, an admin API)
    /// that only have the kind as a string.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedKind`] if `kind` does not name one of
    /// the three supported model kinds; otherwise delegates to
    /// [`reload`](Self::reload).
    async fn reload_by_name(&self, kind: &str, path: &Path) -> Result<()> {
        let kind = ModelKind::parse(kind).map_err(Error::UnsupportedKind)?;
        self.reload(kind, path).await
    }
}

struct Slot {
    kind: ModelKind,
    instance: ArcSwapOption<AsyncMutex<ModuleInstance>>,
    cache: ResultCache,
    timeout_ms: u64,
    memory_limit_mb: u64,
    rate_limiter: RateLimiter,
}

impl Slot {
    fn new(kind: ModelKind, model: &ModelConfig, cache_capacity: usize, ttl: Duration) -> Self {
        Self {
            kind,
            instance: ArcSwapOption::from(None),
            cache: ResultCache::new(cache_capacity, ttl),
            timeout_ms: model.timeout_ms,
            memory_limit_mb: model.memory_limit_mb,
            rate_limiter: RateLimiter::new(Duration::from_secs(5)),
        }
    }
}

/// Owns the three WASM module instances and the engine they share.
pub struct WasmRuntime {
    engine: wasmtime::Engine,
    error_classifier: Slot,
    importance_sampler: Slot,
    entity_extractor: Slot,
    cache_enabled: bool,
    ticker: JoinHandle<()>,
}

impl WasmRuntime {
    /// Constructs the runtime and loads whichever of the three modules
    /// have a configured path. A model with no path is left unloaded
    /// ("feature disabled for that model", `spec.md` §4.5); every call
    /// against an unloaded slot returns [`Error::ModuleNotLoaded`].
    ///
    /// # Errors
    /// Returns [`Error::ModuleLoad`] if a *configured* model path fails
    /// to compile or link.
    pub fn new(config: &Config) -> Result<Self> {
        let mut wasm_config = wasmtime::Config::new();
        wasm_config.epoch_interruption(true);
        let engine = wasmtime::Engine::new(&wasm_config)
            .map_err(|source| Error::Pipeline(source))?;

        let cache_capacity = if config.processing.model_cache_results {
            config.processing.model_results_cache_size
        } else {
            0
        };
        let ttl = Duration::from_secs(60);

        let mut runtime = Self {
            engine: engine.clone(),
            error_classifier: Slot::new(
                ModelKind::ErrorClassifier,
                &config.models.error_classifier,
                cache_capacity,
                ttl,
            ),
            importance_sampler: Slot::new(
                ModelKind::ImportanceSampler,
                &config.models.importance_sampler,
                cache_capacity,
                ttl,
            ),
            entity_extractor: Slot::new(
                ModelKind::EntityExtractor,
                &config.models.entity_extractor,
                cache_capacity,
                ttl,
            ),
            cache_enabled: config.processing.model_cache_results,
            ticker: tokio::spawn(async move {
                let mut interval = tokio::time::interval(ModuleInstance::epoch_tick_interval());
                loop {
                    interval.tick().await;
                    engine.increment_epoch();
                }
            }),
        };

        for (slot_kind, model) in [
            (ModelKind::ErrorClassifier, &config.models.error_classifier),
            (
                ModelKind::ImportanceSampler,
                &config.models.importance_sampler,
            ),
            (ModelKind::EntityExtractor, &config.models.entity_extractor),
        ] {
            if let Some(path) = model.path.as_ref().filter(|p| !p.as_os_str().is_empty()) {
                runtime.load_slot(slot_kind, path, model.memory_limit_mb)?;
            }
        }

        Ok(runtime)
    }

    fn slot(&self, kind: ModelKind) -> &Slot {
        match kind {
            ModelKind::ErrorClassifier => &self.error_classifier,
            ModelKind::ImportanceSampler => &self.importance_sampler,
            ModelKind::EntityExtractor => &self.entity_extractor,
        }
    }

    fn load_slot(&self, kind: ModelKind, path: &Path, memory_limit_mb: u64) -> Result<()> {
        let instance = ModuleInstance::load(
            &self.engine,
            kind,
            path,
            usize::try_from(memory_limit_mb * 1024 * 1024).unwrap_or(usize::MAX),
        )
        .map_err(|source| Error::ModuleLoad { kind, source })?;
        self.slot(kind)
            .instance
            .store(Some(Arc::new(AsyncMutex::new(instance))));
        Ok(())
    }

    async fn call(&self, kind: ModelKind, features: &Value) -> Result<Value> {
        let slot = self.slot(kind);

        let fp = fingerprint::fingerprint(features);
        if self.cache_enabled {
            if let Some(hit) = slot.cache.get(fp) {
                return Ok(hit);
            }
        }

        let Some(instance) = slot.instance.load_full() else {
            return Err(Error::ModuleNotLoaded(kind));
        };

        let input = fingerprint::canonicalize(features);
        let budget_ticks = ModuleInstance::ticks_for(slot.timeout_ms);
        let budget_ms = slot.timeout_ms;
        let memory_limit_mb = slot.memory_limit_mb;

        let outcome = {
            let mut guard = instance.lock().await;
            guard.call_json(&input, budget_ticks)
        };

        let raw = match outcome {
            CallOutcome::Ok(raw) => raw,
            CallOutcome::Abort(message) => {
                if slot.rate_limiter.allow() {
                    debug!(target: "ai_stage::wasm", kind = %kind, %message, "module call aborted");
                }
                return Err(Error::ModuleAbort { kind, message });
            }
            CallOutcome::Timeout => {
                if slot.rate_limiter.allow() {
                    debug!(target: "ai_stage::wasm", kind = %kind, budget_ms, "module call timed out");
                }
                return Err(Error::Timeout { kind, budget_ms });
            }
            CallOutcome::Memory => {
                if slot.rate_limiter.allow() {
                    warn!(target: "ai_stage::wasm", kind = %kind, memory_limit_mb, "module call exceeded memory budget");
                }
                return Err(Error::Memory {
                    kind,
                    limit_mb: memory_limit_mb,
                });
            }
        };

        let value: Value = serde_json::from_str(&raw)
            .map_err(|source| Error::ResultDecode { kind, source })?;

        if self.cache_enabled {
            slot.cache.put(fp, &value);
        }

        Ok(value)
    }
}

impl Drop for WasmRuntime {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

#[async_trait]
impl InferenceRuntime for WasmRuntime {
    async fn classify_error(&self, features: &Value) -> Result<Value> {
        self.call(ModelKind::ErrorClassifier, features).await
    }

    async fn sample_telemetry(&self, features: &Value) -> Result<Value> {
        self.call(ModelKind::ImportanceSampler, features).await
    }

    async fn extract_entities(&self, features: &Value) -> Result<Value> {
        self.call(ModelKind::EntityExtractor, features).await
    }

    async fn reload(&self, kind: ModelKind, path: &Path) -> Result<()> {
        let slot = self.slot(kind);
        let instance = ModuleInstance::load(
            &self.engine,
            kind,
            path,
            usize::try_from(slot.memory_limit_mb * 1024 * 1024).unwrap_or(usize::MAX),
        )
        .map_err(|source| Error::ModuleLoad { kind, source })?;
        slot.instance.store(Some(Arc::new(AsyncMutex::new(instance))));
        Ok(())
    }
}

/// An in-memory test double implementing [`InferenceRuntime`] without
/// wasmtime, driven by closures. Mirrors the teacher's `CompileEnv`/fake
/// `Env` substitution for testing policy logic independent of a real
/// compiled guest.
pub struct FakeInferenceRuntime {
    pub classify: Box<dyn Fn(&Value) -> Result<Value> + Send + Sync>,
    pub sample: Box<dyn Fn(&Value) -> Result<Value> + Send + Sync>,
    pub extract: Box<dyn Fn(&Value) -> Result<Value> + Send + Sync>,
}

impl FakeInferenceRuntime {
    #[must_use]
    pub fn always_fails() -> Self {
        Self {
            classify: Box::new(|_| {
                Err(Error::ModuleNotLoaded(ModelKind::ErrorClassifier))
            }),
            sample: Box::new(|_| Err(Error::ModuleNotLoaded(ModelKind::ImportanceSampler))),
            extract: Box::new(|_| Err(Error::ModuleNotLoaded(ModelKind::EntityExtractor))),
        }
    }
}

#[async_trait]
impl InferenceRuntime for FakeInferenceRuntime {
    async fn classify_error(&self, features: &Value) -> Result<Value> {
        (self.classify)(features)
    }

    async fn sample_telemetry(&self, features: &Value) -> Result<Value> {
        (self.sample)(features)
    }

    async fn extract_entities(&self, features: &Value) -> Result<Value> {
        (self.extract)(features)
    }

    async fn reload(&self, _kind: ModelKind, _path: &Path) -> Result<()> {
        Ok(())
    }
}
