//! AI-enhanced telemetry processing stage: WASM-backed enrichment and
//! content-aware sampling for trace, log, and metric batches.
//!
//! See `SPEC_FULL.md` for the system this crate implements and
//! `DESIGN.md` for where each part of it is grounded.

pub mod cache;
pub mod config;
pub mod error;
pub mod factory;
pub mod features;
pub mod fingerprint;
pub mod model;
pub mod pool;
pub mod signal;
pub mod wasm;

pub use config::Config;
pub use error::{Error, Result};
pub use factory::ProcessorFactory;
pub use signal::{Capabilities, Consumer};
pub use signal::logs::LogsProcessor;
pub use signal::metrics::MetricsProcessor;
pub use signal::traces::TracesProcessor;
pub use wasm::{FakeInferenceRuntime, InferenceRuntime, ModelKind, WasmRuntime};
