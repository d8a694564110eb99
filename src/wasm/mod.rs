//! The WASM inference runtime (`spec.md` §4.1).
//!
//! Three modules (error-classifier, importance-sampler, entity-extractor)
//! are loaded at startup; each exposes one pure JSON-in/JSON-out function.
//! The runtime enforces a per-call memory cap and wall-clock timeout, and
//! supports atomic, wait-free module reload.

mod instance;
mod rate_limit;
mod resource;
mod runtime;
#[cfg(test)]
pub(crate) mod testutil;

pub use runtime::{FakeInferenceRuntime, InferenceRuntime, WasmRuntime};

use std::fmt;

/// The three inference kinds the runtime hosts (`spec.md` §4.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelKind {
    ErrorClassifier,
    ImportanceSampler,
    EntityExtractor,
}

impl ModelKind {
    pub const ALL: [Self; 3] = [
        Self::ErrorClassifier,
        Self::ImportanceSampler,
        Self::EntityExtractor,
    ];

    /// The WASM export this kind's module must provide (`spec.md` §6).
    #[must_use]
    pub const fn export_name(self) -> &'static str {
        match self {
            Self::ErrorClassifier => "classify_error",
            Self::ImportanceSampler => "sample_telemetry",
            Self::EntityExtractor => "extract_entities",
        }
    }

    /// Parses a reload request's kind string (`spec.md` §4.1 `ReloadModel`).
    ///
    /// # Errors
    /// Returns the unrecognized string if `kind` does not name one of the
    /// three supported kinds.
    pub fn parse(kind: &str) -> Result<Self, String> {
        match kind {
            "error_classifier" => Ok(Self::ErrorClassifier),
            "importance_sampler" => Ok(Self::ImportanceSampler),
            "entity_extractor" => Ok(Self::EntityExtractor),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ErrorClassifier => "error_classifier",
            Self::ImportanceSampler => "importance_sampler",
            Self::EntityExtractor => "entity_extractor",
        };
        f.write_str(name)
    }
}
