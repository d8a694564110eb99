use thiserror::Error;

use crate::wasm::ModelKind;

/// Errors surfaced by the crate's public API.
///
/// Per-item inference failures (`ModuleAbort`, `Timeout`, `Memory`,
/// `ResultDecode`) are never propagated out of a signal processor's
/// `consume` call -- they are caught, logged, and the affected item
/// proceeds without that enrichment. Only configuration/load errors,
/// cancellation, and downstream forwarding errors are surfaced.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to load {kind} module: {source}")]
    ModuleLoad {
        kind: ModelKind,
        #[source]
        source: anyhow::Error,
    },

    #[error("{0} module is not loaded")]
    ModuleNotLoaded(ModelKind),

    #[error("{kind} module aborted: {message}")]
    ModuleAbort { kind: ModelKind, message: String },

    #[error("{kind} call exceeded {budget_ms}ms budget")]
    Timeout { kind: ModelKind, budget_ms: u64 },

    #[error("{kind} call exceeded {limit_mb}MB memory budget")]
    Memory { kind: ModelKind, limit_mb: u64 },

    #[error("{kind} returned undecodable JSON: {source}")]
    ResultDecode {
        kind: ModelKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported model kind: {0}")]
    UnsupportedKind(String),

    #[error("downstream consumer failed: {0}")]
    Pipeline(#[source] anyhow::Error),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
