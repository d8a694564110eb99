//! Per-instance memory capping.
//!
//! Grounded directly on `promptkit-executor::resource::MemoryLimiter`: a
//! `wasmtime::ResourceLimiter` that refuses linear-memory growth beyond a
//! hard cap. This version additionally latches a `denied` flag so the
//! caller can distinguish "the call trapped because it hit the memory
//! cap" from any other trap (`spec.md` §4.1: `MemoryError` vs a generic
//! call failure).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use wasmtime::ResourceLimiter;

#[derive(Clone, Default)]
pub struct MemoryDenied(Arc<AtomicBool>);

impl MemoryDenied {
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

pub struct MemoryLimiter {
    max_bytes: usize,
    denied: MemoryDenied,
}

impl MemoryLimiter {
    #[must_use]
    pub fn new(max_bytes: usize) -> (Self, MemoryDenied) {
        let denied = MemoryDenied::default();
        (
            Self {
                max_bytes,
                denied: denied.clone(),
            },
            denied,
        )
    }
}

impl ResourceLimiter for MemoryLimiter {
    fn memory_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        if desired > self.max_bytes {
            self.denied.0.store(true, Ordering::SeqCst);
            return Ok(false);
        }
        Ok(true)
    }

    fn table_growing(
        &mut self,
        _current: usize,
        _desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }
}
