//! A single loaded WASM module instance and its calling convention.
//!
//! The ABI (`spec.md` §6) is a raw `(ptr,len) -> packed(ptr,len)` contract
//! over a classic `wasmtime::Module`/`Linker`/`Store`, not the component
//! model. This has no teacher analogue: `promptkit-executor`'s
//! `wasm::logging`/`wasm::vm` are `wasmtime::component::bindgen!`
//! (component-model/WIT) bindings, not a ptr/len ABI, so the calling
//! convention below is taken directly from `spec.md` §6 rather than
//! ported from the teacher.
//!
//! Calling convention (an implementation choice left open by `spec.md`
//! §6's "ptrToLen-encoded"; recorded in `DESIGN.md`): the guest exports
//! `alloc(len: i32) -> i32` to receive a write buffer, and its JSON
//! function has signature `(ptr: i32, len: i32) -> i64`, returning the
//! output buffer packed as `(out_ptr << 32) | out_len`.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use wasmtime::{Caller, Engine, Linker, Memory, Module, Store, TypedFunc};

use super::ModelKind;
use super::resource::{MemoryDenied, MemoryLimiter};

const EPOCH_TICK: Duration = Duration::from_millis(5);

/// Per-(module-instance) interpreter state.
pub struct InstanceState {
    limiter: MemoryLimiter,
    aborted: Arc<Mutex<Option<String>>>,
}

/// Outcome of a single inference call, already classified against the
/// taxonomy in `spec.md` §7 (everything except `ResultDecodeError`, which
/// is detected one layer up once the raw string is parsed as JSON).
pub enum CallOutcome {
    Ok(String),
    Abort(String),
    Timeout,
    Memory,
}

pub struct ModuleInstance {
    kind: ModelKind,
    store: Store<InstanceState>,
    memory: Memory,
    alloc: TypedFunc<i32, i32>,
    call: TypedFunc<(i32, i32), i64>,
    memory_denied: MemoryDenied,
}

impl ModuleInstance {
    /// Compiles and links a module from disk against the runtime's shared
    /// [`Engine`] (one epoch ticker serves every loaded module).
    ///
    /// # Errors
    /// Returns an error if the file cannot be read/compiled, the linker
    /// fails, or the module is missing the required exports.
    pub fn load(
        engine: &Engine,
        kind: ModelKind,
        path: &Path,
        memory_limit_bytes: usize,
    ) -> anyhow::Result<Self> {
        let module = Module::from_file(engine, path)
            .with_context(|| format!("compiling {} module at {}", kind, path.display()))?;

        let mut linker = Linker::<InstanceState>::new(engine);
        linker
            .func_wrap(
                "env",
                "abort",
                |mut caller: Caller<'_, InstanceState>,
                 msg_ptr: i32,
                 file_ptr: i32,
                 line: i32,
                 col: i32|
                 -> wasmtime::Result<()> {
                    let memory = caller
                        .get_export("memory")
                        .and_then(|e| e.into_memory())
                        .ok_or_else(|| anyhow!("module has no exported memory"))?;
                    let message =
                        read_as_string(memory.data(&caller), msg_ptr).unwrap_or_default();
                    let file =
                        read_as_string(memory.data(&caller), file_ptr).unwrap_or_default();
                    let full = format!("{message} ({file}:{line}:{col})");
                    *caller.data().aborted.lock().unwrap() = Some(full.clone());
                    Err(anyhow!("module called abort: {full}"))
                },
            )
            .context("wiring env.abort import")?;

        let (limiter, memory_denied) = MemoryLimiter::new(memory_limit_bytes);
        let mut store = Store::new(
            engine,
            InstanceState {
                limiter,
                aborted: Arc::new(Mutex::new(None)),
            },
        );
        store.limiter(|s| &mut s.limiter);
        store.set_epoch_deadline(u64::MAX);

        let instance = linker
            .instantiate(&mut store, &module)
            .with_context(|| format!("instantiating {kind} module"))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| anyhow!("{kind} module does not export linear memory"))?;
        let alloc = instance
            .get_typed_func::<i32, i32>(&mut store, "alloc")
            .with_context(|| format!("{kind} module must export alloc(i32) -> i32"))?;
        let call = instance
            .get_typed_func::<(i32, i32), i64>(&mut store, kind.export_name())
            .with_context(|| format!("{kind} module must export {}", kind.export_name()))?;

        Ok(Self {
            kind,
            store,
            memory,
            alloc,
            call,
            memory_denied,
        })
    }

    /// Invokes the module's JSON function, enforcing the wall-clock
    /// budget via epoch interruption ticks (one tick = [`EPOCH_TICK`]).
    pub fn call_json(&mut self, input: &str, budget_ticks: u64) -> CallOutcome {
        *self.store.data().aborted.lock().unwrap() = None;
        self.memory_denied.take();
        self.store.set_epoch_deadline(budget_ticks.max(1));

        let result = self.invoke(input);

        if self.memory_denied.take() {
            return CallOutcome::Memory;
        }
        if let Some(message) = self.store.data().aborted.lock().unwrap().take() {
            return CallOutcome::Abort(message);
        }

        match result {
            Ok(s) => CallOutcome::Ok(s),
            Err(err) => {
                if err.downcast_ref::<wasmtime::Trap>() == Some(&wasmtime::Trap::Interrupt) {
                    CallOutcome::Timeout
                } else {
                    CallOutcome::Abort(err.to_string())
                }
            }
        }
    }

    fn invoke(&mut self, input: &str) -> anyhow::Result<String> {
        let bytes = input.as_bytes();
        let in_len = i32::try_from(bytes.len()).context("input too large")?;
        let ptr = self.alloc.call(&mut self.store, in_len)?;
        self.memory
            .write(&mut self.store, usize::try_from(ptr)?, bytes)?;

        let packed = self.call.call(&mut self.store, (ptr, in_len))?;
        #[allow(clippy::cast_sign_loss)]
        let out_ptr = (packed >> 32) as u32 as usize;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let out_len = (packed & 0xFFFF_FFFF) as u32 as usize;

        let mut buf = vec![0u8; out_len];
        self.memory.read(&self.store, out_ptr, &mut buf)?;
        String::from_utf8(buf).context("module output was not valid UTF-8")
    }

    #[must_use]
    pub const fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Converts a millisecond budget into epoch ticks for this instance's
    /// tick granularity.
    #[must_use]
    pub fn ticks_for(budget_ms: u64) -> u64 {
        #[allow(clippy::cast_possible_truncation)]
        let tick_ms = EPOCH_TICK.as_millis().max(1) as u64;
        (budget_ms / tick_ms).max(1)
    }

    #[must_use]
    pub const fn epoch_tick_interval() -> Duration {
        EPOCH_TICK
    }
}


/// Best-effort decode of an AssemblyScript string: a little-endian `u32`
/// byte-length stored 4 bytes before `ptr`, followed by UTF-16LE code
/// units. Any out-of-bounds or malformed read yields `None` rather than
/// panicking -- this runs inside a host import called by untrusted code.
fn read_as_string(data: &[u8], ptr: i32) -> Option<String> {
    if ptr < 4 {
        return None;
    }
    let ptr = usize::try_from(ptr).ok()?;
    let len_bytes = data.get(ptr - 4..ptr)?;
    let byte_len = u32::from_le_bytes(len_bytes.try_into().ok()?) as usize;
    let byte_len = byte_len.min(4096);
    let body = data.get(ptr..ptr + byte_len)?;
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    Some(String::from_utf16_lossy(&units))
}
