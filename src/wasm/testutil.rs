//! Test-only helpers for compiling hand-written WAT guests, used by the
//! `wasm::instance`/`wasm::runtime` test modules to exercise the real
//! wasmtime path instead of [`super::FakeInferenceRuntime`].

use std::path::PathBuf;

use wasmtime::{Config, Engine};

/// Compiles `wat` to a `.wasm` binary and writes it under the system temp
/// directory as `name`. Callers must pick a distinct `name` per module to
/// avoid collisions between concurrently running tests.
pub(crate) fn write_wasm(name: &str, wat: &str) -> PathBuf {
    let bytes = wat::parse_str(wat).expect("valid WAT text");
    let path = std::env::temp_dir().join(name);
    std::fs::write(&path, bytes).expect("write compiled wasm to temp file");
    path
}

/// An [`Engine`] configured the same way [`super::WasmRuntime::new`]
/// configures its shared engine (epoch interruption on).
pub(crate) fn test_engine() -> Engine {
    let mut config = Config::new();
    config.epoch_interruption(true);
    Engine::new(&config).expect("engine construction")
}

/// A module whose call function echoes its input back unmodified --
/// `alloc` always returns a scratch offset well past the guest's 1-page
/// data, and the call function returns the caller's own `(ptr, len)`
/// packed into the `i64` result.
pub(crate) const ECHO_WAT: &str = r#"
(module
  (import "env" "abort" (func $abort (param i32 i32 i32 i32)))
  (memory (export "memory") 2)
  (func (export "alloc") (param $len i32) (result i32)
    (i32.const 4096))
  (func (export "classify_error") (param $ptr i32) (param $len i32) (result i64)
    (i64.or
      (i64.shl (i64.extend_i32_u (local.get $ptr)) (i64.const 32))
      (i64.extend_i32_u (local.get $len))))
  (func (export "sample_telemetry") (param $ptr i32) (param $len i32) (result i64)
    (i64.or
      (i64.shl (i64.extend_i32_u (local.get $ptr)) (i64.const 32))
      (i64.extend_i32_u (local.get $len))))
  (func (export "extract_entities") (param $ptr i32) (param $len i32) (result i64)
    (i64.or
      (i64.shl (i64.extend_i32_u (local.get $ptr)) (i64.const 32))
      (i64.extend_i32_u (local.get $len)))))
"#;

/// A module whose call function always returns the fixed string
/// `{"swapped":true}`, regardless of input -- used to prove a reload
/// actually swapped in a new instance rather than re-serving the old one.
pub(crate) const SWAPPED_WAT: &str = r#"
(module
  (import "env" "abort" (func $abort (param i32 i32 i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 1024) "{\"swapped\":true}")
  (func (export "alloc") (param $len i32) (result i32)
    (i32.const 2048))
  (func (export "classify_error") (param $ptr i32) (param $len i32) (result i64)
    (i64.or (i64.shl (i64.const 1024) (i64.const 32)) (i64.const 16))))
"#;

/// A module whose call function loops forever, used to exercise the
/// epoch-interruption timeout path.
pub(crate) const LOOP_FOREVER_WAT: &str = r#"
(module
  (import "env" "abort" (func $abort (param i32 i32 i32 i32)))
  (memory (export "memory") 1)
  (func (export "alloc") (param $len i32) (result i32)
    (i32.const 1024))
  (func (export "sample_telemetry") (param $ptr i32) (param $len i32) (result i64)
    (loop $forever
      (br $forever))
    (i64.const 0)))
"#;

/// A module whose call function calls the imported `env.abort`.
pub(crate) const ABORTING_WAT: &str = r#"
(module
  (import "env" "abort" (func $abort (param i32 i32 i32 i32)))
  (memory (export "memory") 1)
  (func (export "alloc") (param $len i32) (result i32)
    (i32.const 1024))
  (func (export "extract_entities") (param $ptr i32) (param $len i32) (result i64)
    (call $abort (i32.const 0) (i32.const 0) (i32.const 1) (i32.const 1))
    (i64.const 0)))
"#;

/// A module whose call function tries to grow memory past a 1-page cap.
pub(crate) const OVER_MEMORY_WAT: &str = r#"
(module
  (import "env" "abort" (func $abort (param i32 i32 i32 i32)))
  (memory (export "memory") 1)
  (func (export "alloc") (param $len i32) (result i32)
    (i32.const 1024))
  (func (export "classify_error") (param $ptr i32) (param $len i32) (result i64)
    (drop (memory.grow (i32.const 10)))
    (i64.const 0)))
"#;
