//! The three signal processors share this scaffold (`spec.md` §4.4): a
//! per-item feature record, an inference call, attribute write-back, and
//! (for traces/logs) a serial sampling pass.
//!
//! The teacher's per-signal duplication (`spec.md` §9: "Duplicate
//! per-signal processors... collapse into one") is replaced here by one
//! parameterized fan-out/apply helper (`map_parallel_or_serial`) rather
//! than a `Signal` enum over the item type, since traces/logs/metrics
//! differ enough in their per-item shape (span vs. log record vs. data
//! point) that a single generic item trait would obscure more than it
//! shares; the commonality that *does* repeat -- "maybe parallel, then
//! serially apply" -- is factored out instead.

pub mod logs;
pub mod metrics;
pub mod traces;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::Result;
use crate::model::{AttributeValue, Attributes};
use crate::pool::WorkerPool;

/// The downstream sink a processor forwards its (possibly filtered,
/// possibly enriched) batch to (`spec.md` §6).
#[async_trait]
pub trait Consumer<T>: Send + Sync {
    async fn consume(&self, batch: T) -> anyhow::Result<()>;

    fn capabilities(&self) -> Capabilities {
        Capabilities { mutates_data: true }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Capabilities {
    pub mutates_data: bool,
}

/// Runs `f` over `items` serially, or fanned out across `pool` with a
/// barrier before returning, per-item ordering of the *output* is always
/// preserved regardless of mode (`spec.md` §4.4: "Parallelism").
pub(crate) async fn map_parallel_or_serial<I, O, F, Fut>(
    pool: Option<&WorkerPool>,
    items: Vec<I>,
    f: F,
) -> Vec<O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
{
    let Some(pool) = pool else {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(f(item).await);
        }
        return out;
    };

    let n = items.len();
    let results: Arc<Vec<Mutex<Option<O>>>> =
        Arc::new((0..n).map(|_| Mutex::new(None)).collect());
    let f = Arc::new(f);

    for (idx, item) in items.into_iter().enumerate() {
        let results = results.clone();
        let f = f.clone();
        let _ = pool
            .submit(move || async move {
                let value = f(item).await;
                *results[idx].lock() = Some(value);
            })
            .await;
    }
    pool.wait().await;

    Arc::try_unwrap(results)
        .unwrap_or_else(|arc| (*arc).iter().map(|_| Mutex::new(None)).collect())
        .into_iter()
        .map(|m| m.into_inner().expect("every submitted item completed before wait() returned"))
        .collect()
}

/// Writes every top-level field of `result` onto `attrs` under
/// `namespace`, truncating string values to `max_len` bytes
/// (`spec.md` §3/§6, §9's tagged-sum `setAttribute`).
pub(crate) fn write_enrichment(
    attrs: &mut Attributes,
    result: &Value,
    namespace: &str,
    max_len: usize,
) {
    let Value::Object(fields) = result else {
        return;
    };
    for (key, value) in fields {
        if let Some(attr) = AttributeValue::from_json(value) {
            crate::model::set_attribute(
                attrs,
                format!("{namespace}{key}"),
                attr.truncated(max_len),
            );
        }
    }
}

/// The three-way sampling decision shared by traces and logs
/// (`spec.md` §4.4.1/§4.4.2).
pub(crate) enum Verdict {
    Keep,
    Drop,
}

pub(crate) fn verdict_from_bool(keep: bool) -> Verdict {
    if keep { Verdict::Keep } else { Verdict::Drop }
}

async fn sample_via_model(
    runtime: &dyn crate::wasm::InferenceRuntime,
    features: &Value,
    normal_rate: f64,
) -> Verdict {
    match runtime.sample_telemetry(features).await {
        Ok(result) => {
            let importance = result
                .get("importance")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);
            let p = (normal_rate * importance).clamp(0.0, 1.0);
            verdict_from_bool(rand::random::<f64>() < p)
        }
        Err(_) => verdict_from_bool(rand::random::<f64>() < normal_rate),
    }
}

pub(crate) use sample_via_model as sample_fallback_to_normal_rate;
