//! Canonicalization and fingerprinting of feature records.
//!
//! `spec.md` §3 invariant 1: feature JSON is canonicalized before hashing
//! (sorted keys, stable number formatting) so logically identical inputs
//! yield identical cache keys. §4.2: fingerprint = FNV-1a 64-bit over the
//! canonicalized JSON.

use serde_json::Value;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Serializes a JSON value with sorted object keys and no insignificant
/// whitespace. `serde_json::Value`'s default map type is a `BTreeMap`
/// (the `preserve_order` feature is not enabled), so `to_string` already
/// emits keys in sorted order; this wrapper exists so the canonicalization
/// step is named and independently testable, per `spec.md`'s round-trip
/// law `canon(canon(x)) == canon(x)`.
#[must_use]
pub fn canonicalize(value: &Value) -> String {
    serde_json::to_string(value).expect("Value serialization is infallible")
}

/// 64-bit FNV-1a hash of a canonicalized feature record, used as the
/// result-cache key (`spec.md` §4.2).
#[must_use]
pub fn fingerprint(value: &Value) -> u64 {
    fnv1a(canonicalize(value).as_bytes())
}

#[must_use]
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
