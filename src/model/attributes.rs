use indexmap::IndexMap;
use serde_json::Value;

/// A single attribute value.
///
/// The spec requires string/bool/int/double to round-trip; `Bytes` and
/// `Array` are the permitted implementer extension (`spec.md` §3).
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Double(f64),
    Bytes(Vec<u8>),
    Array(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Converts a decoded JSON scalar/array into an attribute value, if
    /// the shape is one the model supports. Objects are rejected -- a
    /// feature/result's top-level fields are expected to be scalars or
    /// arrays of scalars (`spec.md` §3 "Inference result").
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Int(i))
                } else {
                    n.as_f64().map(Self::Double)
                }
            }
            Value::Array(items) => Some(Self::Array(
                items.iter().filter_map(Self::from_json).collect(),
            )),
            Value::Null | Value::Object(_) => None,
        }
    }

    /// Serializes arrays of primitives to a JSON string so they can be
    /// attached to sinks that cannot hold nested array attributes
    /// (`spec.md` §3).
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Str(s) => Value::String(s.clone()),
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Number((*i).into()),
            Self::Double(d) => serde_json::Number::from_f64(*d)
                .map_or(Value::Null, Value::Number),
            Self::Bytes(b) => Value::String(hex_encode(b)),
            Self::Array(items) => {
                Value::Array(items.iter().map(AttributeValue::to_json).collect())
            }
        }
    }

    /// Truncates string values to `max_len` bytes, preserving UTF-8
    /// character boundaries (`spec.md` §6).
    #[must_use]
    pub fn truncated(self, max_len: usize) -> Self {
        match self {
            Self::Str(s) if s.len() > max_len => {
                let mut end = max_len;
                while end > 0 && !s.is_char_boundary(end) {
                    end -= 1;
                }
                Self::Str(s[..end].to_string())
            }
            other => other,
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// An insertion-ordered attribute map. Insertion order is preserved so
/// namespace-discipline tests can assert on output shape deterministically.
pub type Attributes = IndexMap<String, AttributeValue>;

/// Writes `value` under `key`, dispatching on the value's tag. Used by
/// every enrichment step so attribute-setting logic lives in one place
/// (`spec.md` §9: attribute polymorphism modeled as a tagged sum type
/// consumed by a single dispatching `setAttribute`).
pub fn set_attribute(map: &mut Attributes, key: impl Into<String>, value: AttributeValue) {
    map.insert(key.into(), value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let v = AttributeValue::Str("héllo".to_string()); // 'é' is 2 bytes
        let truncated = v.truncated(2);
        assert_eq!(truncated, AttributeValue::Str("h".to_string()));
    }

    #[test]
    fn array_roundtrips_through_json() {
        let v = AttributeValue::Array(vec![
            AttributeValue::Str("a".to_string()),
            AttributeValue::Int(1),
        ]);
        let json = v.to_json();
        assert_eq!(json, serde_json::json!(["a", 1]));
    }
}
