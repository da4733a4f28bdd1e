//! Scalar values stored under a key, and the coercions typed getters apply.
//!
//! On disk a value is any JSON scalar or `null`.  In memory it is the
//! tagged `Value` enum; the `as_*` helpers implement the narrowing rules:
//!
//! - `Absent` reads back as `None` through every typed getter.
//! - `Int` widens to `f64` for `as_float`.
//! - Every scalar has a string form for `as_string`.
//! - Anything else is a type mismatch.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// The key -> value mapping of one domain, kept in ascending key order.
pub type Domain = BTreeMap<String, Value>;

/// A single stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// JSON `null`: the key exists but holds no value.
    Absent,
}

/// Returned by the `as_*` helpers when a value does not narrow to the
/// requested type.  Carries the name of the type that was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub found: &'static str,
}

impl Value {
    /// Human-readable name of the stored JSON type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Absent => "null",
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn as_bool(&self) -> Result<Option<bool>, Mismatch> {
        match self {
            Value::Bool(b) => Ok(Some(*b)),
            Value::Absent => Ok(None),
            other => Err(other.mismatch()),
        }
    }

    /// Floats with no fractional part that fit in `i64` narrow, since JSON
    /// writers may emit `5.0` for an integer.
    pub fn as_int(&self) -> Result<Option<i64>, Mismatch> {
        match self {
            Value::Int(i) => Ok(Some(*i)),
            Value::Float(x) if is_integral(*x) => Ok(Some(*x as i64)),
            Value::Absent => Ok(None),
            other => Err(other.mismatch()),
        }
    }

    /// Integers widen with the standard `i64 -> f64` conversion.
    pub fn as_float(&self) -> Result<Option<f64>, Mismatch> {
        match self {
            Value::Float(f) => Ok(Some(*f)),
            Value::Int(i) => Ok(Some(*i as f64)),
            Value::Absent => Ok(None),
            other => Err(other.mismatch()),
        }
    }

    /// Strings pass through; other scalars render as their JSON text.
    pub fn as_string(&self) -> Result<Option<String>, Mismatch> {
        match self {
            Value::String(s) => Ok(Some(s.clone())),
            Value::Absent => Ok(None),
            scalar => Ok(Some(scalar.to_string())),
        }
    }

    fn mismatch(&self) -> Mismatch {
        Mismatch {
            found: self.type_name(),
        }
    }

    /// Convert a parsed JSON value.  Returns `None` for arrays and
    /// objects, which have no place below the key level.
    pub(crate) fn from_json(json: serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Null => Some(Value::Absent),
            serde_json::Value::Bool(b) => Some(Value::Bool(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Value::Int(i)),
                // u64 beyond i64::MAX and real numbers both land here.
                None => n.as_f64().map(Value::Float),
            },
            serde_json::Value::String(s) => Some(Value::String(s)),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

fn is_integral(x: f64) -> bool {
    // 2^63 as f64; i64::MIN is exactly -2^63.
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    x.fract() == 0.0 && (-BOUND..BOUND).contains(&x)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            // Debug keeps the fractional part ("1.0"), matching the JSON text.
            Value::Float(x) => write!(f, "{x:?}"),
            Value::String(s) => f.write_str(s),
            Value::Absent => f.write_str("null"),
        }
    }
}

impl Zeroize for Value {
    fn zeroize(&mut self) {
        if let Value::String(s) = self {
            s.zeroize();
        }
        *self = Value::Absent;
    }
}

// ---------------------------------------------------------------------------
// Conversions used by the putters
// ---------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Absent, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Serde
// ---------------------------------------------------------------------------

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::String(s) => serializer.serialize_str(s),
            Value::Absent => serializer.serialize_unit(),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Value::from_json(json)
            .ok_or_else(|| serde::de::Error::custom("expected a scalar or null, found a container"))
    }
}

// ── Tests ────────────────────────────────────────────────────────────
