//! The universal value model.
//!
//! [`Value`] is the `any` of the wire schema: a discriminated union over the
//! six leaf kinds plus arrays and ordered objects. It is what untyped
//! payload fields (launch configuration blobs, restart data, …) decode
//! into when no concrete schema type applies.

use indexmap::IndexMap;

/// An insertion-ordered mapping from member name to [`Value`].
///
/// Member order is preserved through encode/decode round trips.
pub type Object = IndexMap<String, Value>;

/// A dynamically typed protocol value.
///
/// Unlike an absent optional field, a `Value::Null` stored inside an
/// [`Object`] is a real member and serializes as JSON `null`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// The JSON null value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer. JSON numbers with a fractional part never
    /// decode into this variant.
    Integer(i64),
    /// An IEEE-754 double.
    Number(f64),
    /// A UTF-8 string.
    String(String),
    /// An array of values.
    Array(Vec<Value>),
    /// An ordered string-keyed mapping.
    Object(Object),
}

impl Value {
    /// The kind name of the stored variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// True when the value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The boolean payload, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer payload, if this is an `Integer`.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// The numeric payload. Integers widen to `f64`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// The string payload, if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The array payload, if this is an `Array`.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The object payload, if this is an `Object`.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self {
        Value::Object(v)
    }
}

/// The unit `null` schema type, usable as a variant arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Null;

/// A tagged two-way choice between schema types.
///
/// Wider choices nest: `Variant<A, Variant<B, C>>`. Decoding tries the
/// first arm, then the second.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant<A, B> {
    /// The first alternative.
    First(A),
    /// The second alternative.
    Second(B),
}

impl<A: Default, B> Default for Variant<A, B> {
    fn default() -> Self {
        Variant::First(A::default())
    }
}
