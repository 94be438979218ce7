//! Schema-driven JSON codec.
//!
//! The codec walks a [`Schema`](crate::schema::Schema) implementation over
//! a `serde_json` document: [`Encoder`] builds the JSON node for a value,
//! [`Decoder`] reads one back. Struct fields bind by wire name; an absent
//! field decodes against the [absent decoder](Decoder::absent), which fails
//! every primitive read so that optional fields stay absent and required
//! fields error.

use serde_json::Value as Json;
use thiserror::Error;

use crate::schema::Schema;
use crate::value::{Object, Value};

/// Errors produced while encoding or decoding protocol values.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(String),

    /// A JSON node did not have the type the schema requires.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// The schema kind that was expected.
        expected: &'static str,
        /// The kind of the node actually present, or `"nothing"`.
        found: String,
    },

    /// A nested error, annotated with the field it occurred in.
    #[error("field '{name}': {source}")]
    Field {
        /// Wire name of the offending field.
        name: String,
        /// The underlying error.
        #[source]
        source: Box<CodecError>,
    },

    /// A `number` value was NaN or infinite and cannot appear in JSON.
    #[error("number is not finite")]
    NonFiniteNumber,
}

/// Parse a raw payload into a JSON document.
pub fn parse(bytes: &[u8]) -> Result<Json, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Json(e.to_string()))
}

/// Encode a schema value into a JSON document.
pub fn encode<T: Schema>(value: &T) -> Result<Json, CodecError> {
    let mut node = Json::Null;
    let mut enc = Encoder::new(&mut node);
    value.encode(&mut enc)?;
    Ok(node)
}

/// Decode a schema value from a JSON document.
pub fn decode<T: Schema>(json: &Json) -> Result<T, CodecError> {
    T::decode(&Decoder::new(json))
}

/// Decode a struct field by wire name, annotating errors with the name.
pub fn decode_field<T: Schema>(dec: &Decoder<'_>, name: &str) -> Result<T, CodecError> {
    let in_field = |e: CodecError| CodecError::Field {
        name: name.to_string(),
        source: Box::new(e),
    };
    let field = dec.field(name).map_err(in_field)?;
    T::decode(&field).map_err(in_field)
}

/// Writes one JSON node under schema control.
pub struct Encoder<'a> {
    node: &'a mut Json,
    removed: bool,
}

impl<'a> Encoder<'a> {
    /// An encoder that writes into `node`.
    pub fn new(node: &'a mut Json) -> Self {
        Self {
            node,
            removed: false,
        }
    }

    /// Store a boolean.
    pub fn put_bool(&mut self, v: bool) {
        *self.node = Json::Bool(v);
    }

    /// Store an integer. Always emitted without a fractional part.
    pub fn put_integer(&mut self, v: i64) {
        *self.node = Json::from(v);
    }

    /// Store a number. Fails on NaN and infinities, which JSON cannot carry.
    pub fn put_number(&mut self, v: f64) -> Result<(), CodecError> {
        let n = serde_json::Number::from_f64(v).ok_or(CodecError::NonFiniteNumber)?;
        *self.node = Json::Number(n);
        Ok(())
    }

    /// Store a string.
    pub fn put_string(&mut self, v: &str) {
        *self.node = Json::String(v.to_string());
    }

    /// Store a JSON null.
    pub fn put_null(&mut self) {
        *self.node = Json::Null;
    }

    /// Store a dynamically typed [`Value`], dispatching on its variant.
    pub fn put_any(&mut self, v: &Value) -> Result<(), CodecError> {
        *self.node = any_to_json(v)?;
        Ok(())
    }

    /// Store an array of `len` elements, each written by `f`.
    pub fn array<F>(&mut self, len: usize, mut f: F) -> Result<(), CodecError>
    where
        F: FnMut(usize, &mut Encoder<'_>) -> Result<(), CodecError>,
    {
        let mut items = Vec::with_capacity(len);
        for i in 0..len {
            let mut node = Json::Null;
            let mut enc = Encoder::new(&mut node);
            f(i, &mut enc)?;
            items.push(node);
        }
        *self.node = Json::Array(items);
        Ok(())
    }

    /// Store an object whose members are written through a [`FieldEncoder`].
    pub fn object<F>(&mut self, f: F) -> Result<(), CodecError>
    where
        F: FnOnce(&mut FieldEncoder<'_>) -> Result<(), CodecError>,
    {
        *self.node = Json::Object(serde_json::Map::new());
        let map = match self.node {
            Json::Object(map) => map,
            _ => unreachable!(),
        };
        let mut fields = FieldEncoder { map };
        f(&mut fields)
    }

    /// Mark this value as removed: the enclosing struct field is omitted
    /// from the output instead of being emitted as `null`.
    pub fn remove(&mut self) {
        self.removed = true;
    }
}

/// Writes the members of a JSON object in declaration order.
pub struct FieldEncoder<'a> {
    map: &'a mut serde_json::Map<String, Json>,
}

impl FieldEncoder<'_> {
    /// Encode one member. Values that mark themselves removed (absent
    /// optionals) are not inserted.
    pub fn field<T: Schema>(&mut self, name: &str, value: &T) -> Result<(), CodecError> {
        let mut node = Json::Null;
        let mut enc = Encoder::new(&mut node);
        value.encode(&mut enc)?;
        if !enc.removed {
            self.map.insert(name.to_string(), node);
        }
        Ok(())
    }
}

fn any_to_json(v: &Value) -> Result<Json, CodecError> {
    Ok(match v {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(i) => Json::from(*i),
        Value::Number(n) => {
            Json::Number(serde_json::Number::from_f64(*n).ok_or(CodecError::NonFiniteNumber)?)
        }
        Value::String(s) => Json::String(s.clone()),
        Value::Array(items) => Json::Array(
            items
                .iter()
                .map(any_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Object(obj) => {
            let mut map = serde_json::Map::with_capacity(obj.len());
            for (key, val) in obj {
                map.insert(key.clone(), any_to_json(val)?);
            }
            Json::Object(map)
        }
    })
}

fn json_to_any(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            // Fractional, or an unsigned value beyond the i64 range.
            None => Value::Number(n.as_f64().unwrap_or(f64::MAX)),
        },
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::Array(items.iter().map(json_to_any).collect()),
        Json::Object(map) => {
            let mut obj = Object::with_capacity(map.len());
            for (key, val) in map {
                obj.insert(key.clone(), json_to_any(val));
            }
            Value::Object(obj)
        }
    }
}

/// Reads one JSON node under schema control.
///
/// A decoder either wraps a present JSON node or is *absent* (a missing
/// struct field). The absent decoder fails every read except those that
/// model absence, mirroring how missing members behave on the wire.
#[derive(Clone, Copy)]
pub struct Decoder<'a> {
    node: Option<&'a Json>,
}

impl<'a> Decoder<'a> {
    /// A decoder over a present JSON node.
    pub fn new(node: &'a Json) -> Self {
        Self { node: Some(node) }
    }

    /// The decoder for a missing field. All primitive reads fail.
    pub fn absent() -> Self {
        Self { node: None }
    }

    /// True when this decoder stands in for a missing field.
    pub fn is_absent(&self) -> bool {
        self.node.is_none()
    }

    fn found(&self) -> String {
        match self.node {
            None => "nothing".to_string(),
            Some(Json::Null) => "null".to_string(),
            Some(Json::Bool(_)) => "boolean".to_string(),
            Some(Json::Number(n)) if n.as_i64().is_some() => "integer".to_string(),
            Some(Json::Number(_)) => "number".to_string(),
            Some(Json::String(_)) => "string".to_string(),
            Some(Json::Array(_)) => "array".to_string(),
            Some(Json::Object(_)) => "object".to_string(),
        }
    }

    pub(crate) fn mismatch(&self, expected: &'static str) -> CodecError {
        CodecError::TypeMismatch {
            expected,
            found: self.found(),
        }
    }

    /// Read a boolean.
    pub fn bool(&self) -> Result<bool, CodecError> {
        match self.node {
            Some(Json::Bool(b)) => Ok(*b),
            _ => Err(self.mismatch("boolean")),
        }
    }

    /// Read an integer. JSON numbers with a fractional part are rejected.
    pub fn integer(&self) -> Result<i64, CodecError> {
        match self.node {
            Some(Json::Number(n)) => n.as_i64().ok_or_else(|| self.mismatch("integer")),
            _ => Err(self.mismatch("integer")),
        }
    }

    /// Read a number. Integer and fractional JSON numbers both succeed.
    pub fn number(&self) -> Result<f64, CodecError> {
        match self.node {
            Some(Json::Number(n)) => n.as_f64().ok_or_else(|| self.mismatch("number")),
            _ => Err(self.mismatch("number")),
        }
    }

    /// Read a string.
    pub fn string(&self) -> Result<String, CodecError> {
        match self.node {
            Some(Json::String(s)) => Ok(s.clone()),
            _ => Err(self.mismatch("string")),
        }
    }

    /// Read a dynamically typed [`Value`], recovering its variant from the
    /// JSON node kind.
    pub fn any(&self) -> Result<Value, CodecError> {
        match self.node {
            Some(json) => Ok(json_to_any(json)),
            None => Err(self.mismatch("any")),
        }
    }

    /// Read an ordered object whose members decode as [`Value`]s.
    pub fn object(&self) -> Result<Object, CodecError> {
        match self.node {
            Some(Json::Object(map)) => {
                let mut obj = Object::with_capacity(map.len());
                for (key, val) in map {
                    obj.insert(key.clone(), json_to_any(val));
                }
                Ok(obj)
            }
            _ => Err(self.mismatch("object")),
        }
    }

    /// The number of members or elements of the node, zero otherwise.
    pub fn count(&self) -> usize {
        match self.node {
            Some(Json::Array(items)) => items.len(),
            Some(Json::Object(map)) => map.len(),
            _ => 0,
        }
    }

    /// Iterate the elements of an array node.
    pub fn elements(&self) -> Result<impl Iterator<Item = Decoder<'a>> + 'a, CodecError> {
        match self.node {
            Some(Json::Array(items)) => Ok(items.iter().map(Decoder::new)),
            _ => Err(self.mismatch("array")),
        }
    }

    /// Access a member by wire name.
    ///
    /// Structured nodes (objects and arrays) yield the member's decoder, or
    /// the absent decoder when no such member exists. Accessing a field of
    /// an unstructured node is an error, as is reading through the absent
    /// decoder.
    pub fn field(&self, name: &str) -> Result<Decoder<'a>, CodecError> {
        match self.node {
            Some(Json::Object(map)) => Ok(map
                .get(name)
                .map(Decoder::new)
                .unwrap_or_else(Decoder::absent)),
            Some(Json::Array(_)) => Ok(Decoder::absent()),
            _ => Err(self.mismatch("object")),
        }
    }
}
