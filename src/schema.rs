//! Runtime schema types and the descriptor registry.
//!
//! Every value that crosses the wire implements [`Schema`]: a wire name
//! plus codec-driven encode/decode. The registry hands out one
//! [`TypeDescriptor`] per schema type, created on first use and kept for
//! the lifetime of the process, so type-erased code (handler tables,
//! pending-response entries) can construct, encode, and decode instances
//! without knowing the concrete type.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

use crate::codec::{CodecError, Decoder, Encoder};
use crate::value::{Null, Object, Value, Variant};

/// A schema-described value.
///
/// Implementations come from three places: the fixed primitives below, the
/// parameterized composites (`Vec<T>`, `Option<T>`, [`Variant`]), and
/// structs declared through [`schema_struct!`](crate::schema_struct).
/// `Default` supplies the descriptor's construct operation.
pub trait Schema: Default + Send + Sized + 'static {
    /// The name of this type on the wire.
    fn schema_name() -> Cow<'static, str>;

    /// Write this value into the encoder's node.
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<(), CodecError>;

    /// Read a value from the decoder's node.
    fn decode(dec: &Decoder<'_>) -> Result<Self, CodecError>;
}

impl Schema for bool {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("boolean")
    }

    fn encode(&self, enc: &mut Encoder<'_>) -> Result<(), CodecError> {
        enc.put_bool(*self);
        Ok(())
    }

    fn decode(dec: &Decoder<'_>) -> Result<Self, CodecError> {
        dec.bool()
    }
}

impl Schema for i64 {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("integer")
    }

    fn encode(&self, enc: &mut Encoder<'_>) -> Result<(), CodecError> {
        enc.put_integer(*self);
        Ok(())
    }

    fn decode(dec: &Decoder<'_>) -> Result<Self, CodecError> {
        dec.integer()
    }
}

impl Schema for f64 {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("number")
    }

    fn encode(&self, enc: &mut Encoder<'_>) -> Result<(), CodecError> {
        enc.put_number(*self)
    }

    fn decode(dec: &Decoder<'_>) -> Result<Self, CodecError> {
        dec.number()
    }
}

impl Schema for String {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("string")
    }

    fn encode(&self, enc: &mut Encoder<'_>) -> Result<(), CodecError> {
        enc.put_string(self);
        Ok(())
    }

    fn decode(dec: &Decoder<'_>) -> Result<Self, CodecError> {
        dec.string()
    }
}

impl Schema for Value {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("any")
    }

    fn encode(&self, enc: &mut Encoder<'_>) -> Result<(), CodecError> {
        enc.put_any(self)
    }

    fn decode(dec: &Decoder<'_>) -> Result<Self, CodecError> {
        dec.any()
    }
}

impl Schema for Object {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("object")
    }

    fn encode(&self, enc: &mut Encoder<'_>) -> Result<(), CodecError> {
        enc.object(|fields| {
            for (name, value) in self {
                fields.field(name, value)?;
            }
            Ok(())
        })
    }

    fn decode(dec: &Decoder<'_>) -> Result<Self, CodecError> {
        dec.object()
    }
}

impl Schema for Null {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("null")
    }

    fn encode(&self, enc: &mut Encoder<'_>) -> Result<(), CodecError> {
        enc.put_null();
        Ok(())
    }

    fn decode(dec: &Decoder<'_>) -> Result<Self, CodecError> {
        match dec.any()? {
            Value::Null => Ok(Null),
            _ => Err(dec.mismatch("null")),
        }
    }
}

impl<T: Schema> Schema for Vec<T> {
    fn schema_name() -> Cow<'static, str> {
        Cow::Owned(format!("array<{}>", T::schema_name()))
    }

    fn encode(&self, enc: &mut Encoder<'_>) -> Result<(), CodecError> {
        enc.array(self.len(), |i, element| self[i].encode(element))
    }

    fn decode(dec: &Decoder<'_>) -> Result<Self, CodecError> {
        dec.elements()?.map(|element| T::decode(&element)).collect()
    }
}

impl<T: Schema> Schema for Option<T> {
    fn schema_name() -> Cow<'static, str> {
        Cow::Owned(format!("optional<{}>", T::schema_name()))
    }

    fn encode(&self, enc: &mut Encoder<'_>) -> Result<(), CodecError> {
        match self {
            Some(value) => value.encode(enc),
            None => {
                enc.remove();
                Ok(())
            }
        }
    }

    // A value that fails to decode leaves the optional absent rather than
    // failing the enclosing struct.
    fn decode(dec: &Decoder<'_>) -> Result<Self, CodecError> {
        if dec.is_absent() {
            return Ok(None);
        }
        Ok(T::decode(dec).ok())
    }
}

impl<A: Schema, B: Schema> Schema for Variant<A, B> {
    fn schema_name() -> Cow<'static, str> {
        Cow::Owned(format!(
            "variant<{}|{}>",
            A::schema_name(),
            B::schema_name()
        ))
    }

    fn encode(&self, enc: &mut Encoder<'_>) -> Result<(), CodecError> {
        match self {
            Variant::First(a) => a.encode(enc),
            Variant::Second(b) => b.encode(enc),
        }
    }

    fn decode(dec: &Decoder<'_>) -> Result<Self, CodecError> {
        if let Ok(a) = A::decode(dec) {
            return Ok(Variant::First(a));
        }
        if let Ok(b) = B::decode(dec) {
            return Ok(Variant::Second(b));
        }
        Err(dec.mismatch("variant"))
    }
}

type ConstructFn = fn() -> Box<dyn Any + Send>;
type EncodeFn = fn(&(dyn Any + Send), &mut Encoder<'_>) -> Result<(), CodecError>;
type DecodeFn = fn(&Decoder<'_>) -> Result<Box<dyn Any + Send>, CodecError>;

/// The runtime handle on one schema type: its wire name plus type-erased
/// construct, encode, and decode operations.
///
/// Descriptors are process-lifetime singletons; comparing two descriptor
/// references by address tells whether they describe the same type.
pub struct TypeDescriptor {
    name: String,
    construct_fn: ConstructFn,
    encode_fn: EncodeFn,
    decode_fn: DecodeFn,
}

impl TypeDescriptor {
    /// The wire name of the described type.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Construct a default instance of the described type.
    pub fn construct(&self) -> Box<dyn Any + Send> {
        (self.construct_fn)()
    }

    /// Encode an instance of the described type.
    ///
    /// Fails when `value` is not an instance of the described type.
    pub fn encode(
        &self,
        value: &(dyn Any + Send),
        enc: &mut Encoder<'_>,
    ) -> Result<(), CodecError> {
        (self.encode_fn)(value, enc)
    }

    /// Decode an instance of the described type.
    pub fn decode(&self, dec: &Decoder<'_>) -> Result<Box<dyn Any + Send>, CodecError> {
        (self.decode_fn)(dec)
    }
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .finish()
    }
}

fn erased_construct<T: Schema>() -> Box<dyn Any + Send> {
    Box::new(T::default())
}

fn erased_encode<T: Schema>(
    value: &(dyn Any + Send),
    enc: &mut Encoder<'_>,
) -> Result<(), CodecError> {
    match value.downcast_ref::<T>() {
        Some(value) => value.encode(enc),
        None => Err(CodecError::TypeMismatch {
            expected: "instance of described type",
            found: "foreign value".into(),
        }),
    }
}

fn erased_decode<T: Schema>(dec: &Decoder<'_>) -> Result<Box<dyn Any + Send>, CodecError> {
    Ok(Box::new(T::decode(dec)?))
}

#[derive(Default)]
struct Registry {
    by_type: RwLock<HashMap<TypeId, &'static TypeDescriptor>>,
    by_name: RwLock<HashMap<String, &'static TypeDescriptor>>,
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::default);

/// The descriptor for `T`, created on first use and cached for the process
/// lifetime. This is the encode-side lookup, keyed by type identity.
pub fn type_of<T: Schema>() -> &'static TypeDescriptor {
    let id = TypeId::of::<T>();
    if let Some(desc) = REGISTRY.by_type.read().unwrap().get(&id).copied() {
        return desc;
    }

    let mut by_type = REGISTRY.by_type.write().unwrap();
    if let Some(desc) = by_type.get(&id).copied() {
        return desc;
    }
    let desc: &'static TypeDescriptor = Box::leak(Box::new(TypeDescriptor {
        name: T::schema_name().into_owned(),
        construct_fn: erased_construct::<T>,
        encode_fn: erased_encode::<T>,
        decode_fn: erased_decode::<T>,
    }));
    by_type.insert(id, desc);
    drop(by_type);

    // Request/response pairs share a wire name; the first registration
    // under a name wins.
    REGISTRY
        .by_name
        .write()
        .unwrap()
        .entry(desc.name.clone())
        .or_insert(desc);
    desc
}

/// Look up a descriptor by schema name. This is the decode-side lookup;
/// it only sees types whose descriptors have already been created.
pub fn find_type(name: &str) -> Option<&'static TypeDescriptor> {
    REGISTRY.by_name.read().unwrap().get(name).copied()
}

/// Declare a struct schema type.
///
/// Generates the struct (all fields public, `Debug`/`Clone`/`PartialEq`/
/// `Default` derived) and its [`Schema`] implementation: fields encode in
/// declaration order under their wire names, absent optionals are omitted,
/// and decoding binds fields by name with missing members read through the
/// absent decoder.
///
/// ```
/// dapter::schema_struct! {
///     /// A point on a source line.
///     pub struct Position = "Position" {
///         /// One-based line.
///         line "line": i64,
///         /// One-based column, when known.
///         column "column": Option<i64>,
///     }
/// }
/// ```
#[macro_export]
macro_rules! schema_struct {
    (
        $(#[$meta:meta])*
        pub struct $name:ident = $wire:literal {
            $(
                $(#[$fmeta:meta])*
                $field:ident $fwire:literal : $fty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Default)]
        pub struct $name {
            $(
                $(#[$fmeta])*
                pub $field: $fty,
            )*
        }

        impl $crate::schema::Schema for $name {
            fn schema_name() -> ::std::borrow::Cow<'static, str> {
                ::std::borrow::Cow::Borrowed($wire)
            }

            fn encode(
                &self,
                enc: &mut $crate::codec::Encoder<'_>,
            ) -> ::std::result::Result<(), $crate::codec::CodecError> {
                enc.object(|fields| {
                    let _ = &fields;
                    $( fields.field($fwire, &self.$field)?; )*
                    Ok(())
                })
            }

            fn decode(
                dec: &$crate::codec::Decoder<'_>,
            ) -> ::std::result::Result<Self, $crate::codec::CodecError> {
                let _ = &dec;
                Ok(Self {
                    $( $field: $crate::codec::decode_field(dec, $fwire)?, )*
                })
            }
        }
    };
}

/// Associate a request schema type with its response type.
#[macro_export]
macro_rules! schema_request {
    ($request:ty => $response:ty) => {
        impl $crate::session::Request for $request {
            type Response = $response;
        }
        impl $crate::session::Response for $response {}
    };
}

/// Mark a schema type as an event.
#[macro_export]
macro_rules! schema_event {
    ($event:ty) => {
        impl $crate::session::Event for $event {}
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};
    use serde_json::json;

    crate::schema_struct! {
        /// Exercises every composite the codec supports.
        pub struct Fixture = "fixture" {
            flag "flag": bool,
            count "count": i64,
            ratio "ratio": f64,
            label "label": String,
            items "items": Vec<i64>,
            extras "extras": Object,
            maybe "maybe": Option<i64>,
            nested "nested": Option<Inner>,
        }
    }

    crate::schema_struct! {
        pub struct Inner = "inner" {
            id "id": i64,
        }
    }

    crate::schema_struct! {
        pub struct Empty = "empty" {}
    }

    fn sample() -> Fixture {
        let mut extras = Object::new();
        extras.insert("one".into(), Value::Integer(1));
        extras.insert("pi".into(), Value::Number(3.5));
        Fixture {
            flag: true,
            count: 32,
            ratio: 123.456,
            label: "hello world".into(),
            items: vec![2, 4, 6, 8],
            extras,
            maybe: None,
            nested: Some(Inner { id: 70 }),
        }
    }

    #[test]
    fn schema_struct_roundtrip() {
        let original = sample();
        let json = encode(&original).unwrap();
        let decoded: Fixture = decode(&json).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn schema_struct_fields_in_declaration_order() {
        let json = encode(&sample()).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| &**k).collect();
        assert_eq!(
            keys,
            ["flag", "count", "ratio", "label", "items", "extras", "nested"]
        );
    }

    #[test]
    fn schema_absent_optional_is_omitted_not_null() {
        let json = encode(&sample()).unwrap();
        assert!(json.as_object().unwrap().get("maybe").is_none());
    }

    #[test]
    fn schema_present_optional_roundtrips() {
        let mut fixture = sample();
        fixture.maybe = Some(42);
        let json = encode(&fixture).unwrap();
        assert_eq!(json["maybe"], json!(42));
        let decoded: Fixture = decode(&json).unwrap();
        assert_eq!(decoded.maybe, Some(42));
    }

    #[test]
    fn schema_unknown_json_fields_are_ignored() {
        let mut json = encode(&sample()).unwrap();
        json.as_object_mut()
            .unwrap()
            .insert("surplus".into(), json!("ignored"));
        let decoded: Fixture = decode(&json).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn schema_missing_required_field_errors() {
        let mut json = encode(&sample()).unwrap();
        json.as_object_mut().unwrap().shift_remove("count");
        let err = decode::<Fixture>(&json).unwrap_err();
        assert!(err.to_string().contains("field 'count'"));
    }

    #[test]
    fn schema_mistyped_optional_decodes_as_absent() {
        let mut json = encode(&sample()).unwrap();
        json.as_object_mut()
            .unwrap()
            .insert("maybe".into(), json!("not an integer"));
        let decoded: Fixture = decode(&json).unwrap();
        assert_eq!(decoded.maybe, None);
    }

    #[test]
    fn schema_empty_struct_encodes_to_empty_object() {
        let json = encode(&Empty::default()).unwrap();
        assert_eq!(serde_json::to_string(&json).unwrap(), "{}");
        let _: Empty = decode(&json).unwrap();
    }

    #[test]
    fn schema_primitive_names() {
        assert_eq!(bool::schema_name(), "boolean");
        assert_eq!(i64::schema_name(), "integer");
        assert_eq!(f64::schema_name(), "number");
        assert_eq!(String::schema_name(), "string");
        assert_eq!(Value::schema_name(), "any");
        assert_eq!(Object::schema_name(), "object");
        assert_eq!(Null::schema_name(), "null");
    }

    #[test]
    fn schema_composite_names() {
        assert_eq!(Vec::<i64>::schema_name(), "array<integer>");
        assert_eq!(Option::<String>::schema_name(), "optional<string>");
        assert_eq!(
            Variant::<i64, String>::schema_name(),
            "variant<integer|string>"
        );
        assert_eq!(
            Vec::<Option<i64>>::schema_name(),
            "array<optional<integer>>"
        );
    }

    #[test]
    fn schema_variant_decodes_first_matching_arm() {
        let v: Variant<i64, String> = decode(&json!(5)).unwrap();
        assert_eq!(v, Variant::First(5));
        let v: Variant<i64, String> = decode(&json!("five")).unwrap();
        assert_eq!(v, Variant::Second("five".into()));
        assert!(decode::<Variant<i64, String>>(&json!(true)).is_err());
    }

    #[test]
    fn schema_null_type_roundtrip() {
        let json = encode(&Null).unwrap();
        assert!(json.is_null());
        let _: Null = decode(&json).unwrap();
        assert!(decode::<Null>(&json!(0)).is_err());
    }

    #[test]
    fn schema_descriptor_is_singleton() {
        let a = type_of::<Fixture>();
        let b = type_of::<Fixture>();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.name(), "fixture");
    }

    #[test]
    fn schema_descriptor_erased_operations() {
        let desc = type_of::<Inner>();
        let blank = desc.construct();
        assert_eq!(blank.downcast_ref::<Inner>(), Some(&Inner::default()));

        let value = Inner { id: 9 };
        let mut node = serde_json::Value::Null;
        let mut enc = Encoder::new(&mut node);
        desc.encode(&value, &mut enc).unwrap();
        assert_eq!(node, json!({"id": 9}));

        let decoded = desc.decode(&Decoder::new(&node)).unwrap();
        assert_eq!(decoded.downcast_ref::<Inner>(), Some(&value));
    }

    #[test]
    fn schema_descriptor_encode_rejects_foreign_value() {
        let desc = type_of::<Inner>();
        let mut node = serde_json::Value::Null;
        let mut enc = Encoder::new(&mut node);
        assert!(desc.encode(&Fixture::default(), &mut enc).is_err());
    }

    #[test]
    fn schema_find_type_by_name() {
        let _ = type_of::<Inner>();
        let found = find_type("inner").expect("registered");
        assert!(std::ptr::eq(found, type_of::<Inner>()));
        assert!(find_type("never-declared").is_none());
    }
}
