//! # Value Kinds
//!
//! Bincode bytes carry no type. A `bool` read as an `i64` decodes without
//! complaint, and so does an empty string. The binary format therefore writes
//! the kind of every value in front of its bytes, and a reader refuses bytes
//! whose kind differs from the one its destination type asks for.
//!
//! ## Invariants
//!
//! - Only the outermost shape is compared. Nested values are covered by the
//!   trailing-bytes check and by the registry for `Dynamic`.
//! - Integer widths of one signedness share a kind; the varint encoding is
//!   the same for all of them.
//! - A destination that cannot name its kind up front (`deserialize_any`)
//!   accepts any kind.

use std::fmt;

use serde::de;
use serde::de::DeserializeOwned;
use serde::de::Visitor;
use serde::ser;
use serde::Serialize;

use crate::error::CodecError;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Bool,
    Int,
    Uint,
    F32,
    F64,
    Char,
    Str,
    Bytes,
    Option,
    Unit,
    Seq,
    Map,
    Tuple(usize),
    Struct(&'static str),
    Enum(&'static str),
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Uint => write!(f, "uint"),
            Self::F32 => write!(f, "f32"),
            Self::F64 => write!(f, "f64"),
            Self::Char => write!(f, "char"),
            Self::Str => write!(f, "str"),
            Self::Bytes => write!(f, "bytes"),
            Self::Option => write!(f, "option"),
            Self::Unit => write!(f, "unit"),
            Self::Seq => write!(f, "seq"),
            Self::Map => write!(f, "map"),
            Self::Tuple(len) => write!(f, "tuple({})", len),
            Self::Struct(name) => write!(f, "struct {}", name),
            Self::Enum(name) => write!(f, "enum {}", name),
        }
    }
}

/// The kind of a value, found by starting to serialize it.
pub(crate) fn of_value<T: Serialize + ?Sized>(value: &T) -> Result<Kind> {
    match value.serialize(KindOf) {
        Ok(kind) => Ok(kind),
        Err(Traced::Kind(kind)) => Ok(kind),
        Err(Traced::Other(message)) => Err(CodecError::Encode(message)),
    }
}

/// The kind `T` asks for, found by starting to deserialize it.
pub(crate) fn expected<T: DeserializeOwned>() -> Option<Kind> {
    match T::deserialize(KindTracer) {
        Err(Traced::Kind(kind)) => Some(kind),
        _ => None,
    }
}

#[derive(Debug)]
enum Traced {
    Kind(Kind),
    Other(String),
}

impl fmt::Display for Traced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kind(kind) => write!(f, "kind {}", kind),
            Self::Other(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for Traced {}

impl ser::Error for Traced {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Other(msg.to_string())
    }
}

impl de::Error for Traced {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Other(msg.to_string())
    }
}

/// Serializer that answers with the kind and ignores the contents.
struct KindOf;

/// Swallows the members of a compound value.
struct Skip(Kind);

impl ser::Serializer for KindOf {
    type Ok = Kind;
    type Error = Traced;
    type SerializeSeq = Skip;
    type SerializeTuple = Skip;
    type SerializeTupleStruct = Skip;
    type SerializeTupleVariant = Skip;
    type SerializeMap = Skip;
    type SerializeStruct = Skip;
    type SerializeStructVariant = Skip;

    fn is_human_readable(&self) -> bool {
        false
    }

    fn serialize_bool(self, _v: bool) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Bool)
    }

    fn serialize_i8(self, _v: i8) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Int)
    }

    fn serialize_i16(self, _v: i16) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Int)
    }

    fn serialize_i32(self, _v: i32) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Int)
    }

    fn serialize_i64(self, _v: i64) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Int)
    }

    fn serialize_i128(self, _v: i128) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Int)
    }

    fn serialize_u8(self, _v: u8) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Uint)
    }

    fn serialize_u16(self, _v: u16) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Uint)
    }

    fn serialize_u32(self, _v: u32) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Uint)
    }

    fn serialize_u64(self, _v: u64) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Uint)
    }

    fn serialize_u128(self, _v: u128) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Uint)
    }

    fn serialize_f32(self, _v: f32) -> std::result::Result<Kind, Traced> {
        Ok(Kind::F32)
    }

    fn serialize_f64(self, _v: f64) -> std::result::Result<Kind, Traced> {
        Ok(Kind::F64)
    }

    fn serialize_char(self, _v: char) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Char)
    }

    fn serialize_str(self, _v: &str) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Str)
    }

    fn serialize_bytes(self, _v: &[u8]) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Bytes)
    }

    fn serialize_none(self) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Option)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, _value: &T) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Option)
    }

    fn serialize_unit(self) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Unit)
    }

    fn serialize_unit_struct(self, name: &'static str) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Struct(name))
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        _index: u32,
        _variant: &'static str,
    ) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Enum(name))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        _value: &T,
    ) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Struct(name))
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> std::result::Result<Kind, Traced> {
        Ok(Kind::Enum(name))
    }

    fn serialize_seq(self, _len: Option<usize>) -> std::result::Result<Skip, Traced> {
        Ok(Skip(Kind::Seq))
    }

    fn serialize_tuple(self, len: usize) -> std::result::Result<Skip, Traced> {
        Ok(Skip(Kind::Tuple(len)))
    }

    fn serialize_tuple_struct(self, name: &'static str, _len: usize) -> std::result::Result<Skip, Traced> {
        Ok(Skip(Kind::Struct(name)))
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Skip, Traced> {
        Ok(Skip(Kind::Enum(name)))
    }

    fn serialize_map(self, _len: Option<usize>) -> std::result::Result<Skip, Traced> {
        Ok(Skip(Kind::Map))
    }

    fn serialize_struct(self, name: &'static str, _len: usize) -> std::result::Result<Skip, Traced> {
        Ok(Skip(Kind::Struct(name)))
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Skip, Traced> {
        Ok(Skip(Kind::Enum(name)))
    }
}

impl ser::SerializeSeq for Skip {
    type Ok = Kind;
    type Error = Traced;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, _value: &T) -> std::result::Result<(), Traced> {
        Ok(())
    }

    fn end(self) -> std::result::Result<Kind, Traced> {
        Ok(self.0)
    }
}

impl ser::SerializeTuple for Skip {
    type Ok = Kind;
    type Error = Traced;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, _value: &T) -> std::result::Result<(), Traced> {
        Ok(())
    }

    fn end(self) -> std::result::Result<Kind, Traced> {
        Ok(self.0)
    }
}

impl ser::SerializeTupleStruct for Skip {
    type Ok = Kind;
    type Error = Traced;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _value: &T) -> std::result::Result<(), Traced> {
        Ok(())
    }

    fn end(self) -> std::result::Result<Kind, Traced> {
        Ok(self.0)
    }
}

impl ser::SerializeTupleVariant for Skip {
    type Ok = Kind;
    type Error = Traced;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _value: &T) -> std::result::Result<(), Traced> {
        Ok(())
    }

    fn end(self) -> std::result::Result<Kind, Traced> {
        Ok(self.0)
    }
}

impl ser::SerializeMap for Skip {
    type Ok = Kind;
    type Error = Traced;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, _key: &T) -> std::result::Result<(), Traced> {
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, _value: &T) -> std::result::Result<(), Traced> {
        Ok(())
    }

    fn end(self) -> std::result::Result<Kind, Traced> {
        Ok(self.0)
    }
}

impl ser::SerializeStruct for Skip {
    type Ok = Kind;
    type Error = Traced;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _key: &'static str,
        _value: &T,
    ) -> std::result::Result<(), Traced> {
        Ok(())
    }

    fn end(self) -> std::result::Result<Kind, Traced> {
        Ok(self.0)
    }
}

impl ser::SerializeStructVariant for Skip {
    type Ok = Kind;
    type Error = Traced;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _key: &'static str,
        _value: &T,
    ) -> std::result::Result<(), Traced> {
        Ok(())
    }

    fn end(self) -> std::result::Result<Kind, Traced> {
        Ok(self.0)
    }
}

/// Deserializer that fails with the kind of the first thing it is asked for.
struct KindTracer;

macro_rules! trace_as {
    ($($method:ident => $kind:expr;)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, _visitor: V) -> std::result::Result<V::Value, Traced> {
                Err(Traced::Kind($kind))
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for KindTracer {
    type Error = Traced;

    fn is_human_readable(&self) -> bool {
        false
    }

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> std::result::Result<V::Value, Traced> {
        Err(Traced::Other("kind is decided by the input".into()))
    }

    trace_as! {
        deserialize_bool => Kind::Bool;
        deserialize_i8 => Kind::Int;
        deserialize_i16 => Kind::Int;
        deserialize_i32 => Kind::Int;
        deserialize_i64 => Kind::Int;
        deserialize_i128 => Kind::Int;
        deserialize_u8 => Kind::Uint;
        deserialize_u16 => Kind::Uint;
        deserialize_u32 => Kind::Uint;
        deserialize_u64 => Kind::Uint;
        deserialize_u128 => Kind::Uint;
        deserialize_f32 => Kind::F32;
        deserialize_f64 => Kind::F64;
        deserialize_char => Kind::Char;
        deserialize_str => Kind::Str;
        deserialize_string => Kind::Str;
        deserialize_bytes => Kind::Bytes;
        deserialize_byte_buf => Kind::Bytes;
        deserialize_option => Kind::Option;
        deserialize_unit => Kind::Unit;
        deserialize_seq => Kind::Seq;
        deserialize_map => Kind::Map;
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        _visitor: V,
    ) -> std::result::Result<V::Value, Traced> {
        Err(Traced::Kind(Kind::Struct(name)))
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        _visitor: V,
    ) -> std::result::Result<V::Value, Traced> {
        Err(Traced::Kind(Kind::Struct(name)))
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, _visitor: V) -> std::result::Result<V::Value, Traced> {
        Err(Traced::Kind(Kind::Tuple(len)))
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        _len: usize,
        _visitor: V,
    ) -> std::result::Result<V::Value, Traced> {
        Err(Traced::Kind(Kind::Struct(name)))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> std::result::Result<V::Value, Traced> {
        Err(Traced::Kind(Kind::Struct(name)))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        _variants: &'static [&'static str],
        _visitor: V,
    ) -> std::result::Result<V::Value, Traced> {
        Err(Traced::Kind(Kind::Enum(name)))
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Traced> {
        self.deserialize_any(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Traced> {
        self.deserialize_any(visitor)
    }
}
