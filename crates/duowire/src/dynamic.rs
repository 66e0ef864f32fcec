//! # Dynamic Values
//!
//! A `Dynamic` holds a value whose concrete type is chosen by the sender.
//! It is how a parameter or result says "any registered type".
//!
//! On the wire:
//!
//! - Self-describing formats write `{"type": <name>, "value": <value>}`.
//!   No registration is needed; the receiver keeps the decoded tree and
//!   converts it on demand.
//! - The schema-registered format writes `(name, bytes)`. The concrete type
//!   must be registered on both sides; a miss fails the encode or decode
//!   with `CodecError::Unregistered`.

use std::any::Any;
use std::any::TypeId;

use serde::de::DeserializeOwned;
use serde::de;
use serde::ser;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::error::CodecError;
use crate::error::Result;
use crate::format::WireType;
use crate::registry;
use crate::registry::AnyValue;

enum Inner {
    /// A live value of a known Rust type.
    Native {
        value: AnyValue,
        type_id: TypeId,
        to_json: fn(&(dyn Any + Send + Sync)) -> Result<serde_json::Value>,
    },
    /// A value decoded from a self-describing format.
    Tree(serde_json::Value),
}

/// A value of any wire type.
pub struct Dynamic {
    type_name: String,
    inner: Inner,
}

#[derive(Serialize)]
struct TaggedRef<'a> {
    #[serde(rename = "type")]
    type_name: &'a str,
    value: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct Tagged {
    #[serde(rename = "type")]
    type_name: String,
    value: serde_json::Value,
}

impl Dynamic {
    pub fn new<T: WireType>(value: T) -> Self {
        let entry = registry::TypeEntry::of::<T>();
        Self {
            type_name: entry.type_name.to_owned(),
            inner: Inner::Native {
                value: Box::new(value),
                type_id: entry.type_id,
                to_json: entry.to_json,
            },
        }
    }

    /// The name of the concrete type, as the sender knew it.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is<T: 'static>(&self) -> bool {
        match &self.inner {
            Inner::Native { type_id, .. } => *type_id == TypeId::of::<T>(),
            Inner::Tree(_) => false,
        }
    }

    /// Borrow the live value; `None` for values decoded from a tree.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match &self.inner {
            Inner::Native { value, .. } => value.downcast_ref::<T>(),
            Inner::Tree(_) => None,
        }
    }

    /// Take the value out as `T`.
    pub fn downcast<T: DeserializeOwned + 'static>(self) -> Result<T> {
        match self.inner {
            Inner::Native { value, .. } => value
                .downcast::<T>()
                .map(|boxed| *boxed)
                .map_err(|_| CodecError::TypeMismatch {
                    expected: std::any::type_name::<T>().into(),
                    found: self.type_name,
                }),
            Inner::Tree(tree) => Ok(serde_json::from_value(tree)?),
        }
    }

    fn to_tree(&self) -> Result<serde_json::Value> {
        match &self.inner {
            Inner::Native { value, to_json, .. } => to_json(&**value),
            Inner::Tree(tree) => Ok(tree.clone()),
        }
    }
}

impl Serialize for Dynamic {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let Some(registry) = registry::active() else {
            let tree = self.to_tree().map_err(ser::Error::custom)?;
            return TaggedRef { type_name: &self.type_name, value: &tree }.serialize(serializer);
        };

        let Inner::Native { value, type_id, .. } = &self.inner else {
            registry::note_missing(&self.type_name);
            return Err(ser::Error::custom(format_args!(
                "`{}` was decoded without its type and cannot be re-encoded",
                self.type_name
            )));
        };

        let Some((name, entry)) = registry.entry_for(*type_id) else {
            registry::note_missing(&self.type_name);
            return Err(ser::Error::custom(format_args!("type `{}` is not registered", self.type_name)));
        };

        let bytes = (entry.encode)(&**value).map_err(ser::Error::custom)?;
        (name, bytes).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Dynamic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let Some(registry) = registry::active() else {
            let tagged = Tagged::deserialize(deserializer)?;
            return Ok(Self { type_name: tagged.type_name, inner: Inner::Tree(tagged.value) });
        };

        let (name, bytes) = <(String, Vec<u8>)>::deserialize(deserializer)?;
        let Some(entry) = registry.entry_named(&name) else {
            registry::note_missing(&name);
            return Err(de::Error::custom(format_args!("type `{}` is not registered", name)));
        };

        let value = (entry.decode)(&bytes).map_err(de::Error::custom)?;
        Ok(Self {
            type_name: entry.type_name.to_owned(),
            inner: Inner::Native { value, type_id: entry.type_id, to_json: entry.to_json },
        })
    }
}

impl std::fmt::Debug for Dynamic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Inner::Native { .. } => write!(f, "Dynamic<{}>", self.type_name),
            Inner::Tree(tree) => write!(f, "Dynamic<{}>({})", self.type_name, tree),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde::Serialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn native_downcast() {
        let value = Dynamic::new(Point { x: 1, y: 2 });
        assert!(value.is::<Point>());
        assert_eq!(value.downcast_ref::<Point>(), Some(&Point { x: 1, y: 2 }));
        assert!(value.downcast::<String>().is_err());
    }

    #[test]
    fn tagged_json_round_trip() {
        let text = serde_json::to_string(&Dynamic::new(Point { x: 3, y: 4 })).unwrap();
        assert!(text.contains(r#""value":{"x":3,"y":4}"#));

        let back: Dynamic = serde_json::from_str(&text).unwrap();
        assert!(back.type_name().ends_with("Point"));
        assert_eq!(back.downcast::<Point>().unwrap(), Point { x: 3, y: 4 });
    }
}
