//! # Type Registry
//!
//! The schema-registered format only knows concrete types it has been told
//! about. The registry maps a stable name to the functions that encode and
//! decode one concrete type, and back from the type to its name.
//!
//! ## Invariants
//!
//! - A name maps to exactly one type, and a type to exactly one name.
//! - Re-registering the same type under the same name is a no-op.
//! - Registration conflicts fail at registration time, never later.
//!
//! While the binary format encodes or decodes, the registry is installed as
//! the thread's active scope so `Dynamic` values can find it from inside
//! serde.

use std::any::Any;
use std::any::TypeId;
use std::cell::RefCell;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::binary;
use crate::dynamic::Dynamic;
use crate::error::CodecError;
use crate::error::Result;
use crate::format::WireType;

pub(crate) type AnyValue = Box<dyn Any + Send + Sync>;

/// Encoding and decoding functions for one concrete type.
#[derive(Clone, Copy)]
pub(crate) struct TypeEntry {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) encode: fn(&(dyn Any + Send + Sync)) -> Result<Vec<u8>>,
    pub(crate) decode: fn(&[u8]) -> Result<AnyValue>,
    pub(crate) to_json: fn(&(dyn Any + Send + Sync)) -> Result<serde_json::Value>,
}

impl TypeEntry {
    pub(crate) fn of<T: WireType>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            encode: encode_as::<T>,
            decode: decode_as::<T>,
            to_json: to_json_as::<T>,
        }
    }
}

fn downcast<T: 'static>(value: &(dyn Any + Send + Sync)) -> Result<&T> {
    value.downcast_ref::<T>().ok_or_else(|| CodecError::TypeMismatch {
        expected: std::any::type_name::<T>().into(),
        found: "another type".into(),
    })
}

fn encode_as<T: WireType>(value: &(dyn Any + Send + Sync)) -> Result<Vec<u8>> {
    binary::encode_raw(downcast::<T>(value)?)
}

fn decode_as<T: WireType>(bytes: &[u8]) -> Result<AnyValue> {
    Ok(Box::new(binary::decode_raw::<T>(bytes)?))
}

fn to_json_as<T: WireType>(value: &(dyn Any + Send + Sync)) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(downcast::<T>(value)?)?)
}

/// Name ↔ type table for polymorphic values.
#[derive(Default)]
pub struct TypeRegistry {
    by_name: DashMap<String, TypeEntry>,
    by_type: DashMap<TypeId, String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under its Rust type name unless it is already known.
    pub fn register<T: WireType>(&self) -> Result<()> {
        if TypeId::of::<T>() == TypeId::of::<Dynamic>() || self.contains::<T>() {
            return Ok(());
        }
        self.register_as::<T>(std::any::type_name::<T>())
    }

    /// Register `T` under an explicit name.
    pub fn register_as<T: WireType>(&self, name: &str) -> Result<()> {
        let entry = TypeEntry::of::<T>();

        // the type side first: one name per type
        match self.by_type.entry(entry.type_id) {
            Entry::Occupied(existing) if existing.get() == name => return Ok(()),
            Entry::Occupied(existing) => {
                return Err(CodecError::RegistrationConflict {
                    name: name.into(),
                    existing: existing.get().clone(),
                });
            }
            Entry::Vacant(slot) => match self.by_name.entry(name.to_owned()) {
                Entry::Occupied(taken) => {
                    return Err(CodecError::RegistrationConflict {
                        name: name.into(),
                        existing: taken.get().type_name.into(),
                    });
                }
                Entry::Vacant(named) => {
                    named.insert(entry);
                    slot.insert(name.to_owned());
                }
            },
        }

        tracing::trace!(name, type_name = entry.type_name, "registered type");
        Ok(())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    /// The name a type was registered under.
    pub fn name_of(&self, type_id: TypeId) -> Option<String> {
        self.by_type.get(&type_id).map(|name| name.clone())
    }

    pub(crate) fn entry_for(&self, type_id: TypeId) -> Option<(String, TypeEntry)> {
        let name = self.name_of(type_id)?;
        let entry = *self.by_name.get(&name)?;
        Some((name, entry))
    }

    pub(crate) fn entry_named(&self, name: &str) -> Option<TypeEntry> {
        self.by_name.get(name).map(|entry| *entry)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.by_name.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}

struct Scope {
    registry: Arc<TypeRegistry>,
    missing: Option<String>,
}

thread_local! {
    static ACTIVE: RefCell<Option<Scope>> = const { RefCell::new(None) };
}

/// Restores the previous scope when dropped, even on unwind.
struct ScopeGuard {
    previous: Option<Scope>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE.with(|active| *active.borrow_mut() = previous);
    }
}

/// Run `f` with `registry` as the active scope.
///
/// Returns `f`'s output and the name of the first unregistered type seen.
pub(crate) fn scoped<R>(registry: &Arc<TypeRegistry>, f: impl FnOnce() -> R) -> (R, Option<String>) {
    let scope = Scope { registry: registry.clone(), missing: None };
    let previous = ACTIVE.with(|active| active.borrow_mut().replace(scope));
    let _guard = ScopeGuard { previous };

    let out = f();
    let missing = ACTIVE.with(|active| {
        active.borrow_mut().as_mut().and_then(|scope| scope.missing.take())
    });

    (out, missing)
}

/// The registry of the innermost active scope.
pub(crate) fn active() -> Option<Arc<TypeRegistry>> {
    ACTIVE.with(|active| active.borrow().as_ref().map(|scope| scope.registry.clone()))
}

/// Note a lookup miss so the format can report it precisely.
pub(crate) fn note_missing(name: &str) {
    ACTIVE.with(|active| {
        if let Some(scope) = active.borrow_mut().as_mut() {
            scope.missing.get_or_insert_with(|| name.to_owned());
        }
    });
}
