//! # Method Table
//!
//! A concurrent name → binding map. The server keeps its handlers here and
//! the client keeps its declared call shapes here; both only ever look an
//! entry up, clone it, and let go of the map before doing any I/O.
//!
//! ## Invariants
//!
//! - Names are non-empty.
//! - A name is bound at most once; rebinding requires `remove` first.

use std::any::TypeId;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use duowire::CodecError;

#[derive(Debug)]
pub enum Error {
    EmptyName,
    Duplicate(String),
    NotFound(String),
    /// A service offered nothing to register.
    NoMethods,
    /// A declared call shape does not match the requested one.
    SignatureMismatch { name: String, declared: Signature, requested: Signature },
    /// The codec refused one of the binding's types.
    Codec(CodecError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "Method name is empty"),
            Self::Duplicate(name) => write!(f, "Method `{}` is already registered", name),
            Self::NotFound(name) => write!(f, "Method `{}` is not registered", name),
            Self::NoMethods => write!(f, "Service has no methods to register"),
            Self::SignatureMismatch { name, declared, requested } => write!(
                f,
                "Method `{}` was declared as {} but requested as {}",
                name, declared, requested
            ),
            Self::Codec(e) => write!(f, "Cannot register types: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A Rust type as recorded in a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeInfo {
    pub id: TypeId,
    pub name: &'static str,
}

impl TypeInfo {
    pub fn of<T: 'static>() -> Self {
        Self { id: TypeId::of::<T>(), name: std::any::type_name::<T>() }
    }

    /// `None` for `()`, which means "no result".
    pub fn result<T: 'static>() -> Option<Self> {
        if TypeId::of::<T>() == TypeId::of::<()>() {
            None
        } else {
            Some(Self::of::<T>())
        }
    }
}

/// Parameter types and result type of one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<TypeInfo>,
    pub result: Option<TypeInfo>,
}

impl Signature {
    pub fn new(params: Vec<TypeInfo>, result: Option<TypeInfo>) -> Self {
        Self { params, result }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params: Vec<&str> = self.params.iter().map(|p| p.name).collect();
        write!(f, "fn({})", params.join(", "))?;
        if let Some(result) = &self.result {
            write!(f, " -> {}", result.name)?;
        }
        Ok(())
    }
}

/// Concurrent name → binding map.
pub struct MethodTable<V> {
    entries: DashMap<String, V>,
}

impl<V: Clone> MethodTable<V> {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    pub fn insert(&self, name: &str, value: V) -> Result<()> {
        if name.is_empty() {
            return Err(Error::EmptyName);
        }

        match self.entries.entry(name.to_owned()) {
            Entry::Occupied(_) => Err(Error::Duplicate(name.to_owned())),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(())
            }
        }
    }

    pub fn remove(&self, name: &str) -> Result<V> {
        self.entries
            .remove(name)
            .map(|(_, value)| value)
            .ok_or_else(|| Error::NotFound(name.to_owned()))
    }

    /// A clone of the binding; the map is released before this returns.
    pub fn get(&self, name: &str) -> Option<V> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for MethodTable<V> {
    fn default() -> Self {
        Self::new()
    }
}
