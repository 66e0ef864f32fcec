//! # Binary Format
//!
//! Compact bincode envelopes, each preceded by a big-endian `u32` length.
//! Parameters and results are themselves bincode byte strings, decoded only
//! when the destination type is known. Each starts with the value's kind so
//! a reader can refuse bytes written for a different shape.
//!
//! The format is schema-registered: every concrete type carried inside a
//! `Dynamic` must be in the format's `TypeRegistry` on both ends.

use std::sync::Arc;

use bincode::config;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;
use crate::error::Result;
use crate::format::Format;
use crate::format::Framing;
use crate::format::WireType;
use crate::frame::Envelope;
use crate::kind;
use crate::registry;
use crate::registry::TypeRegistry;

pub(crate) fn encode_raw<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(value, config::standard())
        .map_err(|e| CodecError::Encode(e.to_string()))
}

pub(crate) fn decode_raw<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (value, read) = bincode::serde::decode_from_slice(bytes, config::standard())
        .map_err(|e| CodecError::Decode(e.to_string()))?;

    // every value owns its whole buffer
    if read != bytes.len() {
        return Err(CodecError::TrailingBytes(bytes.len() - read));
    }

    Ok(value)
}

/// Split a value into its kind tag and its body.
fn split_kind(raw: &[u8]) -> Result<(String, &[u8])> {
    let (found, read): (String, usize) = bincode::serde::decode_from_slice(raw, config::standard())
        .map_err(|e| CodecError::Decode(format!("missing value kind: {}", e)))?;
    Ok((found, &raw[read..]))
}

/// The schema-registered profile.
#[derive(Debug, Default)]
pub struct Binary {
    registry: Arc<TypeRegistry>,
}

impl Binary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A format sharing an existing registry.
    pub fn with_registry(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Register `T` under an explicit wire name.
    pub fn register_type_as<T: WireType>(&self, name: &str) -> Result<()> {
        self.registry.register_as::<T>(name)
    }

    fn scoped<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        match registry::scoped(&self.registry, f) {
            (Err(_), Some(name)) => Err(CodecError::Unregistered(name)),
            (out, _) => out,
        }
    }
}

impl Format for Binary {
    const FRAMING: Framing = Framing::LengthPrefixed;

    fn name(&self) -> &'static str {
        "binary"
    }

    fn encode_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        self.scoped(|| {
            let body = encode_raw(value)?;
            let kind = kind::of_value(value)?;

            let mut raw = encode_raw(kind.to_string().as_str())?;
            raw.extend_from_slice(&body);
            Ok(raw)
        })
    }

    fn decode_value<T: DeserializeOwned>(&self, raw: &[u8]) -> Result<T> {
        self.scoped(|| {
            let (found, body) = split_kind(raw)?;
            if let Some(expected) = kind::expected::<T>() {
                let expected = expected.to_string();
                if expected != found {
                    return Err(CodecError::TypeMismatch { expected, found });
                }
            }
            decode_raw(body)
        })
    }

    fn register_type<T: WireType>(&self) -> Result<()> {
        self.registry.register::<T>()
    }

    fn requires_registration(&self) -> bool {
        true
    }

    fn encode_envelope(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        encode_raw(envelope)
    }

    fn decode_envelope(&self, bytes: &[u8]) -> Result<Envelope> {
        decode_raw(bytes)
    }
}
