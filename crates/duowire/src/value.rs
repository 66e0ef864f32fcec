//! # Deferred Values
//!
//! Parameters and results arrive before anyone knows their type. A
//! `Deferred` keeps the raw wire bytes together with the format that wrote
//! them, and materializes into a concrete type only when asked.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;
use crate::error::Result;
use crate::format::Format;
use crate::zero;

/// A wire value whose type is not yet known.
///
/// `raw` is `None` for a wire nil. Materializing a nil yields the zero value
/// of the requested type.
pub struct Deferred<F> {
    raw: Option<Vec<u8>>,
    format: Arc<F>,
}

impl<F: Format> Deferred<F> {
    pub fn new(format: Arc<F>, raw: Option<Vec<u8>>) -> Self {
        Self { raw, format }
    }

    /// A wire nil.
    pub fn nil(format: Arc<F>) -> Self {
        Self { raw: None, format }
    }

    /// Encode `value` now; the result travels as-is.
    pub fn encode<T: Serialize + ?Sized>(format: &Arc<F>, value: &T) -> Result<Self> {
        let raw = format.encode_value(value)?;
        Ok(Self { raw: Some(raw), format: format.clone() })
    }

    pub fn is_nil(&self) -> bool {
        self.raw.is_none()
    }

    pub fn raw(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    pub fn into_raw(self) -> Option<Vec<u8>> {
        self.raw
    }

    pub fn format(&self) -> &Arc<F> {
        &self.format
    }

    /// Materialize into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.raw {
            Some(raw) => self.format.decode_value(raw),
            None => zero::zero::<T>().map_err(|e| CodecError::Decode(e.to_string())),
        }
    }
}

impl<F> Clone for Deferred<F> {
    fn clone(&self) -> Self {
        Self { raw: self.raw.clone(), format: self.format.clone() }
    }
}

impl<F> std::fmt::Debug for Deferred<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.raw {
            None => write!(f, "Deferred(nil)"),
            Some(raw) => match std::str::from_utf8(raw) {
                Ok(text) => write!(f, "Deferred({})", text),
                Err(_) => write!(f, "Deferred({} bytes)", raw.len()),
            },
        }
    }
}
