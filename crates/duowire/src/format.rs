//! # Formats
//!
//! A `Format` decides how values and envelopes become bytes. The codec
//! handles the stream; the format handles everything inside a frame.
//!
//! Two profiles ship with the crate:
//!
//! - [`Json`](crate::json::Json) is self-describing. Any value decodes
//!   without prior setup.
//! - [`Binary`](crate::binary::Binary) is schema-registered. Concrete types
//!   behind a [`Dynamic`](crate::dynamic::Dynamic) must be registered before
//!   they can be encoded or decoded.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::frame::Envelope;

/// How frames are delimited on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One frame per line.
    Lines,
    /// A big-endian `u32` length before every frame.
    LengthPrefixed,
}

/// A type that may travel inside a frame and be registered with a format.
pub trait WireType: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> WireType for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

pub trait Format: Send + Sync + 'static {
    const FRAMING: Framing;

    fn name(&self) -> &'static str;

    fn encode_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    fn decode_value<T: DeserializeOwned>(&self, raw: &[u8]) -> Result<T>;

    /// Make `T` known to the format. Idempotent.
    fn register_type<T: WireType>(&self) -> Result<()> {
        Ok(())
    }

    /// Whether polymorphic values need prior registration.
    fn requires_registration(&self) -> bool {
        false
    }

    fn encode_envelope(&self, envelope: &Envelope) -> Result<Vec<u8>>;

    fn decode_envelope(&self, bytes: &[u8]) -> Result<Envelope>;
}
