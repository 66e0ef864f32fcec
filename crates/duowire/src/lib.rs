//! # duowire
//!
//! The wire layer of a bidirectional RPC session: frames, deferred values,
//! structured errors, and the codecs that move them over one connection.
//!
//! ## Philosophy
//!
//! - **Decode late.** Parameters and results stay as raw bytes until the
//!   receiver knows what type it wants.
//! - **One connection, one format.** The format is fixed when the codec is
//!   built. There is no negotiation.
//! - **Fail at the boundary.** Unregistered types, oversized frames and bad
//!   input are reported as `CodecError`, never panics.

pub mod binary;
pub mod codec;
pub mod dynamic;
pub mod error;
pub mod format;
pub mod frame;
pub mod json;
mod kind;
pub mod registry;
pub mod value;
pub mod zero;

pub use binary::Binary;
pub use codec::Codec;
pub use dynamic::Dynamic;
pub use error::CodecError;
pub use error::ErrorCode;
pub use error::ErrorObject;
pub use format::Format;
pub use format::Framing;
pub use format::WireType;
pub use frame::Envelope;
pub use frame::Frame;
pub use frame::RequestFrame;
pub use frame::ResponseFrame;
pub use json::Json;
pub use registry::TypeRegistry;
pub use value::Deferred;
