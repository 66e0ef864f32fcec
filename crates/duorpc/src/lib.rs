//! # duorpc
//!
//! Bidirectional RPC over a single duplex connection. Each side of a
//! `Session` is both a client and a server: it can call methods on its peer
//! while answering the peer's calls, all multiplexed by request id.
//!
//! ```ignore
//! let session = Session::builder(Json).timeout(Duration::from_secs(1)).build(stream);
//! session.server().register_fn("add", |a: i64, b: i64| async move {
//!     Ok::<_, anyhow::Error>(a + b)
//! })?;
//! session.spawn();
//!
//! let sum: i64 = session.client().call("add", (10, 20)).await?;
//! ```
//!
//! ## Philosophy
//!
//! - **One reader.** The session's loop is the only thing that reads the
//!   connection. Callers wait on their own one-shot slot.
//! - **Failures stay local.** A bad call gets an error response; the session
//!   keeps going. Only a broken connection ends it.
//! - **Typed at the edges.** Values cross the wire untyped and become Rust
//!   types where a handler or a caller names them.

pub mod client;
pub mod duplex;
pub mod error;
pub mod handler;
pub mod methods;
pub mod server;
pub mod session;

pub use client::Client;
pub use client::RemoteMethod;
pub use error::Error;
pub use error::Result;
pub use handler::Arguments;
pub use handler::Handler;
pub use handler::Params;
pub use server::Registrar;
pub use server::Server;
pub use server::Service;
pub use session::Dispatch;
pub use session::Session;
pub use session::SessionBuilder;
pub use session::SessionConfig;

pub use duowire::Binary;
pub use duowire::Deferred;
pub use duowire::Dynamic;
pub use duowire::ErrorCode;
pub use duowire::ErrorObject;
pub use duowire::Format;
pub use duowire::Json;

#[cfg(test)]
mod tests;
