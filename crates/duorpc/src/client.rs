//! # Client
//!
//! The calling half of a session. Every call gets a fresh id and a one-shot
//! slot in the pending table; the session's read loop fills the slot when the
//! response arrives.
//!
//! ## Invariants
//!
//! - The pending entry exists before the request is written, so even an
//!   instant response finds it.
//! - The entry is removed on every exit path: resolution, timeout, send
//!   failure, or the caller dropping the call.
//! - Ids are never reused while still pending.

use std::marker::PhantomData;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use duowire::Codec;
use duowire::Deferred;
use duowire::ErrorCode;
use duowire::ErrorObject;
use duowire::Format;
use duowire::RequestFrame;
use duowire::ResponseFrame;
use duowire::WireType;

use crate::error::Error;
use crate::error::Result;
use crate::handler::Arguments;
use crate::handler::Params;
use crate::methods;
use crate::methods::MethodTable;
use crate::methods::Signature;
use crate::methods::TypeInfo;

/// Default time to wait for a response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

type Pending<F> = DashMap<i64, oneshot::Sender<ResponseFrame<F>>>;

struct ClientInner<F> {
    codec: Arc<Codec<F>>,
    pending: Pending<F>,
    next_id: AtomicI64,
    timeout_nanos: AtomicU64,
    shapes: MethodTable<Signature>,
}

/// Issues calls to the peer. Cheap to clone.
pub struct Client<F> {
    inner: Arc<ClientInner<F>>,
}

impl<F> Clone for Client<F> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

/// Removes a pending entry however the call ends.
struct PendingGuard<'a, F> {
    pending: &'a Pending<F>,
    id: i64,
}

impl<F> Drop for PendingGuard<'_, F> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

fn to_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

impl<F: Format> Client<F> {
    pub fn new(codec: Arc<Codec<F>>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                codec,
                pending: DashMap::new(),
                next_id: AtomicI64::new(1),
                timeout_nanos: AtomicU64::new(to_nanos(timeout)),
                shapes: MethodTable::new(),
            }),
        }
    }

    pub fn codec(&self) -> &Arc<Codec<F>> {
        &self.inner.codec
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_nanos(self.inner.timeout_nanos.load(Ordering::Relaxed))
    }

    /// Zero waits forever.
    pub fn set_timeout(&self, timeout: Duration) {
        self.inner.timeout_nanos.store(to_nanos(timeout), Ordering::Relaxed);
    }

    /// Calls still waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Call `method` with typed parameters and decode the result as `R`.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Params,
        R: DeserializeOwned,
    {
        let params = params.encode(self.inner.codec.format())?;
        self.call_remote(method, params).await
    }

    /// Call `method` with already-encoded parameters.
    ///
    /// A nil result decodes as the zero value of `R`. A result that does not
    /// decode as `R` is reported as a parse error.
    pub async fn call_remote<R>(&self, method: &str, params: Vec<Deferred<F>>) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let response = self.round_trip(method, params).await?;
        if let Some(error) = response.error {
            return Err(Error::Rpc(error));
        }

        let result = response
            .result
            .unwrap_or_else(|| Deferred::nil(self.inner.codec.format().clone()));

        result.decode::<R>().map_err(|e| {
            Error::Rpc(ErrorObject::with_message(ErrorCode::ParseError, e.to_string()))
        })
    }

    async fn round_trip(&self, method: &str, params: Vec<Deferred<F>>) -> Result<ResponseFrame<F>> {
        let inner = &*self.inner;
        if inner.codec.is_closed() {
            return Err(Error::Disconnected);
        }
        if method.is_empty() {
            return Err(Error::Rpc(ErrorObject::with_message(
                ErrorCode::InvalidRequest,
                "method name is empty",
            )));
        }

        // register before sending
        let (id, rx) = self.reserve();
        let _guard = PendingGuard { pending: &inner.pending, id };

        tracing::debug!(id, method, params = params.len(), "calling");
        let request = RequestFrame::new(id, method, params);
        inner.codec.write_request(&request).await.map_err(Error::from_send)?;

        let timeout = self.timeout();
        let response = if timeout.is_zero() {
            rx.await
        } else {
            match tokio::time::timeout(timeout, rx).await {
                Ok(response) => response,
                Err(_) => {
                    tracing::debug!(id, method, ?timeout, "call timed out");
                    return Err(Error::Timeout);
                }
            }
        };

        // the slot's sender was dropped without a response
        response.map_err(|_| Error::Disconnected)
    }

    fn reserve(&self) -> (i64, oneshot::Receiver<ResponseFrame<F>>) {
        loop {
            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            if let Entry::Vacant(slot) = self.inner.pending.entry(id) {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                return (id, rx);
            }
        }
    }

    /// Deliver a response to its waiting call.
    ///
    /// Returns `false` when no call is waiting: the caller timed out, gave
    /// up, or the id was never issued.
    pub fn resolve(&self, response: ResponseFrame<F>) -> bool {
        let id = response.id;
        let Some((_, tx)) = self.inner.pending.remove(&id) else {
            tracing::warn!(id, "dropping response for unknown call");
            return false;
        };

        tracing::debug!(id, error = response.error.is_some(), "resolved call");
        // the caller may have stopped waiting in between
        let _ = tx.send(response);
        true
    }

    /// Record the call shape of `name` and return a typed handle for it.
    pub fn declare<P, R>(&self, name: &str) -> methods::Result<RemoteMethod<F, P, R>>
    where
        P: Arguments,
        R: WireType,
    {
        let format = self.inner.codec.format();
        P::register_types(format.as_ref())?;
        format.register_type::<R>()?;

        self.inner.shapes.insert(name, Self::shape::<P, R>())?;
        Ok(RemoteMethod::new(self.clone(), name))
    }

    /// A previously declared method, checked against the requested shape.
    pub fn method<P, R>(&self, name: &str) -> methods::Result<RemoteMethod<F, P, R>>
    where
        P: Arguments,
        R: WireType,
    {
        let declared = self
            .inner
            .shapes
            .get(name)
            .ok_or_else(|| methods::Error::NotFound(name.to_owned()))?;

        let requested = Self::shape::<P, R>();
        if declared != requested {
            return Err(methods::Error::SignatureMismatch { name: name.to_owned(), declared, requested });
        }
        Ok(RemoteMethod::new(self.clone(), name))
    }

    /// Names of every declared call shape.
    pub fn declared(&self) -> Vec<String> {
        self.inner.shapes.names()
    }

    fn shape<P: Arguments, R: 'static>() -> Signature {
        Signature::new(P::types(), TypeInfo::result::<R>())
    }
}

/// A typed handle to one remote method.
pub struct RemoteMethod<F, P, R> {
    client: Client<F>,
    name: Arc<str>,
    _shape: PhantomData<fn(P) -> R>,
}

impl<F, P, R> Clone for RemoteMethod<F, P, R> {
    fn clone(&self) -> Self {
        Self { client: self.client.clone(), name: self.name.clone(), _shape: PhantomData }
    }
}

impl<F: Format, P: Arguments, R: WireType> RemoteMethod<F, P, R> {
    fn new(client: Client<F>, name: &str) -> Self {
        Self { client, name: Arc::from(name), _shape: PhantomData }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn call(&self, params: P) -> Result<R> {
        self.client.call(&self.name, params).await
    }
}

impl<F, P, R> std::fmt::Debug for RemoteMethod<F, P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteMethod").field("name", &self.name).finish()
    }
}
