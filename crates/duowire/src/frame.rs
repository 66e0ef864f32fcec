//! # Frames
//!
//! Two frame kinds travel over a session: requests and responses. Both are
//! carried by the same `Envelope` on the wire. A non-empty `method` marks a
//! request; everything else is a response.
//!
//! ## Invariants
//!
//! - A request's `method` is never empty.
//! - A response carries the `id` of the request it answers.
//! - When a response carries an error, its result is ignored.

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::error::CodecError;
use crate::error::ErrorObject;
use crate::error::Result;
use crate::format::Format;
use crate::value::Deferred;

/// The raw record every format writes and reads.
///
/// Values are opaque byte strings in the format's own encoding; `None` is a
/// wire nil.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: i64,
    pub method: String,
    pub params: Vec<Option<Vec<u8>>>,
    pub result: Option<Vec<u8>>,
    pub error: Option<ErrorObject>,
    /// Set by a format that read the request but could not split its
    /// parameters.
    #[serde(skip)]
    pub params_error: Option<String>,
}

/// A call issued by one peer to the other.
pub struct RequestFrame<F> {
    pub id: i64,
    pub method: String,
    pub params: Vec<Deferred<F>>,
    /// Why the parameters could not be read, if they could not. Such a
    /// request is still answered under its id.
    pub params_error: Option<String>,
}

/// The answer to a `RequestFrame`.
pub struct ResponseFrame<F> {
    pub id: i64,
    pub result: Option<Deferred<F>>,
    pub error: Option<ErrorObject>,
}

/// One decoded frame.
pub enum Frame<F> {
    Request(RequestFrame<F>),
    Response(ResponseFrame<F>),
}

impl<F: Format> RequestFrame<F> {
    pub fn new(id: i64, method: impl Into<String>, params: Vec<Deferred<F>>) -> Self {
        Self { id, method: method.into(), params, params_error: None }
    }
}

impl<F: Format> ResponseFrame<F> {
    pub fn success(id: i64, result: Deferred<F>) -> Self {
        Self { id, result: Some(result), error: None }
    }

    pub fn failure(id: i64, error: ErrorObject) -> Self {
        Self { id, result: None, error: Some(error) }
    }
}

impl<F> std::fmt::Debug for RequestFrame<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestFrame")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("params", &self.params.len())
            .field("params_error", &self.params_error)
            .finish()
    }
}

impl<F> std::fmt::Debug for ResponseFrame<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFrame")
            .field("id", &self.id)
            .field("result", &self.result.is_some())
            .field("error", &self.error)
            .finish()
    }
}

impl<F> std::fmt::Debug for Frame<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(req) => req.fmt(f),
            Self::Response(resp) => resp.fmt(f),
        }
    }
}

impl Envelope {
    pub fn is_request(&self) -> bool {
        !self.method.is_empty()
    }

    pub(crate) fn from_request<F: Format>(frame: &RequestFrame<F>) -> Result<Self> {
        if frame.method.is_empty() {
            return Err(CodecError::Malformed("request without a method".into()));
        }

        Ok(Self {
            id: frame.id,
            method: frame.method.clone(),
            params: frame.params.iter().map(|p| p.raw().map(<[u8]>::to_vec)).collect(),
            result: None,
            error: None,
            params_error: None,
        })
    }

    pub(crate) fn from_response<F: Format>(frame: &ResponseFrame<F>) -> Self {
        // an error supersedes any result
        let result = match frame.error {
            Some(_) => None,
            None => frame.result.as_ref().and_then(|r| r.raw().map(<[u8]>::to_vec)),
        };

        Self {
            id: frame.id,
            method: String::new(),
            params: Vec::new(),
            result,
            error: frame.error.clone(),
            params_error: None,
        }
    }

    /// Attach the format so payloads can be materialized later.
    pub(crate) fn into_frame<F: Format>(self, format: &Arc<F>) -> Frame<F> {
        if self.is_request() {
            let params = self
                .params
                .into_iter()
                .map(|raw| Deferred::new(format.clone(), raw))
                .collect();

            return Frame::Request(RequestFrame {
                id: self.id,
                method: self.method,
                params,
                params_error: self.params_error,
            });
        }

        let result = match self.error {
            Some(_) => None,
            None => Some(Deferred::new(format.clone(), self.result)),
        };

        Frame::Response(ResponseFrame { id: self.id, result, error: self.error })
    }
}
