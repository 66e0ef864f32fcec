//! # Call Errors
//!
//! What a caller sees when a remote call does not produce a value.

use duowire::CodecError;
use duowire::ErrorCode;
use duowire::ErrorObject;

#[derive(Debug)]
pub enum Error {
    /// No usable connection: the session was closed or never bound.
    Disconnected,
    /// The response did not arrive within the client's timeout.
    Timeout,
    /// A structured error, either returned by the peer or raised locally
    /// while decoding the result.
    Rpc(ErrorObject),
    /// The request could not be encoded or sent.
    Codec(CodecError),
}

impl Error {
    /// The wire code, for errors that have one.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Rpc(obj) => Some(obj.code),
            _ => None,
        }
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        matches!(self, Self::Rpc(obj) if obj.is(code))
    }

    pub fn error_object(&self) -> Option<&ErrorObject> {
        match self {
            Self::Rpc(obj) => Some(obj),
            _ => None,
        }
    }

    /// Map a failed send. A closed codec means the session is gone.
    pub(crate) fn from_send(e: CodecError) -> Self {
        match e {
            CodecError::Closed => Self::Disconnected,
            other => Self::Codec(other),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Timeout => write!(f, "Call timed out"),
            Self::Rpc(obj) => write!(f, "RPC error: {}", obj),
            Self::Codec(e) => write!(f, "Codec error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rpc(obj) => Some(obj),
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ErrorObject> for Error {
    fn from(obj: ErrorObject) -> Self {
        Self::Rpc(obj)
    }
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Self::Rpc(code.into())
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
