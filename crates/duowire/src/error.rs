//! # Error Definitions
//!
//! Two families live here:
//!
//! - `ErrorObject` is the structured error carried inside a response frame.
//!   It is the only error that ever crosses the wire.
//! - `CodecError` is a local failure of the codec itself: I/O, malformed
//!   frames, missing type registrations.

use serde::Deserialize;
use serde::Serialize;

/// Reserved wire error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The frame or a value inside it could not be decoded.
    ParseError,
    /// The frame is structurally invalid.
    InvalidRequest,
    /// No binding exists for the requested method.
    MethodNotFound,
    /// Parameter count or types did not match the binding.
    InvalidParams,
    /// The runtime itself failed while serving the call.
    InternalError,
    /// The handler returned an error or panicked.
    FunctionError,
}

impl ErrorCode {
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::FunctionError => -32604,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            -32700 => Some(Self::ParseError),
            -32600 => Some(Self::InvalidRequest),
            -32601 => Some(Self::MethodNotFound),
            -32602 => Some(Self::InvalidParams),
            -32603 => Some(Self::InternalError),
            -32604 => Some(Self::FunctionError),
            _ => None,
        }
    }

    /// The canonical message sent with this code.
    pub const fn message(self) -> &'static str {
        match self {
            Self::ParseError => "parse error",
            Self::InvalidRequest => "invalid request",
            Self::MethodNotFound => "method not found",
            Self::InvalidParams => "invalid params",
            Self::InternalError => "internal error",
            Self::FunctionError => "function error",
        }
    }
}

/// Structured error transmitted in a response frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
}

impl ErrorObject {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// An error with a reserved code and a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code.code(), message)
    }

    /// The reserved code this error carries, if any.
    pub fn kind(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code.code()
    }
}

impl From<ErrorCode> for ErrorObject {
    fn from(code: ErrorCode) -> Self {
        Self::new(code.code(), code.message())
    }
}

impl std::fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for ErrorObject {}

/// Local failures of the codec.
#[derive(Debug)]
pub enum CodecError {
    /// The underlying connection failed.
    Io(std::io::Error),
    /// The self-describing format rejected a value or frame.
    Json(serde_json::Error),
    /// The schema-registered format could not encode a value.
    Encode(String),
    /// The schema-registered format could not decode a value.
    Decode(String),
    /// A decoded value did not consume its whole buffer.
    TrailingBytes(usize),
    /// A polymorphic value names a type that is not registered.
    Unregistered(String),
    /// A registration collides with an existing one.
    RegistrationConflict { name: String, existing: String },
    /// A polymorphic value holds a different type than requested.
    TypeMismatch { expected: String, found: String },
    /// A frame exceeds the configured limit.
    FrameTooLarge { len: usize, max: usize },
    /// The frame is structurally invalid.
    Malformed(String),
    /// The codec was closed or the peer hung up.
    Closed,
}

impl CodecError {
    /// The wire error describing this failure when it stems from bad input.
    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject::with_message(ErrorCode::ParseError, self.to_string())
    }
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Json(e) => write!(f, "JSON error: {}", e),
            Self::Encode(msg) => write!(f, "Encode error: {}", msg),
            Self::Decode(msg) => write!(f, "Decode error: {}", msg),
            Self::TrailingBytes(n) => write!(f, "{} trailing bytes after value", n),
            Self::Unregistered(name) => write!(f, "Type `{}` is not registered", name),
            Self::RegistrationConflict { name, existing } => {
                write!(f, "Cannot register `{}`: name is taken by `{}`", name, existing)
            }
            Self::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected `{}`, found `{}`", expected, found)
            }
            Self::FrameTooLarge { len, max } => {
                write!(f, "Frame of {} bytes exceeds limit of {}", len, max)
            }
            Self::Malformed(msg) => write!(f, "Malformed frame: {}", msg),
            Self::Closed => write!(f, "Codec closed"),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// A specialized Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
