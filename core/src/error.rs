//! Error types surfaced by the bridge.
//!
//! # Design
//! Callers see exactly four failure kinds: the request could not be encoded
//! (`LocalEncoding`), the backend could not be reached (`Transport`), the
//! backend answered with a non-2xx status (`Backend`), or a successful body
//! was not JSON (`Decode`). Every kind carries a [`Code`] from one fixed
//! vocabulary so callers can branch on failure class without knowing the
//! backend's HTTP conventions.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed status vocabulary shared by every failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Code {
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    OutOfRange,
    ResourceExhausted,
    Cancelled,
    DeadlineExceeded,
    Unimplemented,
    Internal,
    Unavailable,
    Unknown,
}

impl Code {
    /// Map a backend HTTP status onto the vocabulary. Total and
    /// deterministic: the same status always yields the same code.
    pub fn from_http_status(status: u16) -> Code {
        match status {
            400 | 422 => Code::InvalidArgument,
            401 => Code::Unauthenticated,
            403 => Code::PermissionDenied,
            404 => Code::NotFound,
            409 => Code::AlreadyExists,
            412 => Code::FailedPrecondition,
            416 => Code::OutOfRange,
            429 => Code::ResourceExhausted,
            499 => Code::Cancelled,
            501 => Code::Unimplemented,
            503 => Code::Unavailable,
            504 => Code::DeadlineExceeded,
            400..=499 => Code::FailedPrecondition,
            500..=599 => Code::Internal,
            _ => Code::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::Unauthenticated => "UNAUTHENTICATED",
            Code::PermissionDenied => "PERMISSION_DENIED",
            Code::NotFound => "NOT_FOUND",
            Code::AlreadyExists => "ALREADY_EXISTS",
            Code::FailedPrecondition => "FAILED_PRECONDITION",
            Code::OutOfRange => "OUT_OF_RANGE",
            Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Code::Cancelled => "CANCELLED",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::Unimplemented => "UNIMPLEMENTED",
            Code::Internal => "INTERNAL",
            Code::Unavailable => "UNAVAILABLE",
            Code::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by every bridge call.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The request could not be serialized or a path placeholder could not be
    /// resolved. Raised before any network activity.
    #[error("invalid request for {operation}: {message}")]
    LocalEncoding { operation: String, message: String },

    /// The backend could not be reached, timed out, or the caller cancelled
    /// the call. No backend status is available.
    #[error("transport failure ({code}): {message}")]
    Transport { code: Code, message: String },

    /// The backend answered with a non-2xx status.
    #[error("backend returned HTTP {http_status} ({code}): {message}")]
    Backend {
        code: Code,
        http_status: u16,
        message: String,
    },

    /// A successful response body was not valid JSON for the target type.
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl BridgeError {
    pub(crate) fn encoding(operation: &str, message: impl Into<String>) -> Self {
        BridgeError::LocalEncoding {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Code {
        match self {
            BridgeError::LocalEncoding { .. } => Code::InvalidArgument,
            BridgeError::Transport { code, .. } | BridgeError::Backend { code, .. } => *code,
            BridgeError::Decode(_) => Code::Internal,
        }
    }

    /// True when the failure was detected locally and nothing reached the
    /// network.
    pub fn is_local(&self) -> bool {
        matches!(self, BridgeError::LocalEncoding { .. })
    }

    /// HTTP status reported by the backend, if the failure came from one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            BridgeError::Backend { http_status, .. } => Some(*http_status),
            _ => None,
        }
    }
}
