//! Raw call outcomes and their translation into results.
//!
//! A [`RawOutcome`] is either a completed call with an optional body or a
//! failure with a code; never both. Translation decodes the body of a
//! completed call and turns a failure into the matching [`BridgeError`]
//! without looking at any body.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::codec;
use crate::error::{BridgeError, Code};
use crate::http::HttpResponse;
use crate::transport::TransportFailure;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Non-2xx answer from the backend.
    Backend { http_status: u16 },
    /// No answer at all.
    Transport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub code: Code,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOutcome {
    Completed { body: Option<String> },
    Failed(Failure),
}

impl RawOutcome {
    pub fn from_response(response: HttpResponse) -> Self {
        if response.is_success() {
            let body = (!response.body.is_empty()).then_some(response.body);
            return RawOutcome::Completed { body };
        }
        RawOutcome::Failed(Failure {
            kind: FailureKind::Backend {
                http_status: response.status,
            },
            code: Code::from_http_status(response.status),
            message: error_message(response.status, &response.body),
        })
    }

    pub fn from_transport(result: Result<HttpResponse, TransportFailure>) -> Self {
        match result {
            Ok(response) => Self::from_response(response),
            Err(failure) => RawOutcome::Failed(Failure {
                kind: FailureKind::Transport,
                code: failure.code,
                message: failure.message,
            }),
        }
    }

    /// Decode into the parsed document, or the error for a failed call.
    pub fn into_document(self) -> Result<Option<Value>, BridgeError> {
        match self {
            RawOutcome::Completed { body } => codec::parse_body(body.as_deref()),
            RawOutcome::Failed(failure) => Err(failure.into()),
        }
    }

    pub fn translate<T: DeserializeOwned + Default>(self) -> Result<T, BridgeError> {
        codec::from_document(self.into_document()?)
    }
}

impl From<Failure> for BridgeError {
    fn from(failure: Failure) -> Self {
        match failure.kind {
            FailureKind::Backend { http_status } => BridgeError::Backend {
                code: failure.code,
                http_status,
                message: failure.message,
            },
            FailureKind::Transport => BridgeError::Transport {
                code: failure.code,
                message: failure.message,
            },
        }
    }
}

/// Prefer a JSON error body's `message`, fall back to the raw text, then to
/// the status alone.
fn error_message(status: u16, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("HTTP {status}");
    }
    serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| trimmed.to_string())
}
