//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type but uses C-compatible representations:
//! `*mut c_char` instead of `String`, raw pointers instead of `Vec`, and
//! tagged enums with explicit discriminants. Response documents cross the
//! boundary as JSON text so one envelope serves every operation. Conversion
//! functions live here to keep `lib.rs` focused on the `extern "C"` surface.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use bridge_core::{BridgeClient, BridgeError, Code, HttpMethod, HttpRequest, OperationTable, SessionState};

/// Opaque handle to a `BridgeClient` and the route table it dispatches.
/// C callers receive a pointer to this and pass it back into every FFI
/// function.
pub struct FfiBridgeClient {
    pub(crate) inner: BridgeClient,
    pub(crate) table: OperationTable,
}

/// Owned C string. Interior NULs cannot be represented and yield an empty
/// string rather than a panic.
pub(crate) fn c_string(s: impl Into<Vec<u8>>) -> *mut c_char {
    CString::new(s).unwrap_or_default().into_raw()
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// HTTP method as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiHttpMethod {
    Get = 0,
    Post = 1,
    Put = 2,
    Patch = 3,
    Delete = 4,
}

impl From<HttpMethod> for FfiHttpMethod {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => FfiHttpMethod::Get,
            HttpMethod::Post => FfiHttpMethod::Post,
            HttpMethod::Put => FfiHttpMethod::Put,
            HttpMethod::Patch => FfiHttpMethod::Patch,
            HttpMethod::Delete => FfiHttpMethod::Delete,
        }
    }
}

/// A single HTTP header as a key-value pair of C strings.
#[repr(C)]
pub struct FfiHeader {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// An HTTP request described as C-compatible plain data.
///
/// Built by `bridge_build_request`. The C caller executes the request and
/// passes the response back through `bridge_parse_response`.
#[repr(C)]
pub struct FfiHttpRequest {
    pub method: FfiHttpMethod,
    /// Absolute URL, query string included.
    pub url: *mut c_char,
    pub headers: *mut FfiHeader,
    pub headers_len: u32,
    /// JSON body, or null for GET and DELETE.
    pub body: *mut c_char,
}

impl FfiHttpRequest {
    /// Convert a core `HttpRequest` into a heap-allocated `FfiHttpRequest`.
    pub(crate) fn from_core(req: HttpRequest) -> *mut Self {
        let body = match req.body {
            Some(b) => c_string(b),
            None => std::ptr::null_mut(),
        };

        let headers_len = req.headers.len() as u32;
        let headers = if req.headers.is_empty() {
            std::ptr::null_mut()
        } else {
            let ffi_headers: Box<[FfiHeader]> = req
                .headers
                .into_iter()
                .map(|(k, v)| FfiHeader {
                    key: c_string(k),
                    value: c_string(v),
                })
                .collect();
            Box::into_raw(ffi_headers) as *mut FfiHeader
        };

        Box::into_raw(Box::new(FfiHttpRequest {
            method: req.method.into(),
            url: c_string(req.url),
            headers,
            headers_len,
            body,
        }))
    }

    /// Bearer token in this request's `authorization` header.
    ///
    /// # Safety
    /// `headers` must point to `headers_len` valid entries whose strings
    /// are null or NUL-terminated, as built by `from_core`.
    pub(crate) unsafe fn bearer_token(&self) -> Option<String> {
        if self.headers.is_null() {
            return None;
        }
        let headers = unsafe { std::slice::from_raw_parts(self.headers, self.headers_len as usize) };
        headers.iter().find_map(|h| {
            if h.key.is_null() || h.value.is_null() {
                return None;
            }
            let key = unsafe { CStr::from_ptr(h.key) }.to_str().ok()?;
            if !key.eq_ignore_ascii_case("authorization") {
                return None;
            }
            let value = unsafe { CStr::from_ptr(h.value) }.to_str().ok()?;
            value.strip_prefix("Bearer ").map(str::to_string)
        })
    }
}

// ---------------------------------------------------------------------------
// Response input (caller-provided, not heap-allocated by us)
// ---------------------------------------------------------------------------

/// An HTTP response described as C-compatible plain data.
///
/// The C caller constructs this after executing a request, then passes a
/// pointer to `bridge_parse_response`. The FFI layer reads but does not
/// free these fields. `status` 0 reports that the round-trip itself failed;
/// `body` then carries the reason.
#[repr(C)]
pub struct FfiHttpResponse {
    pub status: u16,
    pub body: *const c_char,
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Failure category returned in `FfiBridgeResult`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    LocalEncoding = 1,
    Transport = 2,
    Backend = 3,
    Decode = 4,
    UnknownOperation = 5,
    NullArg = 6,
    InvalidUtf8 = 7,
    Panic = 8,
}

/// The status vocabulary, with `Ok` for success.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiStatusCode {
    Ok = 0,
    InvalidArgument = 1,
    Unauthenticated = 2,
    PermissionDenied = 3,
    NotFound = 4,
    AlreadyExists = 5,
    FailedPrecondition = 6,
    OutOfRange = 7,
    ResourceExhausted = 8,
    Cancelled = 9,
    DeadlineExceeded = 10,
    Unimplemented = 11,
    Internal = 12,
    Unavailable = 13,
    Unknown = 14,
}

impl From<Code> for FfiStatusCode {
    fn from(code: Code) -> Self {
        match code {
            Code::InvalidArgument => FfiStatusCode::InvalidArgument,
            Code::Unauthenticated => FfiStatusCode::Unauthenticated,
            Code::PermissionDenied => FfiStatusCode::PermissionDenied,
            Code::NotFound => FfiStatusCode::NotFound,
            Code::AlreadyExists => FfiStatusCode::AlreadyExists,
            Code::FailedPrecondition => FfiStatusCode::FailedPrecondition,
            Code::OutOfRange => FfiStatusCode::OutOfRange,
            Code::ResourceExhausted => FfiStatusCode::ResourceExhausted,
            Code::Cancelled => FfiStatusCode::Cancelled,
            Code::DeadlineExceeded => FfiStatusCode::DeadlineExceeded,
            Code::Unimplemented => FfiStatusCode::Unimplemented,
            Code::Internal => FfiStatusCode::Internal,
            Code::Unavailable => FfiStatusCode::Unavailable,
            Code::Unknown => FfiStatusCode::Unknown,
        }
    }
}

/// Session state as seen through a client handle.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiSessionState {
    Unauthenticated = 0,
    Authenticated = 1,
    /// The client handle was null.
    Invalid = 2,
}

impl From<SessionState> for FfiSessionState {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Unauthenticated => FfiSessionState::Unauthenticated,
            SessionState::Authenticated => FfiSessionState::Authenticated,
        }
    }
}

/// Result envelope for parse operations and build failures.
///
/// On success `error_code` is `Ok`, `error_message` is null, and `data` is
/// the decoded document as JSON text (null when the backend sent none).
/// On failure `error_code` gives the category, `status_code` the mapped
/// status, `error_message` a human-readable C string, and `data` is null.
#[repr(C)]
pub struct FfiBridgeResult {
    pub error_code: FfiErrorCode,
    pub status_code: FfiStatusCode,
    pub error_message: *mut c_char,
    pub http_status: u16,
    pub data: *mut c_char,
}

impl FfiBridgeResult {
    fn boxed(
        error_code: FfiErrorCode,
        status_code: FfiStatusCode,
        error_message: *mut c_char,
        http_status: u16,
        data: *mut c_char,
    ) -> *mut Self {
        Box::into_raw(Box::new(FfiBridgeResult {
            error_code,
            status_code,
            error_message,
            http_status,
            data,
        }))
    }

    /// Build a success result carrying `document` as JSON text.
    pub(crate) fn ok(document: serde_json::Value) -> *mut Self {
        let data = if document.is_null() {
            std::ptr::null_mut()
        } else {
            c_string(document.to_string())
        };
        Self::boxed(FfiErrorCode::Ok, FfiStatusCode::Ok, std::ptr::null_mut(), 0, data)
    }

    /// Build an error result from a `BridgeError`.
    pub(crate) fn from_error(err: BridgeError) -> *mut Self {
        let error_code = match &err {
            BridgeError::LocalEncoding { .. } => FfiErrorCode::LocalEncoding,
            BridgeError::Transport { .. } => FfiErrorCode::Transport,
            BridgeError::Backend { .. } => FfiErrorCode::Backend,
            BridgeError::Decode(_) => FfiErrorCode::Decode,
        };
        Self::boxed(
            error_code,
            err.code().into(),
            c_string(err.to_string()),
            err.http_status().unwrap_or(0),
            std::ptr::null_mut(),
        )
    }

    /// Build an error result for a call the bridge could not start.
    pub(crate) fn rejected(error_code: FfiErrorCode, message: &str) -> *mut Self {
        Self::boxed(
            error_code,
            FfiStatusCode::InvalidArgument,
            c_string(message),
            0,
            std::ptr::null_mut(),
        )
    }

    /// Build an error result for a null argument.
    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Self::rejected(FfiErrorCode::NullArg, &format!("null argument: {name}"))
    }

    /// Build an error result for a caught panic.
    pub(crate) fn panic(msg: &str) -> *mut Self {
        Self::boxed(
            FfiErrorCode::Panic,
            FfiStatusCode::Internal,
            c_string(msg),
            0,
            std::ptr::null_mut(),
        )
    }
}
