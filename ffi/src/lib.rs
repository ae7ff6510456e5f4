//! C-ABI wrapper around `bridge-core`.
//!
//! # Overview
//! Exposes the generic dispatch bridge through `extern "C"` functions so any
//! language with a C FFI can build and translate calls for every route in
//! the bundled table without linking to Rust's HTTP stack or serde directly.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Operations are addressed by route id; requests go in and documents
//!   come out as JSON text, so two functions cover the whole table.
//! - Session effects (login and sudo store, logout and 401 revoke) apply
//!   inside `bridge_parse_response`, exactly as for Rust callers.
//! - The C caller owns all returned pointers and must call the matching
//!   `bridge_free_*` function to release them.

pub mod types;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use bridge_core::outcome::RawOutcome;
use bridge_core::transport::TransportFailure;
use bridge_core::{BridgeClient, BridgeSettings, HttpResponse, OperationDescriptor, OperationTable};
use serde_json::Value;

use types::*;

/// Borrow a C string as `&str`. `Err` carries the failure envelope.
fn read_str<'a>(ptr: *const c_char, name: &str) -> Result<&'a str, *mut FfiBridgeResult> {
    if ptr.is_null() {
        return Err(FfiBridgeResult::null_arg(name));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| FfiBridgeResult::rejected(FfiErrorCode::InvalidUtf8, &format!("{name} is not valid UTF-8")))
}

fn lookup<'a>(client: &'a FfiBridgeClient, operation: &str) -> Result<&'a OperationDescriptor, *mut FfiBridgeResult> {
    client.table.get(operation).ok_or_else(|| {
        FfiBridgeResult::rejected(
            FfiErrorCode::UnknownOperation,
            &format!("unknown operation: {operation}"),
        )
    })
}

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a new client bound to `base_url`.
///
/// `api_version` may be null for the default. Returns null if `base_url`
/// is null or not UTF-8, or if an internal panic occurs.
/// The caller must free the returned pointer with `bridge_client_free`.
#[unsafe(no_mangle)]
pub extern "C" fn bridge_client_new(
    base_url: *const c_char,
    api_version: *const c_char,
) -> *mut FfiBridgeClient {
    catch_unwind(|| {
        let url = match read_str(base_url, "base_url") {
            Ok(url) => url,
            Err(err) => {
                bridge_free_result(err);
                return std::ptr::null_mut();
            }
        };
        let mut settings = BridgeSettings::new(url);
        if !api_version.is_null() {
            match unsafe { CStr::from_ptr(api_version) }.to_str() {
                Ok(v) => settings.api_version = v.to_string(),
                Err(_) => return std::ptr::null_mut(),
            }
        }
        let Ok(table) = OperationTable::builtin() else {
            return std::ptr::null_mut();
        };
        let client = FfiBridgeClient {
            inner: BridgeClient::from_settings(settings),
            table,
        };
        Box::into_raw(Box::new(client))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client created by `bridge_client_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn bridge_client_free(client: *mut FfiBridgeClient) {
    if !client.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(client) });
        }));
    }
}

/// Current session state of `client`; `Invalid` for a null handle.
#[unsafe(no_mangle)]
pub extern "C" fn bridge_session_state(client: *const FfiBridgeClient) -> FfiSessionState {
    if client.is_null() {
        return FfiSessionState::Invalid;
    }
    catch_unwind(AssertUnwindSafe(|| unsafe { &*client }.inner.session().state().into()))
        .unwrap_or(FfiSessionState::Invalid)
}

// ---------------------------------------------------------------------------
// Build and parse
// ---------------------------------------------------------------------------

/// Build the HTTP request for `operation` from a JSON request object.
///
/// `request_json` may be null, which sends an empty object. Returns null on
/// failure; when `out_error` is non-null it then receives a result
/// describing why, to be freed with `bridge_free_result`.
/// The caller must free the returned pointer with `bridge_free_request`.
#[unsafe(no_mangle)]
pub extern "C" fn bridge_build_request(
    client: *const FfiBridgeClient,
    operation: *const c_char,
    request_json: *const c_char,
    out_error: *mut *mut FfiBridgeResult,
) -> *mut FfiHttpRequest {
    let built = catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return Err(FfiBridgeResult::null_arg("client"));
        }
        let client = unsafe { &*client };
        let operation = read_str(operation, "operation")?;
        let descriptor = lookup(client, operation)?;
        let request: Value = if request_json.is_null() {
            Value::Object(Default::default())
        } else {
            let raw = read_str(request_json, "request_json")?;
            serde_json::from_str(raw).map_err(|e| {
                FfiBridgeResult::rejected(
                    FfiErrorCode::LocalEncoding,
                    &format!("request_json is not valid JSON: {e}"),
                )
            })?
        };
        client
            .inner
            .build_request(descriptor, &request)
            .map(FfiHttpRequest::from_core)
            .map_err(FfiBridgeResult::from_error)
    }))
    .unwrap_or_else(|_| Err(FfiBridgeResult::panic("panic in bridge_build_request")));

    match built {
        Ok(req) => req,
        Err(err) => {
            if out_error.is_null() {
                bridge_free_result(err);
            } else {
                unsafe { *out_error = err };
            }
            std::ptr::null_mut()
        }
    }
}

/// Convert an `FfiHttpResponse` to the outcome the core translates.
fn ffi_response_to_outcome(resp: &FfiHttpResponse) -> RawOutcome {
    let body = if resp.body.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(resp.body) }
            .to_string_lossy()
            .into_owned()
    };
    if resp.status == 0 {
        let reason = if body.is_empty() { "host transport failed".to_string() } else { body };
        return RawOutcome::from_transport(Err(TransportFailure::unavailable(reason)));
    }
    RawOutcome::from_response(HttpResponse {
        status: resp.status,
        headers: Vec::new(),
        body,
    })
}

/// Translate the response to `request`, built for `operation`.
///
/// On success `data` holds the decoded document as JSON text. Session
/// effects of `operation` are applied before returning; a logout or a
/// rejected credential revokes only the token `request` carried. `request`
/// may be null, in which case the client's current credential is assumed.
#[unsafe(no_mangle)]
pub extern "C" fn bridge_parse_response(
    client: *const FfiBridgeClient,
    operation: *const c_char,
    request: *const FfiHttpRequest,
    response: *const FfiHttpResponse,
) -> *mut FfiBridgeResult {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return FfiBridgeResult::null_arg("client");
        }
        if response.is_null() {
            return FfiBridgeResult::null_arg("response");
        }
        let client = unsafe { &*client };
        let descriptor = match read_str(operation, "operation").and_then(|op| lookup(client, op)) {
            Ok(d) => d,
            Err(err) => return err,
        };
        let sent_token = if request.is_null() {
            client.inner.session().credential().map(|c| c.token().to_string())
        } else {
            unsafe { (*request).bearer_token() }
        };
        let outcome = ffi_response_to_outcome(unsafe { &*response });
        match client.inner.complete_as::<Value>(descriptor, sent_token.as_deref(), outcome) {
            Ok(doc) => FfiBridgeResult::ok(doc),
            Err(e) => FfiBridgeResult::from_error(e),
        }
    }))
    .unwrap_or_else(|_| FfiBridgeResult::panic("panic in bridge_parse_response"))
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free an `FfiHttpRequest` returned by `bridge_build_request`.
/// Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn bridge_free_request(req: *mut FfiHttpRequest) {
    if req.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let req = unsafe { Box::from_raw(req) };
        if !req.url.is_null() {
            drop(unsafe { CString::from_raw(req.url) });
        }
        if !req.body.is_null() {
            drop(unsafe { CString::from_raw(req.body) });
        }
        if !req.headers.is_null() && req.headers_len > 0 {
            let headers = unsafe {
                Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                    req.headers,
                    req.headers_len as usize,
                ))
            };
            for h in headers.iter() {
                if !h.key.is_null() {
                    drop(unsafe { CString::from_raw(h.key) });
                }
                if !h.value.is_null() {
                    drop(unsafe { CString::from_raw(h.value) });
                }
            }
        }
    });
}

/// Free an `FfiBridgeResult`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn bridge_free_result(result: *mut FfiBridgeResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let result = unsafe { Box::from_raw(result) };
        if !result.error_message.is_null() {
            drop(unsafe { CString::from_raw(result.error_message) });
        }
        if !result.data.is_null() {
            drop(unsafe { CString::from_raw(result.data) });
        }
    });
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn bridge_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { CString::from_raw(s) });
        });
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
