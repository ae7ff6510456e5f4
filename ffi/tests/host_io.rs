//! Drive the C surface the way a host would: build through the FFI,
//! execute with the host's own HTTP client, hand the response back.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use bridge_ffi::types::{
    FfiBridgeClient, FfiErrorCode, FfiHttpMethod, FfiHttpRequest, FfiHttpResponse, FfiSessionState, FfiStatusCode,
};
use bridge_ffi::*;
use serde_json::Value;

fn spawn_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener, mock_server::DEFAULT_API_VERSION).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

fn text(ptr: *const c_char) -> String {
    unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string()
}

/// Execute an `FfiHttpRequest` with ureq, returning status and body.
fn execute(req: &FfiHttpRequest) -> (u16, String) {
    let agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build()
        .new_agent();

    let url = text(req.url);
    let mut auth = None;
    for i in 0..req.headers_len as usize {
        let h = unsafe { &*req.headers.add(i) };
        if text(h.key) == "authorization" {
            auth = Some(text(h.value));
        }
    }
    let body = (!req.body.is_null()).then(|| text(req.body));

    let mut response = match req.method {
        FfiHttpMethod::Get => {
            let mut r = agent.get(&url);
            if let Some(a) = &auth {
                r = r.header("authorization", a);
            }
            r.call()
        }
        FfiHttpMethod::Delete => {
            let mut r = agent.delete(&url);
            if let Some(a) = &auth {
                r = r.header("authorization", a);
            }
            r.call()
        }
        FfiHttpMethod::Post | FfiHttpMethod::Put | FfiHttpMethod::Patch => {
            let mut r = match req.method {
                FfiHttpMethod::Post => agent.post(&url),
                FfiHttpMethod::Put => agent.put(&url),
                _ => agent.patch(&url),
            };
            if let Some(a) = &auth {
                r = r.header("authorization", a);
            }
            r.content_type("application/json")
                .send(body.unwrap_or_default().as_bytes())
        }
    }
    .expect("HTTP transport error");

    let status = response.status().as_u16();
    let body = response.body_mut().read_to_string().unwrap_or_default();
    (status, body)
}

/// Build, execute and parse one call; returns the parsed document or the
/// failure's error code and status code.
fn round_trip(
    client: *const FfiBridgeClient,
    op: &str,
    json: &str,
) -> Result<Value, (FfiErrorCode, FfiStatusCode)> {
    let op = CString::new(op).unwrap();
    let json = CString::new(json).unwrap();
    let req = bridge_build_request(client, op.as_ptr(), json.as_ptr(), std::ptr::null_mut());
    assert!(!req.is_null());
    let (status, body) = execute(unsafe { &*req });

    let body = CString::new(body).unwrap();
    let resp = FfiHttpResponse {
        status,
        body: body.as_ptr(),
    };
    let result = bridge_parse_response(client, op.as_ptr(), req, &resp);
    bridge_free_request(req);
    let r = unsafe { Box::from_raw(result) };
    let outcome = match r.error_code {
        FfiErrorCode::Ok if r.data.is_null() => Ok(Value::Null),
        FfiErrorCode::Ok => Ok(serde_json::from_str(&text(r.data)).unwrap()),
        code => Err((code, r.status_code)),
    };
    bridge_free_result(Box::into_raw(r));
    outcome
}

#[test]
fn host_executed_session() {
    let base = CString::new(spawn_server()).unwrap();
    let client = bridge_client_new(base.as_ptr(), std::ptr::null());

    let err = round_trip(client, "me", "{}").unwrap_err();
    assert_eq!(err, (FfiErrorCode::Backend, FfiStatusCode::Unauthenticated));

    let login = format!(
        r#"{{"client_id":"{}","client_secret":"{}"}}"#,
        mock_server::CLIENT_ID,
        mock_server::CLIENT_SECRET
    );
    round_trip(client, "login", &login).unwrap();
    assert_eq!(bridge_session_state(client), FfiSessionState::Authenticated);

    let me = round_trip(client, "me", "{}").unwrap();
    assert_eq!(me["display_name"], "Ada Lovelace");

    let created = round_trip(
        client,
        "create_user",
        r#"{"first_name":"Alan","last_name":"Turing","email":"alan@example.com"}"#,
    )
    .unwrap();
    let id = created["id"].as_i64().unwrap();

    let updated = round_trip(client, "update_user", &format!(r#"{{"user_id":{id},"locale":"fr"}}"#)).unwrap();
    assert_eq!(updated["locale"], "fr");

    assert_eq!(round_trip(client, "delete_user", &format!(r#"{{"user_id":{id}}}"#)).unwrap(), Value::Null);
    let err = round_trip(client, "user", &format!(r#"{{"user_id":{id}}}"#)).unwrap_err();
    assert_eq!(err, (FfiErrorCode::Backend, FfiStatusCode::NotFound));

    // Sudo as user 2, then end the sudo session and fall back to the API user.
    round_trip(client, "login_user", r#"{"user_id":2}"#).unwrap();
    let me = round_trip(client, "me", "{}").unwrap();
    assert_eq!(me["display_name"], "Grace Hopper");
    round_trip(client, "logout", "{}").unwrap();
    assert_eq!(bridge_session_state(client), FfiSessionState::Authenticated);
    let me = round_trip(client, "me", "{}").unwrap();
    assert_eq!(me["display_name"], "Ada Lovelace");

    round_trip(client, "logout", "{}").unwrap();
    assert_eq!(bridge_session_state(client), FfiSessionState::Unauthenticated);

    bridge_client_free(client);
}
