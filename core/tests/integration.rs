//! End-to-end tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives the bundled typed
//! operations and the table-driven entry point over real HTTP through
//! `UreqTransport`.

use bridge_core::ops::{
    AllGroups, CreateUser, DeleteGroupFromGroup, DeleteUser, GetUser, Me, SearchUsers, UpdateUser,
};
use bridge_core::types::{
    AllGroupsRequest, CreateUserRequest, DeleteGroupFromGroupRequest, DeleteUserRequest, MeRequest,
    SearchUsersRequest, UpdateUserRequest, User, UserRequest,
};
use bridge_core::{
    BridgeClient, BridgeError, BridgeSettings, Code, Operation, OperationTable, SessionState,
};
use serde_json::{json, Value};

/// Start the mock server on a random port and return its base URL.
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

fn client(base_url: &str) -> BridgeClient {
    let mut settings = BridgeSettings::new(base_url);
    settings.client_id = Some(mock_server::CLIENT_ID.to_string());
    settings.client_secret = Some(mock_server::CLIENT_SECRET.to_string());
    settings.agent_tag = Some("bridge-core-tests".to_string());
    BridgeClient::from_settings(settings)
}

#[test]
fn user_lifecycle() {
    let c = client(&spawn_server());

    // Step 1: nothing works before login.
    let err = c.invoke::<Me>(&MeRequest::default()).unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);
    assert_eq!(err.http_status(), Some(401));

    // Step 2: log in.
    let token = c.login().unwrap();
    assert_eq!(token.token_type, "Bearer");
    assert_eq!(token.expires_in, 3600);
    assert_eq!(c.session().state(), SessionState::Authenticated);

    // Step 3: the authenticated user; the server's extra member is ignored.
    let me = c.invoke::<Me>(&MeRequest { fields: "id,display_name".to_string() }).unwrap();
    assert_eq!(me.id, 1);
    assert_eq!(me.display_name, "Ada Lovelace");

    // Step 4: create.
    let created = c
        .invoke::<CreateUser>(&CreateUserRequest {
            first_name: "Alan".to_string(),
            last_name: "Turing".to_string(),
            email: "alan@example.com".to_string(),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(created.display_name, "Alan Turing");
    let id = created.id;

    // Step 5: duplicate create maps 409.
    let err = c
        .invoke::<CreateUser>(&CreateUserRequest {
            email: "alan@example.com".to_string(),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err.code(), Code::AlreadyExists);

    // Step 6: partial update through PATCH.
    let updated = c
        .invoke::<UpdateUser>(&UpdateUserRequest {
            user_id: id,
            locale: Some("fr".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(updated.locale, "fr");
    assert_eq!(updated.email, "alan@example.com");

    // Step 7: search with query parameters.
    let found = c
        .invoke::<SearchUsers>(&SearchUsersRequest {
            last_name: "turing".to_string(),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, id);

    // Step 8: delete answers 204, decoded as an empty document.
    let gone = c.invoke::<DeleteUser>(&DeleteUserRequest { user_id: id }).unwrap();
    assert_eq!(gone, Value::Null);

    // Step 9: fetching it again is NotFound with the server's message.
    let err = c.invoke::<GetUser>(&UserRequest { user_id: id, ..Default::default() }).unwrap_err();
    match err {
        BridgeError::Backend { code, http_status, message } => {
            assert_eq!(code, Code::NotFound);
            assert_eq!(http_status, 404);
            assert_eq!(message, "Not found");
        }
        other => panic!("expected backend error, got {other:?}"),
    }

    // Step 10: logout drops the credential.
    assert!(c.logout().unwrap());
    assert_eq!(c.session().state(), SessionState::Unauthenticated);
}

#[test]
fn groups_with_array_query_and_nested_delete() {
    let c = client(&spawn_server());
    c.login().unwrap();

    let everything = c.invoke::<AllGroups>(&AllGroupsRequest::default()).unwrap();
    assert_eq!(everything.len(), 3);

    let groups = c
        .invoke::<AllGroups>(&AllGroupsRequest { ids: Some(vec![2, 3]), ..Default::default() })
        .unwrap();
    assert_eq!(groups.iter().map(|g| g.name.as_str()).collect::<Vec<_>>(), vec!["Engineering", "Analysts"]);

    let request = DeleteGroupFromGroupRequest { group_id: 1, deleting_group_id: 3 };
    c.invoke::<DeleteGroupFromGroup>(&request).unwrap();
    let err = c.invoke::<DeleteGroupFromGroup>(&request).unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
}

#[test]
fn sudo_session_acts_as_target_then_reverts() {
    let c = client(&spawn_server());

    // Logs the API user in first.
    let token = c.login_user(2).unwrap();
    assert!(!token.access_token.is_empty());
    assert!(c.session().is_sudo());
    assert_eq!(c.invoke::<Me>(&MeRequest::default()).unwrap().id, 2);

    // Switching target ends the current sudo session first.
    c.login_user(1).unwrap();
    assert_eq!(c.invoke::<Me>(&MeRequest::default()).unwrap().id, 1);

    assert!(c.logout().unwrap());
    assert!(!c.session().is_sudo());
    assert_eq!(c.session().state(), SessionState::Authenticated);
    assert_eq!(c.invoke::<Me>(&MeRequest::default()).unwrap().display_name, "Ada Lovelace");

    assert!(c.logout().unwrap());
    assert_eq!(c.session().state(), SessionState::Unauthenticated);
}

#[test]
fn search_pages_follow_link_headers() {
    let c = client(&spawn_server());
    c.login().unwrap();
    c.invoke::<CreateUser>(&CreateUserRequest {
        first_name: "Alan".to_string(),
        last_name: "Turing".to_string(),
        email: "alan@example.com".to_string(),
        ..Default::default()
    })
    .unwrap();

    let request = SearchUsersRequest { per_page: Some(2), ..Default::default() };
    let first = c.call_page::<_, User>(&SearchUsers::DESCRIPTOR, &request).unwrap();
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.info.total, Some(3));
    assert!(first.info.has_rel("next"));
    assert!(first.info.has_rel("last"));

    let mut pager = c.pager::<_, User>(&SearchUsers::DESCRIPTOR, &request).unwrap();
    let sizes: Vec<usize> = pager.by_ref().map(|page| page.unwrap().len()).collect();
    assert_eq!(sizes, vec![2, 1]);
    assert_eq!(pager.total(), Some(3));

    let all = c.page_all::<_, User>(&SearchUsers::DESCRIPTOR, &request).unwrap();
    assert_eq!(all.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[test]
fn false_filters_reach_the_backend() {
    let c = client(&spawn_server());
    c.login().unwrap();

    let enabled = c
        .invoke::<SearchUsers>(&SearchUsersRequest { is_disabled: Some(false), ..Default::default() })
        .unwrap();
    assert_eq!(enabled.len(), 2);
    let disabled = c
        .invoke::<SearchUsers>(&SearchUsersRequest { is_disabled: Some(true), ..Default::default() })
        .unwrap();
    assert!(disabled.is_empty());

    let table = OperationTable::builtin().unwrap();
    let echo = c
        .call::<_, Value>(table.get("echo").unwrap(), &json!({"tag": "mirror", "is_disabled": false}))
        .unwrap();
    assert_eq!(echo["query"], json!({"is_disabled": "false", "tag": "mirror"}));
}

#[test]
fn get_and_delete_send_query_without_body() {
    let c = client(&spawn_server());
    let table = OperationTable::builtin().unwrap();

    for id in ["echo", "echo_delete"] {
        let echo = c
            .call::<_, Value>(table.get(id).unwrap(), &json!({"tag": "mirror", "n": 3, "flag": true, "skip": null}))
            .unwrap();
        assert_eq!(echo["body"], Value::Null, "{id}");
        assert_eq!(echo["content_type"], Value::Null, "{id}");
        assert_eq!(echo["query"], json!({"flag": "true", "n": "3", "tag": "mirror"}), "{id}");
        assert_eq!(echo["user_agent"], "bridge-core-tests");
    }
}

#[test]
fn post_put_patch_send_body_without_query() {
    let c = client(&spawn_server());
    let table = OperationTable::builtin().unwrap();

    for (id, method) in [("echo_create", "POST"), ("echo_replace", "PUT"), ("echo_update", "PATCH")] {
        let echo = c
            .call::<_, Value>(table.get(id).unwrap(), &json!({"tag": "mirror", "items": [1, 2]}))
            .unwrap();
        assert_eq!(echo["method"], method);
        assert_eq!(echo["query"], json!({}), "{id}");
        assert_eq!(echo["body"], json!({"tag": "mirror", "items": [1, 2]}), "{id}");
        assert_eq!(echo["content_type"], "application/json");
    }
}

#[test]
fn status_codes_map_through_live_transport() {
    let c = client(&spawn_server());
    let echo = OperationTable::builtin().unwrap().get("echo").unwrap().clone();

    for (status, code) in [
        ("400", Code::InvalidArgument),
        ("403", Code::PermissionDenied),
        ("429", Code::ResourceExhausted),
        ("503", Code::Unavailable),
        ("500", Code::Internal),
    ] {
        let err = c.call::<_, Value>(&echo, &json!({ "tag": status })).unwrap_err();
        assert_eq!(err.code(), code, "status {status}");
        assert!(err.to_string().contains(&format!("echo status {status}")));
    }
}

#[test]
fn rejected_credential_clears_session() {
    let base = spawn_server();
    let c = client(&base);
    c.login().unwrap();

    // Revoke the token behind the client's back.
    let other = client(&base);
    other.session().store(bridge_core::Credential::new(
        c.session().credential().unwrap().token(),
        0,
    ));
    other.logout().unwrap();

    let err = c.invoke::<Me>(&MeRequest::default()).unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);
    assert_eq!(c.session().state(), SessionState::Unauthenticated);
}

#[test]
fn unreachable_backend_is_unavailable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}")).login().unwrap_err();
    assert!(matches!(err, BridgeError::Transport { code: Code::Unavailable, .. }));
}

#[test]
fn bad_login_is_unauthenticated() {
    let mut settings = BridgeSettings::new(&spawn_server());
    settings.client_id = Some("mock-client".to_string());
    settings.client_secret = Some("wrong".to_string());
    let c = BridgeClient::from_settings(settings);

    let err = c.login().unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);
    assert_eq!(c.session().state(), SessionState::Unauthenticated);
}
