//! Request and response records for the bundled operations.
//!
//! # Design
//! Field names are the backend's snake_case names verbatim. Every record is
//! `#[serde(default)]` so that an unset field serializes to its default and
//! a reply missing a field still decodes. None of them set
//! `deny_unknown_fields`: unknown reply members are ignored.

use serde::{Deserialize, Serialize};

/// Credentials exchanged for an access token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until expiry.
    pub expires_in: u64,
    pub refresh_token: Option<String>,
}

/// Sudo login as another user, made with the API user's credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginUserRequest {
    pub user_id: i64,
    /// When true, activity under the returned token is attributed to the
    /// API user who requested it.
    pub associative: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogoutRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeRequest {
    /// Comma separated list of fields to return.
    pub fields: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRequest {
    pub user_id: i64,
    pub fields: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub email: String,
    pub is_disabled: bool,
    pub locale: String,
    pub group_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchUsersRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_disabled: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub fields: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_disabled: bool,
    pub locale: String,
}

/// Partial update; `None` members are left unchanged by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateUserRequest {
    pub user_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub is_disabled: Option<bool>,
    pub locale: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteUserRequest {
    pub user_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllGroupsRequest {
    pub fields: String,
    /// Restrict the listing to these groups; `None` lists every group.
    pub ids: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub user_count: i64,
    pub externally_managed: bool,
    pub contains_current_user: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteGroupFromGroupRequest {
    pub group_id: i64,
    pub deleting_group_id: i64,
}
