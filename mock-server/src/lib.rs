//! In-process stand-in for the versioned REST backend.
//!
//! Serves a small user and group directory under `/api/{version}`, bearer
//! token auth issued by `/login`, sudo tokens issued by `/login/{user_id}`,
//! and an `/echo/{tag}` route that reflects what it received so callers can
//! check payload placement. `/users/search` pages with `Link` and
//! `X-Total-Count` headers when `per_page` is given.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const DEFAULT_API_VERSION: &str = "4.0";
pub const CLIENT_ID: &str = "mock-client";
pub const CLIENT_SECRET: &str = "mock-secret";
pub const TOKEN_TTL_SECS: u64 = 3600;
/// The user the API client credentials belong to.
pub const API_USER_ID: i64 = 1;
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub email: String,
    pub is_disabled: bool,
    pub locale: String,
    pub group_ids: Vec<i64>,
    /// Present in replies but unknown to clients.
    pub home_folder_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: i64,
    pub name: String,
    pub user_count: i64,
    pub externally_managed: bool,
    pub contains_current_user: bool,
    pub group_ids: Vec<i64>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct LoginBody {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct CreateUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_disabled: bool,
    pub locale: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct UpdateUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub is_disabled: Option<bool>,
    pub locale: Option<String>,
}

/// Who an issued token acts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Grant {
    user_id: i64,
    sudo: bool,
}

#[derive(Debug)]
pub struct Directory {
    users: BTreeMap<i64, UserRecord>,
    groups: BTreeMap<i64, GroupRecord>,
    next_user_id: i64,
    tokens: HashMap<String, Grant>,
}

impl Directory {
    /// Two users and three groups; user 1 owns the API credentials.
    pub fn seeded() -> Self {
        let users = [
            user(1, "Ada", "Lovelace", vec![1, 2]),
            user(2, "Grace", "Hopper", vec![1]),
        ];
        let groups = [
            group(1, "All Users", 2, true, vec![2, 3]),
            group(2, "Engineering", 1, true, vec![]),
            group(3, "Analysts", 0, false, vec![]),
        ];
        Self {
            users: users.into_iter().map(|u| (u.id, u)).collect(),
            groups: groups.into_iter().map(|g| (g.id, g)).collect(),
            next_user_id: 3,
            tokens: HashMap::new(),
        }
    }
}

fn user(id: i64, first: &str, last: &str, group_ids: Vec<i64>) -> UserRecord {
    UserRecord {
        id,
        first_name: first.to_string(),
        last_name: last.to_string(),
        display_name: format!("{first} {last}"),
        email: format!("{}@example.com", first.to_lowercase()),
        is_disabled: false,
        locale: "en".to_string(),
        group_ids,
        home_folder_id: format!("{}", 100 + id),
    }
}

fn group(id: i64, name: &str, user_count: i64, contains_current_user: bool, group_ids: Vec<i64>) -> GroupRecord {
    GroupRecord {
        id,
        name: name.to_string(),
        user_count,
        externally_managed: false,
        contains_current_user,
        group_ids,
    }
}

pub type Db = Arc<RwLock<Directory>>;

/// Error reply carrying a JSON `message`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not found")
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Requires authentication.")
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

pub fn app(api_version: &str) -> Router {
    let db: Db = Arc::new(RwLock::new(Directory::seeded()));
    let api = Router::new()
        .route("/login", post(login))
        .route("/login/{user_id}", post(login_user))
        .route("/logout", delete(logout))
        .route("/user", get(me))
        .route("/users", post(create_user))
        .route("/users/search", get(search_users))
        .route(
            "/users/{user_id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/groups", get(all_groups))
        .route(
            "/groups/{group_id}/groups/{deleting_group_id}",
            delete(delete_group_from_group),
        )
        .route("/echo/{tag}", any(echo))
        .with_state(db);
    Router::new().nest(&format!("/api/{api_version}"), api)
}

pub async fn run(listener: TcpListener, api_version: &str) -> Result<(), std::io::Error> {
    axum::serve(listener, app(api_version)).await
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn authorize(headers: &HeaderMap, dir: &Directory) -> Result<Grant, ApiError> {
    bearer(headers)
        .and_then(|token| dir.tokens.get(token).copied())
        .ok_or_else(ApiError::unauthorized)
}

fn issue(dir: &mut Directory, grant: Grant) -> Json<Value> {
    let token = Uuid::new_v4().simple().to_string();
    dir.tokens.insert(token.clone(), grant);
    Json(json!({
        "access_token": token,
        "token_type": "Bearer",
        "expires_in": TOKEN_TTL_SECS,
    }))
}

async fn login(State(db): State<Db>, Json(input): Json<LoginBody>) -> Result<Json<Value>, ApiError> {
    if input.client_id != CLIENT_ID || input.client_secret != CLIENT_SECRET {
        tracing::info!(client_id = %input.client_id, "rejected login");
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Invalid client credentials"));
    }
    let token = issue(
        &mut *db.write().await,
        Grant {
            user_id: API_USER_ID,
            sudo: false,
        },
    );
    tracing::info!("issued access token");
    Ok(token)
}

/// Issue a token acting as `user_id`. Only API user tokens may sudo.
async fn login_user(
    State(db): State<Db>,
    Path(user_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let mut dir = db.write().await;
    let grant = authorize(&headers, &dir)?;
    if grant.sudo {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "Sudo requires the API user"));
    }
    if !dir.users.contains_key(&user_id) {
        return Err(ApiError::not_found());
    }
    tracing::info!(user_id, "issued sudo token");
    Ok(issue(&mut dir, Grant { user_id, sudo: true }))
}

async fn logout(State(db): State<Db>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    let mut dir = db.write().await;
    authorize(&headers, &dir)?;
    if let Some(token) = bearer(&headers) {
        dir.tokens.remove(token);
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn me(State(db): State<Db>, headers: HeaderMap) -> Result<Json<UserRecord>, ApiError> {
    let dir = db.read().await;
    let grant = authorize(&headers, &dir)?;
    dir.users.get(&grant.user_id).cloned().map(Json).ok_or_else(ApiError::not_found)
}

async fn get_user(
    State(db): State<Db>,
    Path(user_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<UserRecord>, ApiError> {
    let dir = db.read().await;
    authorize(&headers, &dir)?;
    dir.users.get(&user_id).cloned().map(Json).ok_or_else(ApiError::not_found)
}

async fn search_users(
    State(db): State<Db>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let dir = db.read().await;
    authorize(&headers, &dir)?;

    let matches = |field: &str, value: &str| {
        params
            .get(field)
            .is_none_or(|wanted| wanted.eq_ignore_ascii_case(value))
    };
    let disabled = match params.get("is_disabled").map(|v| v.parse::<bool>()) {
        None => None,
        Some(Ok(v)) => Some(v),
        Some(Err(_)) => return Err(ApiError::bad_request("is_disabled must be a boolean")),
    };
    let found: Vec<UserRecord> = dir
        .users
        .values()
        .filter(|u| matches("first_name", &u.first_name))
        .filter(|u| matches("last_name", &u.last_name))
        .filter(|u| matches("email", &u.email))
        .filter(|u| disabled.is_none_or(|d| u.is_disabled == d))
        .cloned()
        .collect();

    let total = found.len();
    let requested_per_page = page_param(&params, "per_page")?;
    let per_page = requested_per_page.unwrap_or(total).max(1);
    let page = page_param(&params, "page")?.unwrap_or(1).max(1);
    let skip = (page - 1).saturating_mul(per_page);

    let mut reply_headers = HeaderMap::new();
    reply_headers.insert(HeaderName::from_static(TOTAL_COUNT_HEADER), HeaderValue::from(total));
    if requested_per_page.is_some() {
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        let links = page_links(&format!("http://{host}{}", uri.path()), uri.query(), page, per_page, total);
        let value = HeaderValue::from_str(&links)
            .map_err(|_| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "unrepresentable link header"))?;
        reply_headers.insert(header::LINK, value);
    }
    let items: Vec<UserRecord> = found.into_iter().skip(skip).take(per_page).collect();
    Ok((reply_headers, Json(items)).into_response())
}

/// `Link` header value with first, last and, where they exist, prev and
/// next pages. Other query pairs are carried over as received.
fn page_links(base: &str, query: Option<&str>, page: usize, per_page: usize, total: usize) -> String {
    let kept: Vec<&str> = query
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty() && !pair.starts_with("page="))
        .collect();
    let last = total.div_ceil(per_page).max(1);
    let link = |target: usize, rel: &str| {
        let mut pairs = kept.clone();
        let page_pair = format!("page={target}");
        pairs.push(&page_pair);
        format!("<{base}?{}>; rel=\"{rel}\"", pairs.join("&"))
    };

    let mut links = vec![link(1, "first")];
    if page > 1 {
        links.push(link((page - 1).min(last), "prev"));
    }
    if page < last {
        links.push(link(page + 1, "next"));
    }
    links.push(link(last, "last"));
    links.join(", ")
}

fn page_param(params: &HashMap<String, String>, name: &str) -> Result<Option<usize>, ApiError> {
    params
        .get(name)
        .map(|v| v.parse::<usize>())
        .transpose()
        .map_err(|_| ApiError::bad_request(format!("{name} must be a positive integer")))
}

async fn create_user(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreateUser>,
) -> Result<Json<UserRecord>, ApiError> {
    let mut dir = db.write().await;
    authorize(&headers, &dir)?;
    if input.email.is_empty() {
        return Err(ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "email is required"));
    }
    if dir.users.values().any(|u| u.email == input.email) {
        return Err(ApiError::new(StatusCode::CONFLICT, "email already in use"));
    }
    let id = dir.next_user_id;
    dir.next_user_id += 1;
    let record = UserRecord {
        id,
        display_name: format!("{} {}", input.first_name, input.last_name),
        first_name: input.first_name,
        last_name: input.last_name,
        email: input.email,
        is_disabled: input.is_disabled,
        locale: if input.locale.is_empty() { "en".to_string() } else { input.locale },
        group_ids: vec![1],
        home_folder_id: format!("{}", 100 + id),
    };
    dir.users.insert(id, record.clone());
    Ok(Json(record))
}

async fn update_user(
    State(db): State<Db>,
    Path(user_id): Path<i64>,
    headers: HeaderMap,
    Json(input): Json<UpdateUser>,
) -> Result<Json<UserRecord>, ApiError> {
    let mut dir = db.write().await;
    authorize(&headers, &dir)?;
    let record = dir.users.get_mut(&user_id).ok_or_else(ApiError::not_found)?;
    if let Some(first_name) = input.first_name {
        record.first_name = first_name;
    }
    if let Some(last_name) = input.last_name {
        record.last_name = last_name;
    }
    if let Some(email) = input.email {
        record.email = email;
    }
    if let Some(is_disabled) = input.is_disabled {
        record.is_disabled = is_disabled;
    }
    if let Some(locale) = input.locale {
        record.locale = locale;
    }
    record.display_name = format!("{} {}", record.first_name, record.last_name);
    Ok(Json(record.clone()))
}

async fn delete_user(
    State(db): State<Db>,
    Path(user_id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let mut dir = db.write().await;
    authorize(&headers, &dir)?;
    dir.users
        .remove(&user_id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(ApiError::not_found)
}

async fn all_groups(
    State(db): State<Db>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Vec<GroupRecord>>, ApiError> {
    let dir = db.read().await;
    authorize(&headers, &dir)?;
    let ids = match params.get("ids") {
        None => None,
        Some(raw) => Some(
            serde_json::from_str::<Vec<i64>>(raw)
                .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "ids must be a JSON array of integers"))?,
        ),
    };
    Ok(Json(
        dir.groups
            .values()
            .filter(|g| ids.as_ref().is_none_or(|ids| ids.contains(&g.id)))
            .cloned()
            .collect(),
    ))
}

async fn delete_group_from_group(
    State(db): State<Db>,
    Path((group_id, deleting_group_id)): Path<(i64, i64)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let mut dir = db.write().await;
    authorize(&headers, &dir)?;
    let parent = dir.groups.get_mut(&group_id).ok_or_else(ApiError::not_found)?;
    let before = parent.group_ids.len();
    parent.group_ids.retain(|id| *id != deleting_group_id);
    if parent.group_ids.len() == before {
        return Err(ApiError::not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Reflects the request. A numeric non-2xx tag answers with that status.
async fn echo(
    method: Method,
    Path(tag): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, ApiError> {
    if let Ok(status) = tag.parse::<u16>() {
        if let Ok(status) = StatusCode::from_u16(status) {
            if !status.is_success() {
                return Err(ApiError::new(status, format!("echo status {}", status.as_u16())));
            }
        }
    }
    let body = if body.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&body).unwrap_or(Value::String(body))
    };
    let header_value = |name: header::HeaderName| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    Ok(Json(json!({
        "method": method.as_str(),
        "tag": tag,
        "query": query,
        "body": body,
        "authorization": header_value(header::AUTHORIZATION),
        "content_type": header_value(header::CONTENT_TYPE),
        "user_agent": header_value(header::USER_AGENT),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_record_serializes_extra_field() {
        let json = serde_json::to_value(user(7, "Ada", "Lovelace", vec![])).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["display_name"], "Ada Lovelace");
        assert_eq!(json["email"], "ada@example.com");
        assert_eq!(json["home_folder_id"], "107");
    }

    #[test]
    fn seeded_directory_nests_groups() {
        let dir = Directory::seeded();
        assert_eq!(dir.users.len(), 2);
        assert_eq!(dir.groups[&1].group_ids, vec![2, 3]);
        assert!(dir.tokens.is_empty());
    }

    #[test]
    fn page_links_carry_other_filters() {
        let links = page_links("http://h/api/4.0/users/search", Some("per_page=1&page=2&last_name=x"), 2, 1, 3);
        assert_eq!(
            links,
            "<http://h/api/4.0/users/search?per_page=1&last_name=x&page=1>; rel=\"first\", \
             <http://h/api/4.0/users/search?per_page=1&last_name=x&page=1>; rel=\"prev\", \
             <http://h/api/4.0/users/search?per_page=1&last_name=x&page=3>; rel=\"next\", \
             <http://h/api/4.0/users/search?per_page=1&last_name=x&page=3>; rel=\"last\""
        );
    }

    #[test]
    fn last_page_has_no_next_link() {
        let links = page_links("http://h/s", None, 2, 2, 3);
        assert!(!links.contains("rel=\"next\""));
        assert!(links.contains("<http://h/s?page=2>; rel=\"last\""));
    }

    #[test]
    fn login_body_defaults_missing_fields() {
        let input: LoginBody = serde_json::from_str(r#"{"client_id":"x"}"#).unwrap();
        assert_eq!(input.client_id, "x");
        assert!(input.client_secret.is_empty());
    }

    #[test]
    fn update_user_all_fields_optional() {
        let input: UpdateUser = serde_json::from_str("{}").unwrap();
        assert!(input.first_name.is_none());
        assert!(input.is_disabled.is_none());
    }

    #[test]
    fn bearer_requires_scheme_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Token abc".parse().unwrap());
        assert_eq!(bearer(&headers), None);
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer(&headers), Some("abc"));
    }
}
