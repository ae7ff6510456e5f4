//! The dispatch bridge.
//!
//! # Design
//! `BridgeClient` turns `(descriptor, request)` into one HTTP call and the
//! call's outcome into a typed response or a [`BridgeError`]. The work is
//! split the same way for every operation:
//!
//! - [`build_request`](BridgeClient::build_request) resolves the path
//!   template, encodes the request once, places the payload by verb (query
//!   string for GET/DELETE, JSON body otherwise) and attaches the session
//!   credential. Nothing touches the network here, so encoding failures
//!   surface before any I/O.
//! - [`complete`](BridgeClient::complete) translates a [`RawOutcome`] and
//!   applies the descriptor's session effect. Revocations only touch the
//!   credential the request was sent with.
//!
//! [`invoke`](BridgeClient::invoke) runs both halves around the configured
//! [`Transport`]; hosts that do their own I/O call the halves directly.

use std::marker::PhantomData;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::cancel::CancelToken;
use crate::codec;
use crate::descriptor::{Operation, OperationDescriptor, SessionEffect};
use crate::error::{BridgeError, Code};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::ops;
use crate::outcome::RawOutcome;
use crate::paging::{Page, PageInfo};
use crate::session::{Credential, SessionContext, SessionState};
use crate::settings::BridgeSettings;
use crate::transport::{Transport, TransportFailure, UreqTransport};
use crate::types::{AccessToken, LoginRequest, LoginUserRequest, LogoutRequest};

const CANCEL_POLL: Duration = Duration::from_millis(20);

#[derive(Clone)]
pub struct BridgeClient {
    base_url: String,
    settings: BridgeSettings,
    session: Arc<SessionContext>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("base_url", &self.base_url)
            .field("api_version", &self.session.api_version())
            .field("state", &self.session.state())
            .finish_non_exhaustive()
    }
}

impl BridgeClient {
    /// Client with default settings for `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self::from_settings(BridgeSettings::new(base_url))
    }

    pub fn from_settings(settings: BridgeSettings) -> Self {
        let transport = Arc::new(UreqTransport::from_settings(&settings));
        Self::with_transport(settings, transport)
    }

    pub fn with_transport(settings: BridgeSettings, transport: Arc<dyn Transport>) -> Self {
        let session = Arc::new(SessionContext::new(settings.api_version.clone()));
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            settings,
            session,
            transport,
        }
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Absolute URL for an already resolved path.
    pub fn url_for(&self, resolved_path: &str) -> String {
        format!(
            "{}/api/{}{}",
            self.base_url,
            self.session.api_version(),
            resolved_path
        )
    }

    /// Encode `request` for `descriptor` without performing any I/O.
    pub fn build_request<R: Serialize + ?Sized>(
        &self,
        descriptor: &OperationDescriptor,
        request: &R,
    ) -> Result<HttpRequest, BridgeError> {
        let op = descriptor.id.as_ref();
        let template = descriptor
            .template()
            .map_err(|e| BridgeError::encoding(op, e.to_string()))?;
        let payload = codec::encode(op, request)?;
        let path = template
            .resolve(&payload)
            .map_err(|e| BridgeError::encoding(op, e.to_string()))?;

        let mut url = self.url_for(&path);
        let mut headers = Vec::new();
        let body = if descriptor.method.carries_body() {
            headers.push(("content-type".to_string(), "application/json".to_string()));
            Some(Value::Object(payload).to_string())
        } else {
            let query = codec::query_pairs(&payload)
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            if !query.is_empty() {
                url.push('?');
                url.push_str(&query);
            }
            None
        };

        // Sudo logins are made by the API user, never by a sudo credential.
        let credential = match descriptor.session {
            SessionEffect::Sudo => self.session.primary(),
            _ => self.session.credential(),
        };
        self.attach_headers(&mut headers, credential.as_deref());

        Ok(HttpRequest {
            method: descriptor.method,
            url,
            headers,
            body,
        })
    }

    /// GET request for a page link returned by the backend. The link must
    /// point below this client's base URL since it carries the credential.
    pub fn build_link_request(&self, url: &str) -> Result<HttpRequest, BridgeError> {
        let below_base = url
            .strip_prefix(self.base_url.as_str())
            .is_some_and(|rest| rest.starts_with('/'));
        if !below_base {
            return Err(BridgeError::encoding(
                "page link",
                format!("{url} is outside {}", self.base_url),
            ));
        }
        let mut headers = Vec::new();
        self.attach_headers(&mut headers, self.session.credential().as_deref());
        Ok(HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers,
            body: None,
        })
    }

    fn attach_headers(&self, headers: &mut Vec<(String, String)>, credential: Option<&Credential>) {
        if let Some(credential) = credential {
            headers.push((
                "authorization".to_string(),
                format!("Bearer {}", credential.token()),
            ));
        }
        if let Some(agent) = &self.settings.agent_tag {
            headers.push(("user-agent".to_string(), agent.clone()));
        }
        for (k, v) in &self.settings.headers {
            headers.push((k.clone(), v.clone()));
        }
    }

    /// Translate the outcome of `sent`, a request built from `descriptor`,
    /// and apply the descriptor's session effect.
    pub fn complete<T: DeserializeOwned + Default>(
        &self,
        descriptor: &OperationDescriptor,
        sent: &HttpRequest,
        outcome: RawOutcome,
    ) -> Result<T, BridgeError> {
        self.complete_as(descriptor, sent.bearer_token(), outcome)
    }

    /// Like [`complete`](Self::complete) for callers that kept only the
    /// bearer token the request carried.
    pub fn complete_as<T: DeserializeOwned + Default>(
        &self,
        descriptor: &OperationDescriptor,
        sent_token: Option<&str>,
        outcome: RawOutcome,
    ) -> Result<T, BridgeError> {
        let document = outcome.into_document();

        if descriptor.session == SessionEffect::Logout {
            if let Some(token) = sent_token {
                self.session.revoke(token);
            }
        }
        let document = match document {
            Ok(doc) => doc,
            Err(err) => {
                if matches!(err, BridgeError::Backend { code: Code::Unauthenticated, .. }) {
                    tracing::info!(operation = %descriptor.id, "credential rejected by backend");
                    if let Some(token) = sent_token {
                        self.session.revoke(token);
                    }
                }
                return Err(err);
            }
        };
        match descriptor.session {
            SessionEffect::Login => self.session.store(credential_from(document.as_ref())?),
            SessionEffect::Sudo => self.session.store_sudo(credential_from(document.as_ref())?),
            SessionEffect::None | SessionEffect::Logout => {}
        }
        codec::from_document(document)
    }

    /// Host-does-IO counterpart of [`complete`](Self::complete).
    pub fn parse_response<T: DeserializeOwned + Default>(
        &self,
        descriptor: &OperationDescriptor,
        sent: &HttpRequest,
        response: HttpResponse,
    ) -> Result<T, BridgeError> {
        self.complete(descriptor, sent, RawOutcome::from_response(response))
    }

    fn execute(&self, descriptor: &OperationDescriptor, http: &HttpRequest) -> Result<HttpResponse, TransportFailure> {
        tracing::debug!(
            operation = %descriptor.id,
            method = %http.method,
            url = %http.url,
            "dispatching"
        );
        let result = self.transport.execute(http);
        if let Err(failure) = &result {
            tracing::warn!(operation = %descriptor.id, code = %failure.code, error = %failure.message, "transport failure");
        }
        result
    }

    /// Dispatch one call described by `descriptor`.
    pub fn call<R, T>(&self, descriptor: &OperationDescriptor, request: &R) -> Result<T, BridgeError>
    where
        R: Serialize + ?Sized,
        T: DeserializeOwned + Default,
    {
        let http = self.build_request(descriptor, request)?;
        let result = self.execute(descriptor, &http);
        self.complete(descriptor, &http, RawOutcome::from_transport(result))
    }

    pub fn invoke<O: Operation>(&self, request: &O::Request) -> Result<O::Response, BridgeError> {
        self.call(&O::DESCRIPTOR, request)
    }

    /// Like [`call`](Self::call), but returns as soon as `cancel` fires.
    /// An outcome arriving after cancellation is dropped undecoded.
    ///
    /// Each call runs the transport on its own OS thread. A cancelled call
    /// returns at once, but its thread stays blocked in the transport until
    /// the request finishes or the configured timeout elapses.
    pub fn call_cancellable<R, T>(
        &self,
        descriptor: &OperationDescriptor,
        request: &R,
        cancel: &CancelToken,
    ) -> Result<T, BridgeError>
    where
        R: Serialize + ?Sized,
        T: DeserializeOwned + Default,
    {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let http = self.build_request(descriptor, request)?;
        let sent_token = http.bearer_token().map(str::to_string);
        tracing::debug!(operation = %descriptor.id, method = %http.method, url = %http.url, "dispatching");

        let (tx, rx) = mpsc::channel();
        let transport = Arc::clone(&self.transport);
        thread::Builder::new()
            .name("bridge-dispatch".to_string())
            .spawn(move || {
                // The receiver is gone if the caller cancelled.
                let _ = tx.send(transport.execute(&http));
            })
            .map_err(|e| BridgeError::Transport {
                code: Code::Unavailable,
                message: format!("failed to start dispatch: {e}"),
            })?;

        loop {
            match rx.recv_timeout(CANCEL_POLL) {
                Ok(_) if cancel.is_cancelled() => return Err(cancelled()),
                Ok(result) => {
                    return self.complete_as(descriptor, sent_token.as_deref(), RawOutcome::from_transport(result))
                }
                Err(RecvTimeoutError::Timeout) if cancel.is_cancelled() => {
                    tracing::debug!(operation = %descriptor.id, "call cancelled in flight");
                    return Err(cancelled());
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(BridgeError::Transport {
                        code: Code::Internal,
                        message: "dispatch worker exited without an outcome".to_string(),
                    })
                }
            }
        }
    }

    pub fn invoke_cancellable<O: Operation>(
        &self,
        request: &O::Request,
        cancel: &CancelToken,
    ) -> Result<O::Response, BridgeError> {
        self.call_cancellable(&O::DESCRIPTOR, request, cancel)
    }

    /// Dispatch a list call and keep the response's paging metadata.
    pub fn call_page<R, E>(&self, descriptor: &OperationDescriptor, request: &R) -> Result<Page<Vec<E>>, BridgeError>
    where
        R: Serialize + ?Sized,
        E: DeserializeOwned,
    {
        let http = self.build_request(descriptor, request)?;
        self.fetch_page(descriptor, &http)
    }

    fn fetch_page<E: DeserializeOwned>(
        &self,
        descriptor: &OperationDescriptor,
        http: &HttpRequest,
    ) -> Result<Page<Vec<E>>, BridgeError> {
        let result = self.execute(descriptor, http);
        let info = match &result {
            Ok(response) => PageInfo::from_headers(&response.headers),
            Err(_) => PageInfo::default(),
        };
        let items = self.complete(descriptor, http, RawOutcome::from_transport(result))?;
        Ok(Page { items, info })
    }

    /// Iterate over every page of a list call, following `rel="next"` links
    /// until the backend stops sending one.
    pub fn pager<R, E>(&self, descriptor: &OperationDescriptor, request: &R) -> Result<Pager<'_, E>, BridgeError>
    where
        R: Serialize + ?Sized,
        E: DeserializeOwned,
    {
        let first = self.build_request(descriptor, request)?;
        Ok(Pager {
            client: self,
            descriptor: descriptor.clone(),
            pending: Some(Ok(first)),
            total: None,
            _items: PhantomData,
        })
    }

    /// Collect every page of a list call into one list.
    pub fn page_all<R, E>(&self, descriptor: &OperationDescriptor, request: &R) -> Result<Vec<E>, BridgeError>
    where
        R: Serialize + ?Sized,
        E: DeserializeOwned,
    {
        self.pager(descriptor, request)?.try_fold(Vec::new(), |mut all, page| {
            all.extend(page?);
            Ok(all)
        })
    }

    /// Log in with the configured `client_id` and `client_secret`.
    pub fn login(&self) -> Result<AccessToken, BridgeError> {
        let missing = |field: &str| BridgeError::encoding("login", format!("{field} is not configured"));
        let request = LoginRequest {
            client_id: self.settings.client_id.clone().ok_or_else(|| missing("client_id"))?,
            client_secret: self
                .settings
                .client_secret
                .clone()
                .ok_or_else(|| missing("client_secret"))?,
        };
        self.invoke::<ops::Login>(&request)
    }

    /// Act on behalf of `user_id`. Logs the API user in first when needed;
    /// until [`logout`](Self::logout) every call carries the sudo credential.
    pub fn login_user(&self, user_id: i64) -> Result<AccessToken, BridgeError> {
        if self.session.is_sudo() {
            self.logout()?;
        }
        if self.session.primary().is_none() {
            self.login()?;
        }
        self.invoke::<ops::LoginUser>(&LoginUserRequest {
            user_id,
            ..Default::default()
        })
    }

    /// Log out the active credential. Ending a sudo session reverts to the
    /// API user; otherwise the session ends. The local credential is dropped
    /// even when the backend call fails. Returns false if unauthenticated.
    pub fn logout(&self) -> Result<bool, BridgeError> {
        if self.session.state() == SessionState::Unauthenticated {
            return Ok(false);
        }
        self.invoke::<ops::Logout>(&LogoutRequest {})?;
        Ok(true)
    }
}

/// Pages of a list call, fetched lazily. Created by
/// [`BridgeClient::pager`].
pub struct Pager<'a, E> {
    client: &'a BridgeClient,
    descriptor: OperationDescriptor,
    pending: Option<Result<HttpRequest, BridgeError>>,
    total: Option<u64>,
    _items: PhantomData<fn() -> E>,
}

impl<E> Pager<'_, E> {
    /// Total item count reported with the latest page, if any.
    pub fn total(&self) -> Option<u64> {
        self.total
    }
}

impl<E: DeserializeOwned> Iterator for Pager<'_, E> {
    type Item = Result<Vec<E>, BridgeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let http = match self.pending.take()? {
            Ok(http) => http,
            Err(err) => return Some(Err(err)),
        };
        let page = match self.client.fetch_page::<E>(&self.descriptor, &http) {
            Ok(page) => page,
            Err(err) => return Some(Err(err)),
        };
        self.total = page.info.total.or(self.total);
        self.pending = page
            .info
            .next()
            .filter(|link| link.url != http.url)
            .map(|link| self.client.build_link_request(&link.url));
        Some(Ok(page.items))
    }
}

fn credential_from(document: Option<&Value>) -> Result<Credential, BridgeError> {
    let token: AccessToken = codec::from_document(document.cloned())?;
    if token.access_token.is_empty() {
        return Err(BridgeError::Decode(
            "login response carried no access_token".to_string(),
        ));
    }
    Ok(Credential::new(token.access_token, token.expires_in))
}

fn cancelled() -> BridgeError {
    BridgeError::Transport {
        code: Code::Cancelled,
        message: "call cancelled by caller".to_string(),
    }
}
