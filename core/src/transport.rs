//! Executors for plain-data HTTP requests.
//!
//! The bridge never talks to the network directly: it hands an
//! [`HttpRequest`] to a [`Transport`] and gets an [`HttpResponse`] or a
//! [`TransportFailure`] back. Non-2xx statuses are responses, not failures;
//! only "no HTTP response at all" is a failure here.

use std::time::Duration;

use crate::error::Code;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::settings::BridgeSettings;

/// The backend produced no HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    /// `DeadlineExceeded`, `Unavailable` or `Cancelled`.
    pub code: Code,
    pub message: String,
}

impl TransportFailure {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            code: Code::Unavailable,
            message: message.into(),
        }
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self {
            code: Code::DeadlineExceeded,
            message: message.into(),
        }
    }
}

pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportFailure>;
}

/// Blocking transport backed by a pooled `ureq::Agent`.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration, verify_ssl: bool) -> Self {
        // Status codes are data for the outcome translator, not errors.
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .tls_config(
                ureq::tls::TlsConfig::builder()
                    .disable_verification(!verify_ssl)
                    .build(),
            )
            .build()
            .new_agent();
        Self { agent }
    }

    pub fn from_settings(settings: &BridgeSettings) -> Self {
        Self::new(settings.timeout(), settings.verify_ssl)
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportFailure> {
        let url = request.url.as_str();
        let result = match request.method {
            HttpMethod::Get => with_headers(self.agent.get(url), request).call(),
            HttpMethod::Delete => with_headers(self.agent.delete(url), request).call(),
            HttpMethod::Post => send(with_headers(self.agent.post(url), request), request),
            HttpMethod::Put => send(with_headers(self.agent.put(url), request), request),
            HttpMethod::Patch => send(with_headers(self.agent.patch(url), request), request),
        };

        let mut response = result.map_err(map_ureq_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(map_ureq_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    request: &HttpRequest,
) -> ureq::RequestBuilder<B> {
    for (k, v) in &request.headers {
        builder = builder.header(k.as_str(), v.as_str());
    }
    builder
}

fn send(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    request: &HttpRequest,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match &request.body {
        Some(body) => builder.send(body.as_bytes()),
        None => builder.send_empty(),
    }
}

fn map_ureq_error(err: ureq::Error) -> TransportFailure {
    match err {
        ureq::Error::Timeout(t) => TransportFailure::timed_out(format!("timed out: {t}")),
        other => TransportFailure::unavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_connection_is_unavailable() {
        // Bind then drop a listener to get a port nobody is serving.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let transport = UreqTransport::new(Duration::from_secs(5), true);
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: format!("http://127.0.0.1:{port}/api/4.0/user"),
            headers: Vec::new(),
            body: None,
        };
        let failure = transport.execute(&request).unwrap_err();
        assert_eq!(failure.code, Code::Unavailable);
    }
}
