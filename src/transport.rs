//! Outbound HTTP to the GitHub REST API.
//!
//! A [`Session`] is opened per tool call and owns its own `reqwest::Client`,
//! so no connection pool is shared between identities. Redirects are never
//! followed: a 3xx from an API endpoint is returned to the caller as-is.

use std::error::Error as _;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{redirect, Client, Method, StatusCode};
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::credentials::Identity;
use crate::error::GatewayError;

pub const API_VERSION: &str = "2022-11-28";
pub const REDACTED: &str = "<hidden>";

const API_VERSION_HEADER: &str = "x-github-api-version";
const GITHUB_JSON: &str = "application/vnd.github+json";
const REQUEST_BODY_PREVIEW: usize = 1000;
const RESPONSE_BODY_PREVIEW: usize = 2000;

/// Result of sending one request: a response of any status, or a failure
/// before a response arrived.
pub type HttpOutcome = Result<HttpResponse, TransportFailure>;

/// Connection refused, timeout, DNS failure and the like.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TransportFailure(pub String);

impl From<reqwest::Error> for TransportFailure {
    fn from(err: reqwest::Error) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        TransportFailure(message)
    }
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub method: Method,
    pub url: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> Result<Value, GatewayError> {
        serde_json::from_str(&self.body).map_err(|e| {
            GatewayError::Unexpected(format!(
                "{} {} returned {} with a body that is not JSON: {}",
                self.method, self.url, self.status, e
            ))
        })
    }

    /// Like [`HttpResponse::json`], but an empty body yields `fallback`.
    pub fn json_or(&self, fallback: Value) -> Result<Value, GatewayError> {
        if self.body.trim().is_empty() {
            Ok(fallback)
        } else {
            self.json()
        }
    }
}

/// Headers sent on every request, derived from the identity each time.
pub fn request_headers(identity: &Identity) -> Result<HeaderMap, GatewayError> {
    let mut auth = HeaderValue::from_str(&format!("token {}", identity.token())).map_err(|_| {
        GatewayError::Unexpected("GitHub token contains characters not allowed in a header".into())
    })?;
    auth.set_sensitive(true);

    let user_agent = HeaderValue::from_str(&format!(
        "{}/{}",
        env!("CARGO_PKG_NAME"),
        identity.username()
    ))
    .map_err(|_| {
        GatewayError::Unexpected("GitHub username contains characters not allowed in a header".into())
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, auth);
    headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_JSON));
    headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));
    headers.insert(USER_AGENT, user_agent);
    Ok(headers)
}

fn is_secret_header(name: &HeaderName) -> bool {
    let name = name.as_str();
    name == AUTHORIZATION.as_str() || name == "proxy-authorization" || name.contains("token")
}

/// Header list safe to log: credential-bearing values are replaced.
pub fn redacted_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if is_secret_header(name) || value.is_sensitive() {
                REDACTED.to_string()
            } else {
                value.to_str().unwrap_or("<binary>").to_string()
            };
            (name.as_str().to_string(), shown)
        })
        .collect()
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn log_request(request: &reqwest::Request) {
    tracing::info!("=> {} {}", request.method(), request.url());
    if tracing::enabled!(tracing::Level::DEBUG) {
        tracing::debug!(headers = ?redacted_headers(request.headers()), "Request headers");
        if let Some(bytes) = request.body().and_then(|b| b.as_bytes()) {
            let body = String::from_utf8_lossy(bytes);
            tracing::debug!(body = truncate_chars(&body, REQUEST_BODY_PREVIEW), "Request body");
        }
    }
}

fn log_response(response: &HttpResponse) {
    tracing::info!(
        "<= {} {} {}",
        response.status.as_u16(),
        response.method,
        response.url
    );
    if tracing::enabled!(tracing::Level::DEBUG) {
        tracing::debug!(headers = ?redacted_headers(&response.headers), "Response headers");
        tracing::debug!(
            body = truncate_chars(&response.body, RESPONSE_BODY_PREVIEW),
            "Response body"
        );
    }
}

/// Process-wide entry point to the API. Holds only read-only configuration.
#[derive(Debug, Clone)]
pub struct Gateway {
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// Open a session for one tool call. The client is dropped with the
    /// session.
    pub fn session(&self, identity: &Identity) -> Result<Session, GatewayError> {
        let headers = request_headers(identity)?;
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| GatewayError::Unexpected(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Session {
            client,
            base_url: self.config.base_url.clone(),
            username: identity.username().to_string(),
            headers,
        })
    }
}

pub struct Session {
    client: Client,
    base_url: String,
    username: String,
    headers: HeaderMap,
}

impl Session {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> HttpOutcome {
        self.send_with_query(method, path, &[], body).await
    }

    pub async fn send_with_query(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> HttpOutcome {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .client
            .request(method.clone(), &url)
            .headers(self.headers.clone());
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let request = builder.build()?;
        log_request(&request);

        let response = match self.client.execute(request).await {
            Ok(r) => r,
            Err(e) => {
                let failure = TransportFailure::from(e);
                tracing::warn!(method = %method, url = %url, error = %failure, "Request failed");
                return Err(failure);
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().to_string();
        let body = response.text().await?;

        let response = HttpResponse {
            method,
            url,
            status,
            headers,
            body,
        };
        log_response(&response);
        Ok(response)
    }
}
