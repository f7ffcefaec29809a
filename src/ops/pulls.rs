use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use super::repo_path;
use crate::classify::ensure_success;
use crate::error::GatewayError;
use crate::transport::Session;

/// `head` and `base` are sent as given; branch validation is left to the API.
#[derive(Debug, Clone, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
}

pub async fn open(session: &Session, repo: &str, pr: &NewPullRequest) -> Result<Value, GatewayError> {
    let path = format!("{}/pulls", repo_path(session.username(), repo)?);
    let payload = serde_json::to_value(pr)
        .map_err(|e| GatewayError::Unexpected(format!("Failed to encode pull request: {}", e)))?;
    tracing::info!(repo, head = %pr.head, base = %pr.base, "Opening pull request");
    let outcome = session.send(Method::POST, &path, Some(&payload)).await;
    ensure_success("PR open failed", outcome)?.json()
}
