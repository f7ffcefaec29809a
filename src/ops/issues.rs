use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::repo_path;
use crate::classify::ensure_success;
use crate::config::CommentPolicy;
use crate::error::GatewayError;
use crate::outcome::{OperationResult, StepFailure};
use crate::transport::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueState {
    Open,
    Closed,
    All,
}

impl IssueState {
    /// Parse a list filter. Anything other than `open`, `closed` or `all`
    /// means "no filter" rather than an error.
    pub fn parse_filter(value: Option<&str>) -> Option<Self> {
        match value?.trim() {
            "open" => Some(IssueState::Open),
            "closed" => Some(IssueState::Closed),
            "all" => Some(IssueState::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
            IssueState::All => "all",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assignees: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IssueChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignees: Option<Vec<String>>,
}

impl IssueChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.body.is_none()
            && self.state.is_none()
            && self.labels.is_none()
            && self.assignees.is_none()
    }
}

pub fn parse_issue_number(value: &str) -> Result<u64, GatewayError> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| GatewayError::InvalidIssueNumber(value.to_string()))
}

pub async fn list(session: &Session, repo: &str, state: Option<&str>) -> Result<Vec<Value>, GatewayError> {
    let path = format!("{}/issues", repo_path(session.username(), repo)?);
    let filter = IssueState::parse_filter(state);
    let query: Vec<(&str, &str)> = filter.iter().map(|s| ("state", s.as_str())).collect();

    let outcome = session.send_with_query(Method::GET, &path, &query, None).await;
    match ensure_success("Issues list failed", outcome)?.json()? {
        Value::Array(items) => Ok(items),
        other => Err(GatewayError::Unexpected(format!(
            "Issues list failed: expected a JSON array, got {}",
            other
        ))),
    }
}

pub async fn create(session: &Session, repo: &str, issue: &NewIssue) -> Result<Value, GatewayError> {
    let path = format!("{}/issues", repo_path(session.username(), repo)?);
    let payload = serde_json::to_value(issue)
        .map_err(|e| GatewayError::Unexpected(format!("Failed to encode issue: {}", e)))?;
    let outcome = session.send(Method::POST, &path, Some(&payload)).await;
    ensure_success("Issue create failed", outcome)?.json()
}

async fn patch_issue(session: &Session, path: &str, changes: &IssueChanges) -> Result<Value, GatewayError> {
    let payload = serde_json::to_value(changes)
        .map_err(|e| GatewayError::Unexpected(format!("Failed to encode issue update: {}", e)))?;
    let outcome = session.send(Method::PATCH, path, Some(&payload)).await;
    ensure_success("Issue update failed", outcome)?.json_or(json!({"status": "ok"}))
}

async fn post_comment(session: &Session, path: &str, comment: &str) -> Result<Value, GatewayError> {
    let payload = json!({ "body": comment });
    let outcome = session
        .send(Method::POST, &format!("{}/comments", path), Some(&payload))
        .await;
    ensure_success("Issue comment failed", outcome)?.json_or(json!({"status": "commented"}))
}

/// Edit an issue's fields and/or append a comment. Each requested step is
/// reported under its own key (`update`, `comment`); nothing requested is a
/// no-op.
pub async fn update(
    session: &Session,
    repo: &str,
    issue: &str,
    changes: &IssueChanges,
    comment: Option<&str>,
    policy: CommentPolicy,
) -> OperationResult<Value> {
    let number = match parse_issue_number(issue) {
        Ok(n) => n,
        Err(e) => return e.into(),
    };
    let path = match repo_path(session.username(), repo) {
        Ok(p) => format!("{}/issues/{}", p, number),
        Err(e) => return e.into(),
    };
    let comment = comment.filter(|c| !c.is_empty());

    if changes.is_empty() && comment.is_none() {
        return OperationResult::Success(json!({"status": "no-op"}));
    }

    let mut completed = Map::new();
    let mut failures = Vec::new();
    let mut comment_allowed = true;

    if !changes.is_empty() {
        match patch_issue(session, &path, changes).await {
            Ok(updated) => {
                completed.insert("update".into(), updated);
            }
            Err(e) => {
                comment_allowed = policy.comment_after_failed_update(&e);
                failures.push(StepFailure::new("update", e));
            }
        }
    }

    if let Some(comment) = comment {
        if comment_allowed {
            match post_comment(session, &path, comment).await {
                Ok(posted) => {
                    completed.insert("comment".into(), posted);
                }
                Err(e) => failures.push(StepFailure::new("comment", e)),
            }
        } else {
            tracing::info!(repo, issue = number, "Skipping comment after failed update");
        }
    }

    OperationResult::from_steps(completed, failures)
}
