use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{json, Value};

/// Diagnostic category attached to every failure a tool call can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    MissingCredential,
    NoFieldsToUpdate,
    InvalidIssueNumber,
    InvalidName,
    UnexpectedRedirect,
    WrongDomain,
    AuthFailure,
    ApiError,
    TransportError,
    Unexpected,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::MissingCredential => "missing_credential",
            ErrorCategory::NoFieldsToUpdate => "no_fields_to_update",
            ErrorCategory::InvalidIssueNumber => "invalid_issue_number",
            ErrorCategory::InvalidName => "invalid_name",
            ErrorCategory::UnexpectedRedirect => "unexpected_redirect",
            ErrorCategory::WrongDomain => "wrong_domain",
            ErrorCategory::AuthFailure => "auth_failure",
            ErrorCategory::ApiError => "api_error",
            ErrorCategory::TransportError => "transport_error",
            ErrorCategory::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A failed HTTP exchange or transport failure, mapped to a category and an
/// operation-labelled message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub http_status: Option<u16>,
    pub message: String,
    pub rate_remaining: Option<u64>,
    pub rate_reset: Option<u64>,
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ClassifiedError {}

const CREDENTIAL_HINT: &str = "pass {\"github_token\": \"<token>\", \"github_username\": \"<username>\"} \
in the tool call _meta, or set {\"GITHUB_TOKEN\": \"<token>\", \"GITHUB_USERNAME\": \"<username>\"} \
in the server environment";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{field} not provided. Please add it to your MCP client configuration: {}", CREDENTIAL_HINT)]
    MissingCredential { field: &'static str },

    #[error("No fields to update")]
    NoFieldsToUpdate,

    #[error("Invalid issue number: '{0}' is not a positive integer")]
    InvalidIssueNumber(String),

    #[error("{field} {reason}")]
    InvalidName { field: &'static str, reason: String },

    #[error(transparent)]
    Remote(#[from] ClassifiedError),

    #[error("{0}")]
    Unexpected(String),
}

impl GatewayError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::MissingCredential { .. } => ErrorCategory::MissingCredential,
            GatewayError::NoFieldsToUpdate => ErrorCategory::NoFieldsToUpdate,
            GatewayError::InvalidIssueNumber(_) => ErrorCategory::InvalidIssueNumber,
            GatewayError::InvalidName { .. } => ErrorCategory::InvalidName,
            GatewayError::Remote(e) => e.category,
            GatewayError::Unexpected(_) => ErrorCategory::Unexpected,
        }
    }

    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            GatewayError::Remote(e) => Some(e),
            _ => None,
        }
    }

    /// A failure that means the remote side is unreachable, so later steps
    /// of the same call would fail the same way.
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::TransportError
    }

    /// Error object in the shape every tool reports failures with.
    pub fn to_json(&self) -> Value {
        let mut obj = json!({
            "status": "error",
            "category": self.category(),
            "error": self.to_string(),
        });
        if let (Some(c), Some(map)) = (self.classified(), obj.as_object_mut()) {
            if let Some(status) = c.http_status {
                map.insert("http_status".into(), json!(status));
            }
            if let Some(remaining) = c.rate_remaining {
                map.insert("rate_limit_remaining".into(), json!(remaining));
            }
            if let Some(reset) = c.rate_reset {
                map.insert("rate_limit_reset".into(), json!(reset));
            }
        }
        obj
    }
}
