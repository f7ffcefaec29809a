//! Resource operations. Each function takes the [`Session`] of the current
//! tool call and runs its HTTP steps strictly in order.
//!
//! [`Session`]: crate::transport::Session

pub mod issues;
pub mod pulls;
pub mod repos;

use crate::error::GatewayError;

/// Reject values that would change the meaning of an API path when
/// interpolated into it.
pub fn validate_path_segment(value: &str, field: &'static str) -> Result<(), GatewayError> {
    if value.is_empty() {
        return Err(GatewayError::InvalidName {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    for ch in ['/', '?', '#', '%', '\0', ' ', '\n', '\t'] {
        if value.contains(ch) {
            return Err(GatewayError::InvalidName {
                field,
                reason: format!("contains invalid character {:?}", ch),
            });
        }
    }
    Ok(())
}

/// `/repos/{owner}/{repo}` for the session user's repository.
pub fn repo_path(owner: &str, repo: &str) -> Result<String, GatewayError> {
    validate_path_segment(owner, "username")?;
    validate_path_segment(repo, "repo")?;
    Ok(format!("/repos/{}/{}", owner, repo))
}
