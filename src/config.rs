use std::time::Duration;

use crate::error::GatewayError;

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Process-wide transport settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }
}

/// Whether every call runs as the configured identity, or each call may
/// bring its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TenantMode {
    SingleTenant,
    #[default]
    MultiTenant,
}

/// What `issue_update` does with a requested comment when the field update
/// before it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CommentPolicy {
    /// Post the comment anyway, unless the API was unreachable.
    #[default]
    Independent,
    /// Skip the comment whenever the update failed.
    RequireUpdate,
}

impl CommentPolicy {
    pub fn comment_after_failed_update(&self, update_err: &GatewayError) -> bool {
        match self {
            CommentPolicy::Independent => !update_err.is_fatal(),
            CommentPolicy::RequireUpdate => false,
        }
    }
}
