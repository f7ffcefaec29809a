//! Per-call identity resolution.
//!
//! An identity is assembled from an ordered list of sources. Token and
//! username are resolved independently: for each field the first source
//! with a non-empty value wins. Resolution runs on every tool call and is
//! never cached, since different calls may carry different identities.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

use crate::config::TenantMode;
use crate::error::GatewayError;

const TOKEN_KEYS: [&str; 2] = ["github_token", "GITHUB_TOKEN"];
const USERNAME_KEYS: [&str; 2] = ["github_username", "GITHUB_USERNAME"];

/// Credentials supplied alongside a single tool call.
#[derive(Clone, Default)]
pub struct CallContext {
    pub token: Option<String>,
    pub username: Option<String>,
}

impl CallContext {
    /// Read credentials from a tool call's `_meta` object.
    pub fn from_meta(meta: &Map<String, Value>) -> Self {
        let lookup = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| meta.get(*k).and_then(Value::as_str))
                .map(str::trim)
                .find(|v| !v.is_empty())
                .map(String::from)
        };
        Self {
            token: lookup(&TOKEN_KEYS),
            username: lookup(&USERNAME_KEYS),
        }
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("token", &self.token.as_ref().map(|_| "<hidden>"))
            .field("username", &self.username)
            .finish()
    }
}

/// Whatever part of an identity a single source could supply. Values are
/// trimmed and empty strings dropped on construction.
#[derive(Debug, Clone, Default)]
pub struct CredentialFragment {
    pub token: Option<SecretString>,
    pub username: Option<String>,
}

impl CredentialFragment {
    pub fn new(token: Option<String>, username: Option<String>) -> Self {
        Self {
            token: non_empty(token).map(SecretString::new),
            username: non_empty(username),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Values carried by the tool call itself.
    CallContext,
    /// Values configured at process start.
    Configured(CredentialFragment),
}

impl CredentialSource {
    pub fn fragment(&self, ctx: &CallContext) -> CredentialFragment {
        match self {
            CredentialSource::CallContext => {
                CredentialFragment::new(ctx.token.clone(), ctx.username.clone())
            }
            CredentialSource::Configured(fragment) => fragment.clone(),
        }
    }
}

/// The token and username one tool call runs as.
#[derive(Clone)]
pub struct Identity {
    token: SecretString,
    username: String,
}

impl Identity {
    pub(crate) fn new(token: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token.into()),
            username: username.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn token(&self) -> &str {
        self.token.expose_secret()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("token", &"<hidden>")
            .field("username", &self.username)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CredentialResolver {
    sources: Vec<CredentialSource>,
}

impl CredentialResolver {
    pub fn new(sources: Vec<CredentialSource>) -> Self {
        Self { sources }
    }

    /// Every call runs as the configured identity.
    pub fn single_tenant(configured: CredentialFragment) -> Self {
        Self::new(vec![CredentialSource::Configured(configured)])
    }

    /// Each call may carry its own identity; the configured one fills gaps.
    pub fn multi_tenant(fallback: CredentialFragment) -> Self {
        Self::new(vec![
            CredentialSource::CallContext,
            CredentialSource::Configured(fallback),
        ])
    }

    pub fn for_mode(mode: TenantMode, configured: CredentialFragment) -> Self {
        match mode {
            TenantMode::SingleTenant => Self::single_tenant(configured),
            TenantMode::MultiTenant => Self::multi_tenant(configured),
        }
    }

    pub fn resolve(&self, ctx: &CallContext) -> Result<Identity, GatewayError> {
        let mut token: Option<SecretString> = None;
        let mut username: Option<String> = None;

        for source in &self.sources {
            if token.is_some() && username.is_some() {
                break;
            }
            let fragment = source.fragment(ctx);
            token = token.or(fragment.token);
            username = username.or(fragment.username);
        }

        let token = token.ok_or(GatewayError::MissingCredential {
            field: "GITHUB_TOKEN",
        })?;
        let username = username.ok_or(GatewayError::MissingCredential {
            field: "GITHUB_USERNAME",
        })?;

        tracing::debug!(username = %username, "Resolved identity for tool call");
        Ok(Identity { token, username })
    }
}
