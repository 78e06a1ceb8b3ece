//! Access-token providers.
//!
//! The upload pipeline never performs OAuth itself. It asks a
//! [`CredentialProvider`] for a bearer token once per upload call and fails
//! the run when none is available. Token acquisition, refresh, and
//! persistence belong to an external authorization tool.
//!
//! Providers, in the order [`from_config`] tries them:
//!
//! 1. `HSYNC_ACCESS_TOKEN` in the environment ([`StaticToken`]).
//! 2. The token file at `[auth].token_path` ([`TokenFileCredentials`]).
//! 3. Nothing, so every upload fails with "no access token".

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{AuthConfig, ACCESS_TOKEN_ENV};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read token file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse token file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of bearer tokens for the remote API.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current access token, or `None` when no authorization material exists.
    async fn access_token(&self) -> Result<Option<String>, CredentialError>;
}

/// A fixed token (or a fixed absence of one).
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn access_token(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.0.clone())
    }
}

/// JSON shape persisted by the authorization tool.
#[derive(Debug, Deserialize)]
struct TokenFile {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token: Option<String>,
    /// Space-separated granted scopes.
    #[serde(default)]
    scope: Option<String>,
    /// Expiry in epoch milliseconds.
    #[serde(default)]
    expiry_date: Option<i64>,
}

/// Reads the token file on every call. Never writes or refreshes it.
pub struct TokenFileCredentials {
    path: PathBuf,
    required_scopes: Vec<String>,
}

impl TokenFileCredentials {
    pub fn new(path: impl Into<PathBuf>, required_scopes: Vec<String>) -> Self {
        Self {
            path: path.into(),
            required_scopes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check(&self, file: &TokenFile) {
        if let Some(expiry) = file.expiry_date {
            if expiry <= chrono::Utc::now().timestamp_millis() {
                warn!(
                    path = %self.path.display(),
                    "access token has expired; re-run the authorization tool if uploads fail with 401"
                );
            }
        }
        if let Some(granted) = &file.scope {
            let granted: Vec<&str> = granted.split_whitespace().collect();
            for scope in &self.required_scopes {
                if !granted.contains(&scope.as_str()) {
                    warn!(scope = %scope, "token was not granted a configured scope");
                }
            }
        }
    }
}

#[async_trait]
impl CredentialProvider for TokenFileCredentials {
    async fn access_token(&self) -> Result<Option<String>, CredentialError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "token file not found");
                return Ok(None);
            }
            Err(source) => {
                return Err(CredentialError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let file: TokenFile =
            serde_json::from_str(&content).map_err(|source| CredentialError::Parse {
                path: self.path.clone(),
                source,
            })?;
        self.check(&file);
        Ok(file
            .access_token
            .or(file.token)
            .filter(|t| !t.trim().is_empty()))
    }
}

/// Pick the provider for a run from the environment and `[auth]`.
pub fn from_config(auth: &AuthConfig) -> Box<dyn CredentialProvider> {
    if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
        if !token.trim().is_empty() {
            debug!("using access token from {}", ACCESS_TOKEN_ENV);
            return Box::new(StaticToken::new(token));
        }
    }
    match &auth.token_path {
        Some(path) => Box::new(TokenFileCredentials::new(path, auth.scopes.clone())),
        None => Box::new(StaticToken::none()),
    }
}
