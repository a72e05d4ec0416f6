//! Access tokens for submission endpoints.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Environment variable {0} is not set")]
    Missing(String),

    #[error("Environment variable {0} is empty")]
    Empty(String),

    #[error("Token provider failed: {0}")]
    Provider(String),
}

/// Bearer token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Token for channels that authenticate some other way
    pub fn anonymous() -> Self {
        Self(String::new())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Supplies and refreshes access tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current token, acquiring one if needed
    async fn token(&self) -> Result<AccessToken, CredentialError>;

    /// Discard the current token and acquire a new one
    async fn refresh(&self) -> Result<AccessToken, CredentialError>;
}

/// Fixed token; refresh returns the same value
pub struct StaticTokenProvider {
    token: AccessToken,
}

impl StaticTokenProvider {
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }

    pub fn anonymous() -> Self {
        Self::new(AccessToken::anonymous())
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<AccessToken, CredentialError> {
        Ok(self.token.clone())
    }

    async fn refresh(&self) -> Result<AccessToken, CredentialError> {
        Ok(self.token.clone())
    }
}

/// Reads the token from an environment variable; refresh re-reads it.
///
/// Lets an external credential helper rotate the token while a run is in
/// progress.
pub struct EnvTokenProvider {
    var: String,
    cached: Mutex<Option<AccessToken>>,
}

impl EnvTokenProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            cached: Mutex::new(None),
        }
    }

    fn read(&self) -> Result<AccessToken, CredentialError> {
        let value = std::env::var(&self.var).map_err(|_| CredentialError::Missing(self.var.clone()))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(CredentialError::Empty(self.var.clone()));
        }
        Ok(AccessToken::new(value))
    }
}

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn token(&self) -> Result<AccessToken, CredentialError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self.read()?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn refresh(&self) -> Result<AccessToken, CredentialError> {
        let mut cached = self.cached.lock().await;
        let token = self.read()?;
        info!(var = %self.var, "Access token reloaded");
        *cached = Some(token.clone());
        Ok(token)
    }
}
