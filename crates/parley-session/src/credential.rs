//! Opaque, time-bounded access credentials and their providers.
//!
//! The login flow that mints tokens lives outside this crate; the session
//! only asks a [`CredentialProvider`] for the current token before each ask.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_common::CredentialError;
use tokio::sync::watch;

/// Environment variable read by [`EnvCredentialProvider`].
pub const TOKEN_ENV: &str = "PARLEY_TOKEN";

/// An access token with an optional expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}

/// Supplies the current access token.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> Result<Credential, CredentialError>;

    /// Receiver that observes every rotation, for providers that know when
    /// the token changes. `None` means changes are only seen on the next
    /// `access_token` call.
    fn changes(&self) -> Option<watch::Receiver<Credential>> {
        None
    }
}

/// Holds a credential in memory; `replace` models a token refresh and is
/// broadcast to every [`CredentialProvider::changes`] receiver.
pub struct StaticCredentialProvider {
    current: watch::Sender<Credential>,
}

impl StaticCredentialProvider {
    pub fn new(credential: Credential) -> Self {
        let (current, _) = watch::channel(credential);
        Self { current }
    }

    pub fn replace(&self, credential: Credential) {
        self.current.send_replace(credential);
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn access_token(&self) -> Result<Credential, CredentialError> {
        let credential = self.current.borrow().clone();
        if credential.is_expired() {
            return Err(CredentialError::Expired);
        }
        Ok(credential)
    }

    fn changes(&self) -> Option<watch::Receiver<Credential>> {
        Some(self.current.subscribe())
    }
}

/// Reads the token from an environment variable on every call, so an
/// external refresher can rotate it.
pub struct EnvCredentialProvider {
    var: String,
}

impl EnvCredentialProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new(TOKEN_ENV)
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn access_token(&self) -> Result<Credential, CredentialError> {
        match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Ok(Credential::new(token.trim())),
            _ => Err(CredentialError::Missing(format!("{} not set", self.var))),
        }
    }
}
