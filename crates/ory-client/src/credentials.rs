//! Credential acquisition.
//!
//! `ory proxy` and `ory tunnel` share the same proxy core and differ only in
//! where their credentials come from. The core asks a [`CredentialSource`]
//! once at startup and never cares which one it got.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Environment variable carrying a project API key.
pub const PROJECT_API_KEY_ENV: &str = "ORY_PROJECT_API_KEY";

/// Credentials the proxy may present to the platform.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    api_key: Option<String>,
}

impl Credentials {
    /// Credentials carrying a project API key.
    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
        }
    }

    /// No credentials at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// The project API key, if any.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Something that can produce [`Credentials`].
#[async_trait]
pub trait CredentialSource: Send + Sync + std::fmt::Debug {
    /// Acquire credentials.
    async fn acquire(&self) -> Result<Credentials>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// No credentials. Session lookups only need the browser's cookie.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

#[async_trait]
impl CredentialSource for Anonymous {
    async fn acquire(&self) -> Result<Credentials> {
        Ok(Credentials::none())
    }

    fn name(&self) -> &'static str {
        "anonymous"
    }
}

/// A pre-issued project API key, usually from [`PROJECT_API_KEY_ENV`].
#[derive(Clone)]
pub struct ApiKeyCredentials {
    key: Option<String>,
    var: String,
    required: bool,
}

impl ApiKeyCredentials {
    /// Use `key` directly. With `required`, a missing key is an error.
    pub fn new(key: Option<String>, required: bool) -> Self {
        Self {
            key: key.filter(|k| !k.trim().is_empty()),
            var: PROJECT_API_KEY_ENV.to_string(),
            required,
        }
    }

    /// Read the key from [`PROJECT_API_KEY_ENV`].
    pub fn from_env(required: bool) -> Self {
        Self::new(std::env::var(PROJECT_API_KEY_ENV).ok(), required)
    }
}

impl std::fmt::Debug for ApiKeyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyCredentials")
            .field("present", &self.key.is_some())
            .field("var", &self.var)
            .field("required", &self.required)
            .finish()
    }
}

#[async_trait]
impl CredentialSource for ApiKeyCredentials {
    async fn acquire(&self) -> Result<Credentials> {
        match &self.key {
            Some(key) => Ok(Credentials::with_api_key(key.clone())),
            None if self.required => Err(Error::MissingApiKey {
                var: self.var.clone(),
            }),
            None => Ok(Credentials::none()),
        }
    }

    fn name(&self) -> &'static str {
        "project-api-key"
    }
}
