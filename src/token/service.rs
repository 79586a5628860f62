use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use super::Token;

/// Parameters of a token request
#[derive(Debug, Clone)]
pub struct TokenRequestConfig {
    pub api_url: String,
    pub api_secret: Option<String>,
    /// Identifies the model/session the token is scoped to
    pub fingerprint: Option<String>,
    pub tags: Option<String>,
    /// Skip TLS verification
    pub insecure: bool,
    /// Refresh cadence for the background worker
    pub refresh_interval: Duration,
}

impl Default for TokenRequestConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_secret: None,
            fingerprint: None,
            tags: None,
            insecure: false,
            refresh_interval: Duration::from_secs(60),
        }
    }
}

/// Issues auth tokens
///
/// Implementations may block or suspend; they are called once at startup
/// and then from the refresh worker only.
#[async_trait::async_trait]
pub trait TokenService: Send + Sync {
    async fn request_token(&self, config: &TokenRequestConfig) -> Result<Token>;
}

/// Always hands out the same token
pub struct StaticTokenService {
    token: Token,
}

impl StaticTokenService {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Token::new(token),
        }
    }
}

#[async_trait::async_trait]
impl TokenService for StaticTokenService {
    async fn request_token(&self, config: &TokenRequestConfig) -> Result<Token> {
        let token = self.token.clone();
        Ok(match &config.fingerprint {
            Some(fp) => token.with_fingerprint(fp.clone()),
            None => token,
        })
    }
}

/// Reads the token from a file on every request, so a sidecar can rotate it
pub struct FileTokenService {
    path: PathBuf,
}

impl FileTokenService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl TokenService for FileTokenService {
    async fn request_token(&self, config: &TokenRequestConfig) -> Result<Token> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read token file: {}", self.path.display()))?;

        let value = raw.trim();
        if value.is_empty() {
            bail!("Token file is empty: {}", self.path.display());
        }

        let token = Token::new(value);
        Ok(match &config.fingerprint {
            Some(fp) => token.with_fingerprint(fp.clone()),
            None => token,
        })
    }
}
