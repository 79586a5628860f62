//! Auth token lifecycle
//!
//! - [`Token`]: opaque credential with optional expiry (decoded from a JWT `exp` claim)
//! - [`TokenService`]: where tokens come from
//! - [`TokenLifecycleManager`]: initial request at startup + periodic refresh worker

mod lifecycle;
mod service;

pub use lifecycle::TokenLifecycleManager;
pub use service::{FileTokenService, StaticTokenService, TokenRequestConfig, TokenService};

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    expires_at: Option<DateTime<Utc>>,
    fingerprint: Option<String>,
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

impl Token {
    /// Wrap a raw token. JWTs get their expiry from the `exp` claim.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let expires_at = jwt_expiry(&value);
        Self {
            value,
            expires_at,
            fingerprint: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Seconds until expiry (negative once expired)
    pub fn seconds_left(&self, now: DateTime<Utc>) -> Option<f64> {
        self.expires_at
            .map(|exp| exp.signed_duration_since(now).num_milliseconds() as f64 / 1000.0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

fn jwt_expiry(value: &str) -> Option<DateTime<Utc>> {
    let mut parts = value.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}
