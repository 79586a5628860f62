use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::runtime::RuntimeConfig;
use crate::session::StreamConfig;
use crate::token::TokenRequestConfig;

/// Service configuration.
///
/// Loaded from an optional file and overridden by `AVATAR__<SECTION>__<KEY>`
/// environment variables. Every section falls back to its defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub stream: StreamConfig,
    pub runtime: RuntimeConfig,
    pub token: TokenConfig,
    pub output: OutputConfig,
    pub nats: NatsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "avatar-stream".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1".to_string(),
            port: 8088,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Token issuing endpoint
    pub api_url: String,
    pub refresh_interval_secs: u64,
    pub tags: Option<String>,
    /// Skip TLS verification when talking to `api_url`
    pub insecure: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            refresh_interval_secs: 60,
            tags: None,
            insecure: false,
        }
    }
}

impl TokenConfig {
    pub fn to_request_config(&self, api_secret: Option<String>) -> TokenRequestConfig {
        TokenRequestConfig {
            api_url: self.api_url.clone(),
            api_secret,
            fingerprint: None,
            tags: self.tags.clone(),
            insecure: self.insecure,
            refresh_interval: Duration::from_secs(self.refresh_interval_secs.max(1)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where the WAV audio sink writes
    pub audio_path: PathBuf,
    pub audio_buffer_size: usize,
    pub video_buffer_size: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            audio_path: PathBuf::from("output/avatar-audio.wav"),
            audio_buffer_size: 8,
            video_buffer_size: 2,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server; control over NATS is disabled when unset
    pub url: Option<String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("AVATAR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration '{}'", path))?;

        settings
            .try_deserialize()
            .with_context(|| format!("Invalid configuration '{}'", path))
    }
}
