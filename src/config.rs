//! Configuration management for pagewalk

use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Browser configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Base URL that relative URLs and templates resolve against
    pub base_url: Option<String>,

    /// Default timeout for one HTTP exchange in milliseconds
    pub timeout_ms: u64,

    /// A refresh header is followed only if its delay is at most this many seconds
    pub refresh_max: f64,

    /// Maximum number of redirects (and refreshes) followed for one request
    pub max_redirects: usize,

    /// Maximum concurrent asynchronous requests
    pub max_workers: usize,

    /// Only allow URLs starting with `base_url`
    pub restrict_to_base: bool,

    /// Only allow URLs starting with one of these prefixes (ignored when empty)
    pub allowed_prefixes: Vec<String>,

    /// User agent sent with every request
    pub user_agent: String,

    /// Check TLS certificates
    pub verify_tls: bool,

    /// Proxy server
    pub proxy: Option<String>,

    /// Default attempt count for retry policies
    pub retry_tries: u32,

    /// Log level
    pub log_level: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 10_000,
            refresh_max: 0.0,
            max_redirects: 30,
            max_workers: 10,
            restrict_to_base: false,
            allowed_prefixes: Vec::new(),
            user_agent: format!("pagewalk/{}", crate::VERSION),
            verify_tls: true,
            proxy: None,
            retry_tries: 4,
            log_level: "info".to_string(),
        }
    }
}

impl BrowserConfig {
    /// Configuration with the given base URL and defaults for everything else
    pub fn with_base_url<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Default::default()
        }
    }

    /// Per-exchange timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = BrowserConfig::default();

        if let Ok(base_url) = env::var("PAGEWALK_BASE_URL") {
            config.base_url = Some(base_url);
        }

        if let Ok(timeout) = env::var("PAGEWALK_TIMEOUT_MS") {
            config.timeout_ms = timeout
                .parse()
                .map_err(|_| Error::configuration("Invalid PAGEWALK_TIMEOUT_MS"))?;
        }

        if let Ok(refresh_max) = env::var("PAGEWALK_REFRESH_MAX") {
            config.refresh_max = refresh_max
                .parse()
                .map_err(|_| Error::configuration("Invalid PAGEWALK_REFRESH_MAX"))?;
        }

        if let Ok(max_redirects) = env::var("PAGEWALK_MAX_REDIRECTS") {
            config.max_redirects = max_redirects
                .parse()
                .map_err(|_| Error::configuration("Invalid PAGEWALK_MAX_REDIRECTS"))?;
        }

        if let Ok(max_workers) = env::var("PAGEWALK_MAX_WORKERS") {
            config.max_workers = max_workers
                .parse()
                .map_err(|_| Error::configuration("Invalid PAGEWALK_MAX_WORKERS"))?;
        }

        if let Ok(restrict) = env::var("PAGEWALK_RESTRICT_TO_BASE") {
            config.restrict_to_base = restrict
                .parse()
                .map_err(|_| Error::configuration("Invalid PAGEWALK_RESTRICT_TO_BASE"))?;
        }

        if let Ok(user_agent) = env::var("PAGEWALK_USER_AGENT") {
            config.user_agent = user_agent;
        }

        if let Ok(verify) = env::var("PAGEWALK_VERIFY_TLS") {
            config.verify_tls = verify
                .parse()
                .map_err(|_| Error::configuration("Invalid PAGEWALK_VERIFY_TLS"))?;
        }

        if let Ok(proxy) = env::var("PAGEWALK_PROXY") {
            config.proxy = Some(proxy);
        }

        if let Ok(tries) = env::var("PAGEWALK_RETRY_TRIES") {
            config.retry_tries = tries
                .parse()
                .map_err(|_| Error::configuration("Invalid PAGEWALK_RETRY_TRIES"))?;
        }

        if let Ok(log_level) = env::var("PAGEWALK_LOG_LEVEL") {
            config.log_level = log_level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file: {}", e)))?;

        let config: BrowserConfig = toml::from_str(&content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::configuration("max_workers must be at least 1"));
        }
        if self.retry_tries == 0 {
            return Err(Error::configuration("retry_tries must be at least 1"));
        }
        if let Some(base) = &self.base_url {
            url::Url::parse(base)
                .map_err(|e| Error::configuration(format!("Invalid base_url {}: {}", base, e)))?;
        }
        Ok(())
    }
}
