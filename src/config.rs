//! Configuration: TOML file plus environment overrides.
//!
//! ```toml
//! [reconciler]
//! profile_debounce_ms = 1000
//! min_token_len = 20
//!
//! [backend]
//! url = "https://xxxx.supabase.co/functions/v1/make-server"
//! anon_key = "eyJ..."
//! profile_path = "/auth/me"
//!
//! [logging]
//! filter = "authsync=debug"
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default debounce window between profile fetch attempts.
const DEFAULT_PROFILE_DEBOUNCE_MS: u64 = 1000;

/// Tokens shorter than this are treated as malformed.
const DEFAULT_MIN_TOKEN_LEN: usize = 20;

const DEFAULT_PROFILE_PATH: &str = "/auth/me";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Read and parse a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// `AUTHSYNC_API_URL`, `AUTHSYNC_ANON_KEY` and `AUTHSYNC_LOG` win over
    /// file values when set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env("AUTHSYNC_API_URL") {
            self.backend.url = url;
        }
        if let Some(key) = non_empty_env("AUTHSYNC_ANON_KEY") {
            self.backend.anon_key = Some(key);
        }
        if let Some(filter) = non_empty_env("AUTHSYNC_LOG") {
            self.logging.filter = filter;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.reconciler.min_token_len == 0 {
            bail!("reconciler.min_token_len must be at least 1");
        }
        if self.backend.timeout_secs == 0 {
            bail!("backend.timeout_secs must be at least 1");
        }
        if !self.backend.profile_path.starts_with('/') {
            bail!(
                "backend.profile_path must start with '/', got '{}'",
                self.backend.profile_path
            );
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Reconciler tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Minimum time between profile fetch attempts.
    #[serde(default = "default_profile_debounce_ms")]
    pub profile_debounce_ms: u64,
    /// Sessions whose token is shorter than this are ignored at mount.
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
}

impl ReconcilerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.profile_debounce_ms)
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            profile_debounce_ms: DEFAULT_PROFILE_DEBOUNCE_MS,
            min_token_len: DEFAULT_MIN_TOKEN_LEN,
        }
    }
}

fn default_profile_debounce_ms() -> u64 {
    DEFAULT_PROFILE_DEBOUNCE_MS
}

fn default_min_token_len() -> usize {
    DEFAULT_MIN_TOKEN_LEN
}

/// Application backend connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend functions (no trailing path).
    #[serde(default)]
    pub url: String,
    /// Public anon key, sent as `apikey` and as the fallback bearer.
    #[serde(default)]
    pub anon_key: Option<String>,
    #[serde(default = "default_profile_path")]
    pub profile_path: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl BackendConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Load from environment variables.
    pub fn from_env() -> Option<Self> {
        let url = non_empty_env("AUTHSYNC_API_URL")?;
        Some(Self {
            url,
            anon_key: non_empty_env("AUTHSYNC_ANON_KEY"),
            ..Self::default()
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: None,
            profile_path: default_profile_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_profile_path() -> String {
    DEFAULT_PROFILE_PATH.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `"info"` or `"authsync=debug"`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default = "default_ansi")]
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            ansi: default_ansi(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_ansi() -> bool {
    true
}
