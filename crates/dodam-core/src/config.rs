//! Realtime client configuration.
//!
//! Values resolve in this order: built-in defaults, then a TOML file, then
//! `DODAM_*` environment overrides.
//!
//! ```toml
//! probe_timeout_ms = 5000
//! poll_interval_ms = 3000
//!
//! [recovery]
//! base_delay_ms = 30000
//! max_delay_ms = 300000
//! max_retries = 3
//! ```

use backon::{BackoffBuilder, ExponentialBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Directory name under the platform config dir.
const CONFIG_DIR_NAME: &str = "dodam";

/// File name of the realtime config.
const CONFIG_FILE_NAME: &str = "realtime.toml";

/// Tunables of the push/poll delivery client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// How long a push subscription may take to confirm
    pub probe_timeout_ms: u64,

    /// Interval between polling queries
    pub poll_interval_ms: u64,

    /// Maximum messages fetched per polling query
    pub poll_batch_limit: usize,

    /// How many recent message IDs are remembered for de-duplication
    pub dedup_window: usize,

    /// Longest accepted outgoing message, in characters
    pub max_content_len: usize,

    /// Push recovery backoff
    pub recovery: RecoveryConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 5_000,
            poll_interval_ms: 3_000,
            poll_batch_limit: 100,
            dedup_window: 512,
            max_content_len: 4_000,
            recovery: RecoveryConfig::default(),
        }
    }
}

/// Exponential backoff for re-establishing push delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Delay before the first recovery attempt
    pub base_delay_ms: u64,

    /// Ceiling for any single delay
    pub max_delay_ms: u64,

    /// Attempts before giving up and polling indefinitely
    pub max_retries: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 30_000,
            max_delay_ms: 300_000,
            max_retries: 3,
        }
    }
}

impl RecoveryConfig {
    /// Delay before the first attempt.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Ceiling for any single delay.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// The delays to wait before each recovery attempt.
    ///
    /// Doubles from `base_delay` up to `max_delay` and yields exactly
    /// `max_retries` items. No jitter.
    pub fn backoff(&self) -> impl Iterator<Item = Duration> + Send + use<> {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay())
            .with_max_delay(self.max_delay())
            .with_factor(2.0)
            .with_max_times(self.max_retries as usize)
            .build()
    }
}

impl RealtimeConfig {
    /// Push confirmation timeout.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Polling interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Parses a TOML document; missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("Invalid TOML: {e}")))
    }

    /// Reads and parses a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serializes to pretty TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// `<platform config dir>/dodam/realtime.toml`, if the platform has one.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Resolves the config file to use: the explicit path, else the default
    /// path.
    pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or_else(Self::default_config_path)
    }

    /// Loads defaults, the config file (explicit, or the default path when
    /// it exists), and process environment overrides, then validates.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        tracing::debug!(?config, "Loaded realtime configuration");
        Ok(config)
    }

    /// Applies `DODAM_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
            raw.trim()
                .parse()
                .map_err(|_| Error::config(format!("{key} must be a non-negative integer, got '{raw}'")))
        }

        if let Some(raw) = lookup("DODAM_PROBE_TIMEOUT_MS") {
            self.probe_timeout_ms = parse("DODAM_PROBE_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("DODAM_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse("DODAM_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("DODAM_POLL_BATCH_LIMIT") {
            self.poll_batch_limit = parse("DODAM_POLL_BATCH_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("DODAM_RECOVERY_BASE_DELAY_MS") {
            self.recovery.base_delay_ms = parse("DODAM_RECOVERY_BASE_DELAY_MS", &raw)?;
        }
        if let Some(raw) = lookup("DODAM_RECOVERY_MAX_DELAY_MS") {
            self.recovery.max_delay_ms = parse("DODAM_RECOVERY_MAX_DELAY_MS", &raw)?;
        }
        if let Some(raw) = lookup("DODAM_RECOVERY_MAX_RETRIES") {
            self.recovery.max_retries = parse("DODAM_RECOVERY_MAX_RETRIES", &raw)?;
        }
        Ok(())
    }

    /// Rejects values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.probe_timeout_ms == 0 {
            return Err(Error::config("probe_timeout_ms must be positive"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::config("poll_interval_ms must be positive"));
        }
        if self.poll_batch_limit == 0 {
            return Err(Error::config("poll_batch_limit must be positive"));
        }
        if self.dedup_window == 0 {
            return Err(Error::config("dedup_window must be positive"));
        }
        if self.max_content_len == 0 {
            return Err(Error::config("max_content_len must be positive"));
        }
        if self.recovery.base_delay_ms == 0 {
            return Err(Error::config("recovery.base_delay_ms must be positive"));
        }
        if self.recovery.max_delay_ms < self.recovery.base_delay_ms {
            return Err(Error::config(
                "recovery.max_delay_ms must not be smaller than recovery.base_delay_ms",
            ));
        }
        Ok(())
    }
}
