use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::DEFAULT_HOST_TTL_SECS;

/// Environment variable that overrides `settings.token`
pub const TOKEN_ENV: &str = "HOSTDIR_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_backend")]
    pub backend: Backend,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    /// Join code generation attempts before registration gives up
    #[serde(default = "default_code_attempts")]
    pub code_attempts: u32,
    #[serde(default = "default_storage_timeout")]
    pub storage_timeout_ms: u64,
    /// Budget for each delete issued by the expiry sweep
    #[serde(default = "default_sweep_delete_timeout")]
    pub sweep_delete_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsConfig {
    /// Shared secret for settings writes. Writes are refused when unset.
    #[serde(default)]
    pub token: Option<String>,
}

fn default_backend() -> Backend {
    Backend::Sqlite
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/hostdir/hosts.db")
}

fn default_ttl() -> u64 {
    DEFAULT_HOST_TTL_SECS
}

fn default_code_attempts() -> u32 {
    8
}

fn default_storage_timeout() -> u64 {
    2000
}

fn default_sweep_delete_timeout() -> u64 {
    250
}

fn default_listen() -> String {
    "[::]:8080".to_string()
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            db_path: default_db_path(),
            ttl_secs: default_ttl(),
            code_attempts: default_code_attempts(),
            storage_timeout_ms: default_storage_timeout(),
            sweep_delete_timeout_ms: default_sweep_delete_timeout(),
        }
    }
}

impl DirectoryConfig {
    /// The TTL as a time delta, if `ttl_secs` is representable as one
    pub fn try_ttl(&self) -> Option<chrono::TimeDelta> {
        i64::try_from(self.ttl_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
    }

    /// Checked by `Config::load`; an out-of-range value saturates here
    pub fn ttl(&self) -> chrono::TimeDelta {
        self.try_ttl().unwrap_or(chrono::TimeDelta::MAX)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.ttl_secs > 0, "directory.ttl_secs must be greater than zero");
        self.try_ttl().with_context(|| {
            format!("directory.ttl_secs = {} is out of range", self.ttl_secs)
        })?;
        Ok(())
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn sweep_delete_timeout(&self) -> Duration {
        Duration::from_millis(self.sweep_delete_timeout_ms)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if let Ok(token) = std::env::var(TOKEN_ENV) {
            config.settings.token = Some(token);
        }

        Ok(config)
    }

    fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.directory.validate()?;
        Ok(config)
    }
}
