//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use ccjob_core::config::{
    DEFAULT_BUCKET, DEFAULT_CONNECT_TIMEOUT, DEFAULT_ENDPOINT, DEFAULT_READ_TIMEOUT,
    DEFAULT_SPILL_THRESHOLD,
};
use ccjob_core::{JobConfig, RetryPolicy};

/// Global configuration for ccjob
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub scratch: ScratchConfig,
    pub workers: WorkersConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: String,
    pub endpoint: String,
    /// Seconds without data before a download attempt is abandoned
    pub read_timeout: u64,
    pub connect_timeout: u64,
    pub max_retries: u32,
    /// Upper bound on the wait between download attempts, in seconds
    pub max_backoff: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            read_timeout: DEFAULT_READ_TIMEOUT.as_secs(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            max_retries: retry.max_retries,
            max_backoff: retry.max_backoff.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScratchConfig {
    /// Spill directory for downloads (platform temp dir when unset)
    pub dir: Option<PathBuf>,
    pub spill_threshold_mb: usize,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            dir: None,
            spill_threshold_mb: DEFAULT_SPILL_THRESHOLD / (1024 * 1024),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub default: usize,
    pub max: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            default: cpus.min(8),
            max: 32,
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./ccjob.toml (current directory)
    /// 2. ~/.config/ccjob/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("ccjob.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "ccjob") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Library job settings from the file values; run mode is left at its default
    pub fn job_config(&self) -> JobConfig {
        let defaults = RetryPolicy::default();
        JobConfig {
            bucket: self.storage.bucket.clone(),
            endpoint: self.storage.endpoint.clone(),
            scratch_dir: self.scratch.dir.clone(),
            spill_threshold: self.scratch.spill_threshold_mb.saturating_mul(1024 * 1024),
            retry: RetryPolicy {
                max_retries: self.storage.max_retries,
                max_backoff: Duration::from_secs(self.storage.max_backoff),
                ..defaults
            },
            read_timeout: Duration::from_secs(self.storage.read_timeout),
            connect_timeout: Duration::from_secs(self.storage.connect_timeout),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.storage.bucket, "commoncrawl");
        assert_eq!(config.storage.read_timeout, 180);
        assert_eq!(config.storage.max_retries, 20);
        assert_eq!(config.scratch.spill_threshold_mb, 64);
        assert!(config.workers.default >= 1);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[storage]
bucket = "mirror"
endpoint = "http://localhost:9000"
max_retries = 3

[scratch]
dir = "/mnt/scratch"

[workers]
default = 4
max = 8
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.bucket, "mirror");
        assert_eq!(config.storage.endpoint, "http://localhost:9000");
        assert_eq!(config.storage.max_retries, 3);
        // Unset keys keep their defaults
        assert_eq!(config.storage.read_timeout, 180);
        assert_eq!(config.scratch.dir, Some(PathBuf::from("/mnt/scratch")));
        assert_eq!(config.workers.default, 4);
        assert_eq!(config.workers.max, 8);
    }

    #[test]
    fn job_config_carries_file_values() {
        let toml = r#"
[storage]
read_timeout = 30
max_retries = 5
max_backoff = 10

[scratch]
spill_threshold_mb = 2
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let job = config.job_config();
        assert_eq!(job.read_timeout, Duration::from_secs(30));
        assert_eq!(job.retry.max_retries, 5);
        assert_eq!(job.retry.max_backoff, Duration::from_secs(10));
        assert_eq!(job.spill_threshold, 2 * 1024 * 1024);
        assert_eq!(job.bucket, "commoncrawl");
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ccjob.toml");
        std::fs::write(&path, "[storage\nbucket = 1").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
