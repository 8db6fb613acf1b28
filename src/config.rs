use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::buffer::file::DEFAULT_BLOCK_SIZE;
use crate::error::BufferError;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub body: BodyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// Entries older than this are treated as absent. Zero disables expiry.
    pub window_secs: u64,
    pub block_size: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BodyConfig {
    /// Bodies larger than this spill into a temporary file.
    pub memory_threshold: u64,
    pub max_size: Option<u64>,
    /// Directory for spilled bodies; the system temp dir when unset.
    pub spill_dir: Option<PathBuf>,
    pub block_size: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/tmp/databuffer-cache"),
            window_secs: 3600,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl CacheConfig {
    pub fn window(&self) -> Option<Duration> {
        (self.window_secs > 0).then(|| Duration::from_secs(self.window_secs))
    }
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            memory_threshold: 1024 * 1024,
            max_size: None,
            spill_dir: None,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl BodyConfig {
    pub fn spill_dir(&self) -> PathBuf {
        self.spill_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "full".to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> crate::error::Result<()> {
        let invalid = |message: String| -> crate::error::Result<()> {
            Err(BufferError::ConfigError { message })
        };
        if self.cache.block_size == 0 {
            return invalid("cache.block_size cannot be zero".to_string());
        }
        if self.body.block_size == 0 {
            return invalid("body.block_size cannot be zero".to_string());
        }
        if let Some(max) = self.body.max_size {
            if self.body.memory_threshold > max {
                return invalid(format!(
                    "body.memory_threshold ({}) exceeds body.max_size ({})",
                    self.body.memory_threshold, max
                ));
            }
        }
        if !matches!(self.logging.format.as_str(), "full" | "compact") {
            return invalid(format!("Unknown logging format: {}", self.logging.format));
        }
        Ok(())
    }
}

pub fn load_config(path: &str) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path))?;
    let config: Config = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse configuration file {}", path))?;
    config.validate()?;
    Ok(config)
}
