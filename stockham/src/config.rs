use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::twiddle::MAX_LOG_SIZE;

fn default_max_log_size() -> u32 {
    16
}
fn default_scratch_slots() -> usize {
    2
}
fn default_lock_pages() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// CUDA when compiled in and a device answers, host otherwise.
    #[default]
    Auto,
    Host,
    Cuda,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostMemoryConfig {
    #[serde(default = "default_lock_pages")]
    pub lock_pages: bool,

    #[serde(default)]
    pub require_lock: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_limit_mb: Option<usize>,
}

impl Default for HostMemoryConfig {
    fn default() -> Self {
        HostMemoryConfig {
            lock_pages: default_lock_pages(),
            require_lock: false,
            pool_limit_mb: None,
        }
    }
}

impl HostMemoryConfig {
    pub fn limit_bytes(&self) -> Option<usize> {
        self.pool_limit_mb.map(|mb| mb.saturating_mul(1 << 20))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    #[serde(default = "default_max_log_size")]
    pub max_log_size: u32,

    #[serde(default = "default_scratch_slots")]
    pub scratch_slots: usize,

    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default)]
    pub device_id: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_threads: Option<usize>,

    #[serde(default)]
    pub host_memory: HostMemoryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_log_size: default_max_log_size(),
            scratch_slots: default_scratch_slots(),
            backend: BackendKind::default(),
            device_id: 0,
            host_threads: None,
            host_memory: HostMemoryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults with capacity `max_n`, which must be a power of two.
    pub fn with_max_size(max_n: usize) -> Result<Self, ConfigError> {
        if max_n == 0 || !max_n.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "max transform size {} is not a power of two",
                max_n
            )));
        }
        let config = EngineConfig {
            max_log_size: max_n.trailing_zeros(),
            ..EngineConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let toml_str = std::fs::read_to_string(path)?;
        Self::from_toml_str(&toml_str)
    }

    pub fn max_n(&self) -> usize {
        1 << self.max_log_size
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_log_size > MAX_LOG_SIZE {
            return Err(ConfigError::Invalid(format!(
                "max_log_size {} exceeds the field's two-adicity {}",
                self.max_log_size, MAX_LOG_SIZE
            )));
        }
        if self.scratch_slots == 0 {
            return Err(ConfigError::Invalid("scratch_slots must be at least 1".into()));
        }
        if self.host_threads == Some(0) {
            return Err(ConfigError::Invalid("host_threads must be at least 1".into()));
        }
        if self.host_memory.require_lock && !self.host_memory.lock_pages {
            return Err(ConfigError::Invalid(
                "host_memory.require_lock needs host_memory.lock_pages".into(),
            ));
        }
        Ok(())
    }
}
