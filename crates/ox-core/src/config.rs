//! Configuration for oxidized-sync

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Name of the directory under the platform config dir
const CONFIG_DIR_NAME: &str = "oxidized-sync";
/// Config file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Debug and logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Log verbosity
    pub log_level: LogLevel,
    /// Also write logs to `log_path`
    pub log_to_file: bool,
    /// Log file location
    pub log_path: PathBuf,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_to_file: false,
            log_path: PathBuf::from("oxidized-sync.log"),
        }
    }
}

/// Producer/consumer pipeline settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of producer threads
    pub producers: usize,
    /// Number of consumer threads
    pub consumers: usize,
    /// Items pushed by every producer
    pub items_per_producer: usize,
    /// Ring buffer capacity
    pub capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            producers: 2,
            consumers: 2,
            items_per_producer: 1000,
            capacity: 16,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub debug: DebugConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load the config from the default location.
    ///
    /// A missing file yields the default configuration.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load the config from an explicit path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config to `path`, creating parent directories
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check pipeline sizes
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if p.capacity == 0 {
            return Err(ConfigError::Invalid("pipeline.capacity must be non-zero".into()));
        }
        if p.producers == 0 {
            return Err(ConfigError::Invalid("pipeline.producers must be non-zero".into()));
        }
        if p.consumers == 0 {
            return Err(ConfigError::Invalid("pipeline.consumers must be non-zero".into()));
        }
        // The semaphores take a u32 initial count.
        if u32::try_from(p.capacity).is_err() {
            return Err(ConfigError::Invalid(format!(
                "pipeline.capacity {} exceeds {}",
                p.capacity,
                u32::MAX
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.debug.log_level, LogLevel::Info);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [pipeline]
            producers = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.producers, 4);
        assert_eq!(config.pipeline.consumers, 2);
        assert_eq!(config.debug, DebugConfig::default());
    }

    #[test]
    fn test_log_level_parsing() {
        let config = Config::from_toml_str(
            r#"
            [debug]
            log_level = "trace"
            "#,
        )
        .unwrap();
        assert_eq!(config.debug.log_level, LogLevel::Trace);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = Config::from_toml_str(
            r#"
            [pipeline]
            capacity = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let err = Config::from_toml_str("[pipeline\nproducers = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("ox-core-config-{}", std::process::id()));
        let path = dir.join("config.toml");

        let mut config = Config::default();
        config.pipeline.capacity = 64;
        config.debug.log_level = LogLevel::Debug;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load_from("/nonexistent/oxidized-sync/config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
