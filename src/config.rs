//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::encoding::{ByteCompression, DEFAULT_DICTIONARY_BUDGET, MAX_PAGE_VALUES};
use crate::index::btrie::DEFAULT_MAX_BUCKET_SIZE;
use crate::index::skiplist::{DEFAULT_MAX_LEVEL, DEFAULT_PROBABILITY};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Segment writer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Maximum values per `.pag` page
    #[serde(default = "default_values_per_page")]
    pub values_per_page: usize,

    /// Integer columns with at most this many distinct values use RLE
    #[serde(default = "default_rle_distinct_threshold")]
    pub rle_distinct_threshold: usize,

    /// Keyword columns above this many distinct values skip the dictionary
    #[serde(default = "default_dictionary_budget")]
    pub dictionary_budget: usize,

    /// Codec for text columns and over-budget keyword columns
    #[serde(default)]
    pub byte_compression: ByteCompression,

    /// fsync every file once written
    #[serde(default = "default_sync")]
    pub sync: bool,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("mkstore").to_string_lossy().to_string())
        .unwrap_or_else(|| "./mkstore_data".to_string())
}

fn default_values_per_page() -> usize {
    1000
}

fn default_rle_distinct_threshold() -> usize {
    128
}

fn default_dictionary_budget() -> usize {
    DEFAULT_DICTIONARY_BUDGET
}

fn default_sync() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            values_per_page: default_values_per_page(),
            rle_distinct_threshold: default_rle_distinct_threshold(),
            dictionary_budget: default_dictionary_budget(),
            byte_compression: ByteCompression::default(),
            sync: default_sync(),
        }
    }
}

/// Value index tuning
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    /// Burst trie bucket capacity
    #[serde(default = "default_max_bucket_size")]
    pub max_bucket_size: usize,

    #[serde(default = "default_skiplist_max_level")]
    pub skiplist_max_level: usize,

    /// Chance of promoting a skip list node one more level
    #[serde(default = "default_skiplist_probability")]
    pub skiplist_probability: f64,
}

fn default_max_bucket_size() -> usize {
    DEFAULT_MAX_BUCKET_SIZE
}

fn default_skiplist_max_level() -> usize {
    DEFAULT_MAX_LEVEL
}

fn default_skiplist_probability() -> f64 {
    DEFAULT_PROBABILITY
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_bucket_size: default_max_bucket_size(),
            skiplist_max_level: default_skiplist_max_level(),
            skiplist_probability: default_skiplist_probability(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("mkstore").join("config.toml")),
            Some(PathBuf::from("/etc/mkstore/config.toml")),
            Some(PathBuf::from("./mkstore.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::debug!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Reject settings the writer cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_PAGE_VALUES).contains(&self.storage.values_per_page) {
            return Err(ConfigError::Invalid(format!(
                "storage.values_per_page must be within 1..={}, got {}",
                MAX_PAGE_VALUES, self.storage.values_per_page
            )));
        }
        if !(1..=32).contains(&self.index.skiplist_max_level) {
            return Err(ConfigError::Invalid(format!(
                "index.skiplist_max_level must be within 1..=32, got {}",
                self.index.skiplist_max_level
            )));
        }
        let p = self.index.skiplist_probability;
        if !(p > 0.0 && p < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "index.skiplist_probability must be within (0, 1), got {}",
                p
            )));
        }
        if self.index.max_bucket_size == 0 {
            return Err(ConfigError::Invalid(
                "index.max_bucket_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Storage overrides
        if let Ok(data_dir) = std::env::var("MKSTORE_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }
        if let Ok(n) = std::env::var("MKSTORE_VALUES_PER_PAGE") {
            if let Ok(n) = n.parse() {
                self.storage.values_per_page = n;
            }
        }
        if let Ok(n) = std::env::var("MKSTORE_DICTIONARY_BUDGET") {
            if let Ok(n) = n.parse() {
                self.storage.dictionary_budget = n;
            }
        }
        if let Ok(codec) = std::env::var("MKSTORE_BYTE_COMPRESSION") {
            match codec.parse() {
                Ok(c) => self.storage.byte_compression = c,
                Err(e) => tracing::warn!("Ignoring MKSTORE_BYTE_COMPRESSION: {}", e),
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("MKSTORE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("MKSTORE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# mkstore Configuration
#
# Environment variables override these settings:
# - MKSTORE_DATA_DIR
# - MKSTORE_VALUES_PER_PAGE
# - MKSTORE_DICTIONARY_BUDGET
# - MKSTORE_BYTE_COMPRESSION
# - MKSTORE_LOG_LEVEL
# - MKSTORE_LOG_FORMAT

[storage]
# Directory holding one sub-directory per segment
data_dir = @DATA_DIR@

# Maximum values per data page
values_per_page = 1000

# Integer columns with at most this many distinct values are run-length encoded
rle_distinct_threshold = 128

# Keyword columns with more distinct values than this are compressed instead
dictionary_budget = 65536

# Byte compression for text columns: snappy or lz4
byte_compression = "snappy"

# fsync every segment file after writing
sync = true

[index]
# Burst trie bucket capacity before a node bursts
max_bucket_size = 64

# Skip list height limit and promotion probability
skiplist_max_level = 16
skiplist_probability = 0.5

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .replace("@DATA_DIR@", &toml::Value::String(default_data_dir()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.storage.values_per_page, 1000);
        assert_eq!(config.storage.byte_compression, ByteCompression::Snappy);
        assert_eq!(config.index.max_bucket_size, 64);
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.storage.data_dir, default_data_dir());
        assert!(!config.storage.data_dir.starts_with('~'));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mkstore.toml");
        std::fs::write(&path, "[storage]\nbyte_compression = \"lz4\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.storage.byte_compression, ByteCompression::Lz4);
        assert_eq!(config.storage.dictionary_budget, DEFAULT_DICTIONARY_BUDGET);
        assert_eq!(config.index.skiplist_max_level, DEFAULT_MAX_LEVEL);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mkstore.toml");
        std::fs::write(&path, "[index]\nskiplist_probability = 1.5\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));

        std::fs::write(
            &path,
            format!("[storage]\nvalues_per_page = {}\n", MAX_PAGE_VALUES + 1),
        )
        .unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));

        std::fs::write(&path, "[storage]\nbyte_compression = \"zstd\"\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));

        assert!(matches!(
            Config::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
