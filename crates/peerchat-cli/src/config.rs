//! PeerChat CLI Configuration
//!
//! A node is configured from a single file, TOML by default or JSON when the
//! file name ends in `.json`:
//!
//! ```toml
//! name = "alice"
//! peers = ["peer://<hex public key>@10.0.0.2:9876"]
//! listen = ":9876"
//! key_file = "alice.key"
//! ```
//!
//! Only a non-empty `peers` list is required; everything else defaults.

use std::path::{Path, PathBuf};

use peerchat_core::ChannelConfig;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Display name announced to peers; may be left empty
    #[serde(default)]
    pub name: String,

    /// Static peers, each `[peer://]<hex public key>@<host>:<port>`
    pub peers: Vec<String>,

    /// Listen address; `":port"` binds all interfaces
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Private key file, created on first start
    #[serde(default = "default_key_file", alias = "key")]
    pub key_file: PathBuf,

    /// Seconds between attempts to reach a disconnected peer
    #[serde(default = "default_redial_secs")]
    pub redial_interval_secs: u64,

    #[serde(default)]
    pub channels: ChannelConfig,
}

fn default_listen() -> String {
    ":9876".to_string()
}

fn default_key_file() -> PathBuf {
    PathBuf::from("key")
}

fn default_redial_secs() -> u64 {
    5
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load and validate the configuration file at `path`
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileSystem {
            path: path.to_path_buf(),
            source,
        })?;

        let config = if is_json(path) {
            Self::from_json(&contents)?
        } else {
            Self::from_toml(&contents)?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Example configuration, as TOML
    pub fn example() -> Result<String, ConfigError> {
        let example = Self {
            name: "alice".to_string(),
            peers: vec![format!("peer://{}@127.0.0.1:9877", "00".repeat(32))],
            listen: default_listen(),
            key_file: default_key_file(),
            redial_interval_secs: default_redial_secs(),
            channels: ChannelConfig::default(),
        };

        toml::to_string_pretty(&example).map_err(|e| ConfigError::Serialization(e.to_string()))
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.peers.is_empty() {
            return Err(ConfigError::Validation(
                "at least one peer must be configured".to_string(),
            ));
        }
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation("listen must not be empty".to_string()));
        }
        if self.redial_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "redial_interval_secs must be greater than 0".to_string(),
            ));
        }
        self.channels
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

// ----------------------------------------------------------------------------
// Configuration Errors
// ----------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
