//! Configuration module
//!
//! Handles loading and saving arksnet configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::dispatch::DispatchConfig;
use crate::network::NetworkConfig;
use crate::protocol::ObfuscationKey;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Unknown obfuscation context: {0}")]
    UnknownContext(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Connection queue and frame limits
    #[serde(default)]
    pub network: NetworkConfig,

    /// Dispatch table settings
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Named header obfuscation constants
    #[serde(default)]
    pub obfuscation: BTreeMap<String, ObfuscationKey>,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Name this server reports in logs
    pub name: String,
    /// Default log filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            log_level: default_log_level(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("arksnet/config.toml")),
            Some(PathBuf::from("./arksnet.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Look up a named obfuscation context
    pub fn obfuscation_key(&self, context: &str) -> ConfigResult<ObfuscationKey> {
        self.obfuscation
            .get(context)
            .copied()
            .ok_or_else(|| ConfigError::UnknownContext(context.to_string()))
    }

    /// Log filter to use when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &str {
        if self.general.verbose {
            "debug"
        } else {
            &self.general.log_level
        }
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let mut obfuscation = BTreeMap::new();
    obfuscation.insert("character_name".to_string(), ObfuscationKey::new(0x8BA4, 0xB6));
    obfuscation.insert("chat_message".to_string(), ObfuscationKey::new(0x9D3F, 0x44));

    let config = Config {
        general: GeneralConfig {
            name: "ship-01".to_string(),
            log_level: default_log_level(),
            verbose: false,
        },
        dispatch: DispatchConfig {
            movement_event_opcode: Some([0x04, 0x08]),
            log_unknown_opcodes: false,
        },
        obfuscation,
        ..Default::default()
    };

    Ok(toml::to_string_pretty(&config)?)
}
