use serde::{Deserialize, Serialize};
use std::path::Path;

use super::errors::ConfigError;
use super::logging::LoggingConfig;
use super::records::StaticRecordConfig;
use super::server::{DispatchMode, ServerConfig};
use crate::protocol::SEPARATOR;

const LOCAL_CONFIG: &str = "ferrous-backend.toml";
const SYSTEM_CONFIG: &str = "/etc/ferrous-backend/config.toml";

/// Main configuration structure for Ferrous Backend
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Listening socket and session behaviour
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Answers for the static resolver
    #[serde(default)]
    pub records: Vec<StaticRecordConfig>,
}

impl Config {
    /// Load configuration from file or use defaults
    ///
    /// Priority order:
    /// 1. Explicitly provided path
    /// 2. ferrous-backend.toml in current directory
    /// 3. /etc/ferrous-backend/config.toml
    /// 4. Default configuration
    pub fn load(path: Option<&str>, cli_overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else if Path::new(LOCAL_CONFIG).exists() {
            Self::from_file(LOCAL_CONFIG)?
        } else if Path::new(SYSTEM_CONFIG).exists() {
            Self::from_file(SYSTEM_CONFIG)?
        } else {
            Self::default()
        };

        config.apply_cli_overrides(cli_overrides);
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(socket) = overrides.socket_path {
            self.server.socket_path = socket;
        }
        if let Some(banner) = overrides.banner {
            self.server.banner = banner;
        }
        if let Some(dispatch) = overrides.dispatch {
            self.server.dispatch = dispatch;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.socket_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Socket path cannot be empty".to_string(),
            ));
        }

        if self.server.banner.is_empty() {
            return Err(ConfigError::Validation("Banner cannot be empty".to_string()));
        }

        if self.server.banner.contains(SEPARATOR) || self.server.banner.contains('\n') {
            return Err(ConfigError::Validation(
                "Banner cannot contain tabs or newlines".to_string(),
            ));
        }

        for (index, record) in self.records.iter().enumerate() {
            if record.name.trim().is_empty() || record.record_type.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Record #{} needs a name and a type",
                    index + 1
                )));
            }
        }

        Ok(())
    }
}

/// Command-line overrides for configuration
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub socket_path: Option<String>,
    pub banner: Option<String>,
    pub dispatch: Option<DispatchMode>,
    pub log_level: Option<String>,
}
