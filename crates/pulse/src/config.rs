//! Configuration management for pulse.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::access::{is_valid_code, DEFAULT_ACCESS_CODE};
use crate::checkin::{ScanPolicy, DEFAULT_DEBOUNCE_SECS, DEFAULT_MIN_DURATION_SECS};
use crate::error::{Error, Result};
use crate::registration::default_companies;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "pulse";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "roster.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `PULSE_`, `__` between sections)
/// 2. TOML config file at `~/.config/pulse/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Scanner configuration.
    pub scanner: ScannerConfig,
    /// Registration configuration.
    pub registration: RegistrationConfig,
    /// Admin configuration.
    pub admin: AdminConfig,
    /// Export configuration.
    pub export: ExportConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/pulse/roster.db`
    pub database_path: Option<PathBuf>,
}

/// Scanner-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Identical scans inside this many seconds are ignored.
    pub debounce_secs: u64,
    /// Seconds after sign-in before a re-scan counts as sign-out.
    pub min_duration_secs: u64,
    /// Decoder program and arguments; must print one decoded QR per line.
    pub decoder_command: Vec<String>,
    /// First bib suggested for an empty roster.
    pub bib_start: u32,
    /// Decoded scans buffered between the source and the state machine.
    pub channel_capacity: usize,
}

/// Registration-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Companies offered on the form.
    pub companies: Vec<String>,
}

/// Admin-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// 4-digit code required for remove, reset and export.
    pub access_code: String,
}

/// Export-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory for CSV exports. Defaults to the working directory.
    pub directory: Option<PathBuf>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            debounce_secs: DEFAULT_DEBOUNCE_SECS,
            min_duration_secs: DEFAULT_MIN_DURATION_SECS,
            decoder_command: default_decoder_command(),
            bib_start: 1,
            channel_capacity: 32,
        }
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            companies: default_companies(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            access_code: DEFAULT_ACCESS_CODE.to_string(),
        }
    }
}

/// Default decoder: zbar's camera reader, printing bare payloads.
fn default_decoder_command() -> Vec<String> {
    vec![
        "zbarcam".to_string(),
        "--raw".to_string(),
        "--nodisplay".to_string(),
    ]
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("PULSE_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.scanner.min_duration_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "min_duration_secs must be greater than 0".to_string(),
            });
        }

        if self.scanner.channel_capacity == 0 {
            return Err(Error::ConfigValidation {
                message: "channel_capacity must be greater than 0".to_string(),
            });
        }

        if self
            .scanner
            .decoder_command
            .first()
            .map_or(true, |program| program.trim().is_empty())
        {
            return Err(Error::ConfigValidation {
                message: "decoder_command must name a program".to_string(),
            });
        }

        if !is_valid_code(&self.admin.access_code) {
            return Err(Error::ConfigValidation {
                message: "access_code must be exactly 4 digits".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the export directory, resolving defaults if not set.
    #[must_use]
    pub fn export_dir(&self) -> PathBuf {
        self.export
            .directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the scan timing policy.
    #[must_use]
    pub fn scan_policy(&self) -> ScanPolicy {
        ScanPolicy::from_secs(self.scanner.debounce_secs, self.scanner.min_duration_secs)
    }
}
