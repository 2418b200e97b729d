//! Application Configuration
//!
//! Manages the preview resource settings:
//! - Resource indexing behaviour
//! - R class synthesis options
//! - Logging

use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use directories::ProjectDirs;
use tracing::{info, debug};

use crate::error::{RDroidError, Result};

/// Resource repository configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResourceConfig {
    /// Log duplicate definitions inside one resource folder as warnings
    pub warn_on_duplicates: bool,
    /// Qualifier string describing the default preview device (e.g. `en-rUS-xhdpi-v34`)
    pub default_qualifiers: String,
    /// Package byte used for dynamically assigned ids
    pub dynamic_package_id: u8,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            warn_on_duplicates: true,
            default_qualifiers: "en-rUS-port-xhdpi-v34".to_string(),
            dynamic_package_id: 0x7f,
        }
    }
}

/// R class synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RClassConfig {
    /// Class file major version (52 = Java 8)
    pub class_file_major_version: u16,
    /// Emit a `SourceFile` attribute like javac does
    pub emit_source_file: bool,
}

impl Default for RClassConfig {
    fn default() -> Self {
        Self {
            class_file_major_version: 52,
            emit_source_file: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, `RUST_LOG` overrides it
    pub filter: String,
    /// Include source file names in log lines
    pub with_file: bool,
    /// Include line numbers in log lines
    pub with_line_number: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            with_file: true,
            with_line_number: true,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration version for migrations
    pub version: u32,
    /// Resource repository settings
    pub resources: ResourceConfig,
    /// R class settings
    pub rclass: RClassConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Recent projects
    pub recent_projects: Vec<PathBuf>,
    /// Maximum recent projects to store
    pub max_recent_projects: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            resources: ResourceConfig::default(),
            rclass: RClassConfig::default(),
            logging: LoggingConfig::default(),
            recent_projects: Vec::new(),
            max_recent_projects: 10,
        }
    }
}

impl AppConfig {
    /// Get the configuration directory path
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "rdroid", "R-Droid")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the configuration file path
    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Load configuration from the default location
    pub async fn load() -> Result<Self> {
        let config_file = Self::config_file()
            .ok_or_else(|| RDroidError::Config("Cannot determine config path".into()))?;
        Self::load_from(&config_file).await
    }

    /// Load configuration from a file, writing defaults if it does not exist
    pub async fn load_from(config_file: &PathBuf) -> Result<Self> {
        if config_file.exists() {
            debug!("Loading config from {:?}", config_file);
            let contents = tokio::fs::read_to_string(config_file).await?;
            let config: AppConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            info!("Config file not found, using defaults");
            let config = AppConfig::default();
            config.save_to(config_file).await?;
            Ok(config)
        }
    }

    /// Save configuration to the default location
    pub async fn save(&self) -> Result<()> {
        let config_file = Self::config_file()
            .ok_or_else(|| RDroidError::Config("Cannot determine config path".into()))?;
        self.save_to(&config_file).await
    }

    /// Save configuration to a file
    pub async fn save_to(&self, config_file: &PathBuf) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = config_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = toml::to_string_pretty(self)?;
        tokio::fs::write(config_file, contents).await?;

        debug!("Config saved to {:?}", config_file);
        Ok(())
    }

    /// Add a recent project
    pub fn add_recent_project(&mut self, path: PathBuf) {
        // Remove if already exists
        self.recent_projects.retain(|p| p != &path);

        // Add to front
        self.recent_projects.insert(0, path);

        // Trim to max size
        self.recent_projects.truncate(self.max_recent_projects);
    }
}
