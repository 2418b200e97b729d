//! Error types for R-Droid preview resources
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type shared by the resource crates
#[derive(Error, Debug)]
pub enum RDroidError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Resource parse error: {0}")]
    Parse(String),

    #[error("Library {location} could not be loaded: {reason}")]
    Library { location: String, reason: String },

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Dependency graph error: {0}")]
    DependencyGraph(String),

    #[error("Class synthesis failed for {class}: {reason}")]
    ClassSynthesis { class: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for R-Droid operations
pub type Result<T> = std::result::Result<T, RDroidError>;

impl RDroidError {
    /// Check if this error is recoverable by retrying the operation later
    ///
    /// Library failures leave the layer absent and are retried on the next
    /// explicit rebuild; parse failures clear up when the file is fixed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RDroidError::Library { .. }
                | RDroidError::Parse(_)
                | RDroidError::Io(_)
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            RDroidError::Io(e) => format!("File operation failed: {}", e),
            RDroidError::Config(msg) => format!("Configuration error: {}", msg),
            RDroidError::Library { location, .. } => {
                format!("Resources of library {} are unavailable until the next sync", location)
            }
            RDroidError::UnknownModule(name) => format!("Module '{}' is not part of the project", name),
            RDroidError::ClassSynthesis { class, .. } => format!("Could not generate class {}", class),
            RDroidError::NotFound(msg) => format!("Not found: {}", msg),
            _ => self.to_string(),
        }
    }
}
