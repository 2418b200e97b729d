//! R-Droid Core - shared types for the preview resource crates
//!
//! This crate provides the error type, the application configuration and
//! the event bus used by the resource index, the R class generator and the
//! preview session.

pub mod config;
pub mod events;
pub mod error;

pub use config::{AppConfig, LoggingConfig, RClassConfig, ResourceConfig};
pub use events::{Event, EventBus, EventSubscription};
pub use error::{RDroidError, Result};

/// R-Droid version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "R-Droid Preview";
