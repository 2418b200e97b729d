//! R-Droid Preview - resources for Android layout previews
//!
//! Keeps an incrementally updated index of a project's Android resources
//! and hands R classes to the preview class loader without running the
//! Android build.
//!
//! ## Architecture
//!
//! R-Droid Preview is organized into specialized crates:
//!
//! - `r-droid-core`: Errors, configuration and the event bus
//! - `r-droid-resources`: Layered resource repositories and id allocation
//! - `r-droid-resource-parser`: `res/` folders, `R.txt` files and `.aar` libraries
//! - `r-droid-rclass`: In-memory `R` class synthesis
//!
//! This crate ties them together in a [`session::PreviewSession`].

#![warn(clippy::all)]

pub mod commands;
pub mod project;
pub mod session;

// Re-export main components for library usage
pub use r_droid_core as core;
pub use r_droid_rclass as rclass;
pub use r_droid_resource_parser as parser;
pub use r_droid_resources as resources;

pub use session::{PreviewSession, SessionState};

/// Prelude module for convenient imports
pub mod prelude {
    pub use r_droid_core::{AppConfig, Event, EventBus};
    pub use r_droid_rclass::{BinaryClassProvider, ClassRegistry, ClassSummary};
    pub use r_droid_resources::{FolderConfiguration, ResourceType, RuntimeConfig};

    pub use crate::project::{ProjectConfig, ProjectManager};
    pub use crate::session::PreviewSession;
}
