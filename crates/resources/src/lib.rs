//! R-Droid Resources
//!
//! Layered, incrementally updated index over the resources of an Android
//! project and its dependencies:
//! - Folder configurations and best-match selection
//! - Per-source resource sets and overlay merging
//! - Shared layers and per-module repositories
//! - Stable resource id assignment

pub mod cache;
pub mod configuration;
pub mod ids;
pub mod item;
pub mod layer;
pub mod manager;
pub mod merger;
pub mod repository;
pub mod resource_type;
pub mod source_set;

pub use configuration::{best_match, Density, FolderConfiguration, LocaleQualifier, NetworkCode, RuntimeConfig};
pub use ids::{IdAllocator, IdTable, ResourceId, SymbolTable};
pub use item::{AttrRef, ResourceItem, ResourceValue, SourceId, SourceLocator};
pub use layer::{LayerKey, LayerSlot, LibraryLocation, MergedLayer};
pub use manager::{
    Dependency, DependencyFailure, LibraryLoader, LoadedLibrary, ModuleSpec, RepositoryBuild,
    ResourceRepositoryManager,
};
pub use merger::ResourceMerger;
pub use repository::LayeredRepository;
pub use resource_type::{field_name, ResourceType};
pub use source_set::{DeltaStats, SourceDelta, SourceResourceSet};
