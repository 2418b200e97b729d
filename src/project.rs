//! Project description for R-Droid previews
//!
//! A project is described by an `rdroid.toml` file at its root:
//!
//! ```toml
//! name = "demo"
//! framework_symbols = "sdk/android-R.txt"
//!
//! [[modules]]
//! name = "app"
//! package = "com.example.app"
//! resource_dirs = ["app/src/main/res", "app/src/debug/res"]
//! dependencies = ["ui"]
//! libraries = [{ path = "libs/chart.aar" }]
//! ```
//!
//! Relative paths are resolved against the project directory.

use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use r_droid_resources::{Dependency, LibraryLocation, ModuleSpec, SourceId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Project configuration (rdroid.toml)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,
    /// `R.txt` of the Android platform, for framework attribute ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_symbols: Option<PathBuf>,
    /// Modules of the project
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

/// One module section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Module name, referenced by `dependencies`
    pub name: String,
    /// Package of the module's R class
    pub package: String,
    /// `res/` directories, lowest precedence first
    #[serde(default)]
    pub resource_dirs: Vec<PathBuf>,
    /// Module dependencies, nearest first
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Library dependencies, nearest first; they rank below module dependencies
    #[serde(default)]
    pub libraries: Vec<LibraryConfig>,
}

/// A library dependency: an `.aar` archive or an exploded library directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub path: PathBuf,
}

impl ProjectConfig {
    pub fn module(&self, name: &str) -> Option<&ModuleConfig> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// First module of the file, the default target of commands
    pub fn default_module(&self) -> Option<&ModuleConfig> {
        self.modules.first()
    }

    /// Framework symbol file resolved against `root`
    pub fn framework_symbols_path(&self, root: &Path) -> Option<PathBuf> {
        self.framework_symbols.as_ref().map(|p| root.join(p))
    }
}

impl ModuleConfig {
    /// Resource directories resolved against `root`
    pub fn resource_paths(&self, root: &Path) -> Vec<PathBuf> {
        self.resource_dirs.iter().map(|d| root.join(d)).collect()
    }

    /// Repository description of the module
    pub fn to_spec(&self, root: &Path) -> ModuleSpec {
        let sources = self
            .resource_paths(root)
            .iter()
            .map(|p| source_id(p))
            .collect();

        let dependencies = self
            .dependencies
            .iter()
            .map(|m| Dependency::Module(m.clone()))
            .chain(
                self.libraries
                    .iter()
                    .map(|l| Dependency::Library(LibraryLocation::from_path(&root.join(&l.path)))),
            )
            .collect();

        ModuleSpec {
            name: self.name.clone(),
            package: self.package.clone(),
            sources,
            dependencies,
        }
    }
}

/// Source id of a resource directory
pub fn source_id(path: &Path) -> SourceId {
    SourceId::new(path.to_string_lossy())
}

/// Project manager for R-Droid
pub struct ProjectManager {
    config_filename: String,
}

impl ProjectManager {
    pub fn new() -> Self {
        Self {
            config_filename: "rdroid.toml".to_string(),
        }
    }

    /// Load project configuration from directory
    pub fn load(&self, project_dir: &Path) -> Result<ProjectConfig> {
        let config_path = project_dir.join(&self.config_filename);

        if !config_path.exists() {
            return Err(anyhow::anyhow!(
                "No rdroid.toml found in {:?}. Is this an R-Droid project?",
                project_dir
            ));
        }

        let content = std::fs::read_to_string(&config_path)
            .context("Failed to read rdroid.toml")?;

        let config: ProjectConfig = toml::from_str(&content)
            .context("Failed to parse rdroid.toml")?;

        debug!("Loaded project {} ({} modules)", config.name, config.modules.len());
        Ok(config)
    }

    /// Save project configuration
    pub fn save(&self, project_dir: &Path, config: &ProjectConfig) -> Result<()> {
        let config_path = project_dir.join(&self.config_filename);

        let content = toml::to_string_pretty(config)
            .context("Failed to serialize project configuration")?;

        std::fs::write(&config_path, content)
            .context("Failed to write rdroid.toml")?;

        Ok(())
    }

    /// Check if a directory contains an R-Droid project
    pub fn is_project(&self, dir: &Path) -> bool {
        dir.join(&self.config_filename).exists()
    }
}

impl Default for ProjectManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"
name = "demo"
framework_symbols = "sdk/R.txt"

[[modules]]
name = "app"
package = "com.example.app"
resource_dirs = ["app/res", "app/debug-res"]
dependencies = ["ui"]
libraries = [{ path = "libs/chart.aar" }]

[[modules]]
name = "ui"
package = "com.example.ui"
resource_dirs = ["ui/res"]
"#;

    #[test]
    fn test_parse_project() {
        let config: ProjectConfig = toml::from_str(PROJECT).unwrap();
        assert_eq!(config.name, "demo");
        assert_eq!(config.default_module().unwrap().name, "app");
        assert!(config.module("ui").unwrap().libraries.is_empty());
        assert!(config.module("missing").is_none());

        let root = Path::new("/work/demo");
        assert_eq!(
            config.framework_symbols_path(root),
            Some(PathBuf::from("/work/demo/sdk/R.txt"))
        );

        let spec = config.module("app").unwrap().to_spec(root);
        assert_eq!(spec.package, "com.example.app");
        assert_eq!(
            spec.sources,
            vec![
                SourceId::new("/work/demo/app/res"),
                SourceId::new("/work/demo/app/debug-res")
            ]
        );
        assert_eq!(
            spec.dependencies,
            vec![
                Dependency::Module("ui".into()),
                Dependency::Library(LibraryLocation::new("/work/demo/libs/chart.aar")),
            ]
        );
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ProjectManager::new();
        assert!(!manager.is_project(dir.path()));
        assert!(manager.load(dir.path()).is_err());

        let config: ProjectConfig = toml::from_str(PROJECT).unwrap();
        manager.save(dir.path(), &config).unwrap();
        assert!(manager.is_project(dir.path()));
        assert_eq!(manager.load(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_invalid_project_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rdroid.toml"), "[[modules]]\nname = 3\n").unwrap();
        let err = ProjectManager::new().load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse rdroid.toml"));
    }
}
