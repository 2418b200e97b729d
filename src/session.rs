//! Preview Session
//!
//! Central owner of the resource state of one opened project:
//! - the repository manager and its id allocator
//! - the R class registry serving class bytes to preview class loaders
//! - the event bus announcing changes
//!
//! Nothing is process-wide. Two sessions never share state and dropping a
//! session releases everything it loaded.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{Context, Result};
use bytes::Bytes;
use parking_lot::RwLock;
use r_droid_core::{AppConfig, Event, EventBus};
use r_droid_rclass::{BinaryClassProvider, ClassRegistry};
use r_droid_resource_parser::{read_symbols, ArchiveLibraryLoader, ResourceFolderScanner};
use r_droid_resources::{
    DeltaStats, Dependency, FolderConfiguration, RepositoryBuild, ResourceItem, ResourceRepositoryManager,
    ResourceType, RuntimeConfig,
};
use tracing::{debug, info, warn};

use crate::project::{source_id, ProjectConfig, ProjectManager};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed,
}

/// Resource state of one opened project
pub struct PreviewSession {
    root: PathBuf,
    project: ProjectConfig,
    config: AppConfig,
    state: RwLock<SessionState>,
    events: Arc<EventBus>,
    manager: Arc<ResourceRepositoryManager>,
    registry: Arc<ClassRegistry>,
    scanners: Vec<ResourceFolderScanner>,
}

impl PreviewSession {
    /// Open the project whose `rdroid.toml` lives in `root`
    pub fn open(root: impl Into<PathBuf>, config: AppConfig) -> Result<Self> {
        let root = root.into();
        let project = ProjectManager::new().load(&root)?;
        Self::with_project(root, project, config)
    }

    /// Open a session for an already loaded project description
    pub fn with_project(root: PathBuf, project: ProjectConfig, config: AppConfig) -> Result<Self> {
        info!("Opening preview session for {} at {:?}", project.name, root);

        let events = Arc::new(EventBus::new());
        let manager = Arc::new(ResourceRepositoryManager::new(
            &config.resources,
            Arc::new(ArchiveLibraryLoader::new()),
            Arc::clone(&events),
        ));
        let registry = Arc::new(
            ClassRegistry::new(Arc::clone(manager.ids()), &config.rclass).with_events(Arc::clone(&events)),
        );

        if let Some(path) = project.framework_symbols_path(&root) {
            let symbols = read_symbols(&path)
                .with_context(|| format!("Failed to read framework symbols {:?}", path))?;
            manager.set_framework_symbols(&symbols);
        }

        let mut scanners: Vec<ResourceFolderScanner> = Vec::new();
        for module in &project.modules {
            for dir in module.resource_paths(&root) {
                let source = source_id(&dir);
                if scanners.iter().all(|s| *s.source() != source) {
                    scanners.push(ResourceFolderScanner::with_source(dir, source));
                }
            }
        }

        let session = Self {
            root,
            project,
            config,
            state: RwLock::new(SessionState::Open),
            events,
            manager,
            registry,
            scanners,
        };

        session.rescan_all()?;
        for module in &session.project.modules {
            session.manager.set_module(module.to_spec(&session.root));
        }

        session.events.emit(Event::SessionOpened {
            project: session.project.name.clone(),
        });
        info!(
            "Session for {} open ({} modules, {} resource directories)",
            session.project.name,
            session.project.modules.len(),
            session.scanners.len()
        );
        Ok(session)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Get the event bus for subscribing to events
    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn manager(&self) -> &Arc<ResourceRepositoryManager> {
        &self.manager
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    /// Class bytes source to hand to a preview class loader
    pub fn class_provider(&self) -> Arc<dyn BinaryClassProvider> {
        Arc::clone(&self.registry) as Arc<dyn BinaryClassProvider>
    }

    /// Module to use when none is given
    pub fn module_or_default<'a>(&'a self, module: Option<&'a str>) -> Result<&'a str> {
        match module {
            Some(name) => Ok(name),
            None => self
                .project
                .default_module()
                .map(|m| m.name.as_str())
                .ok_or_else(|| anyhow::anyhow!("Project {} has no modules", self.project.name)),
        }
    }

    /// Device configuration from qualifiers, the configured default when `None`
    pub fn runtime_config(&self, qualifiers: Option<&str>) -> Result<RuntimeConfig> {
        let qualifiers = qualifiers.unwrap_or(self.config.resources.default_qualifiers.as_str());
        FolderConfiguration::from_qualifiers(qualifiers)
            .ok_or_else(|| anyhow::anyhow!("Invalid device qualifiers '{}'", qualifiers))
    }

    /// Build the repository of `module` and register the R classes it needs
    ///
    /// Registers the module's package, its libraries' packages and those of
    /// its module dependencies. Missing libraries are reported in the build
    /// and logged; they do not fail the call.
    pub fn prepare(&self, module: &str) -> Result<Arc<RepositoryBuild>> {
        self.ensure_open()?;

        let build = self.manager.repository(module)?;
        let mut visited = HashSet::new();
        self.register_build(&build, &mut visited)?;

        for failure in &build.failures {
            warn!("Preview of {} is missing {}: {}", module, failure.dependency, failure.reason);
        }
        Ok(build)
    }

    fn register_build(&self, build: &RepositoryBuild, visited: &mut HashSet<String>) -> Result<()> {
        if !visited.insert(build.module.clone()) {
            return Ok(());
        }

        self.registry.register(&build.package, Arc::clone(&build.repository));
        for (package, repository) in &build.packages {
            self.registry.register(package, Arc::clone(repository));
        }

        let Some(spec) = self.manager.module(&build.module) else {
            return Ok(());
        };
        for dependency in &spec.dependencies {
            if let Dependency::Module(name) = dependency {
                if self.manager.module(name).is_some() {
                    let dep_build = self.manager.repository(name)?;
                    self.register_build(&dep_build, visited)?;
                }
            }
        }
        Ok(())
    }

    /// Resolve a resource of `module` for a device configuration
    pub fn resolve(
        &self,
        module: &str,
        resource_type: ResourceType,
        name: &str,
        config: &RuntimeConfig,
    ) -> Result<Option<Arc<ResourceItem>>> {
        Ok(self.manager.resolve(module, resource_type, name, config)?)
    }

    /// Bytes of a class by binary name, `None` if it is not a known R class
    pub fn find_class_bytes(&self, binary_name: &str) -> Result<Option<Bytes>> {
        Ok(self.registry.find_class_bytes(binary_name)?)
    }

    /// Re-read one changed, added or deleted file
    ///
    /// Returns `None` when the file is outside every resource directory.
    pub fn file_changed(&self, path: &Path) -> Result<Option<DeltaStats>> {
        self.ensure_open()?;

        let Some(scanner) = self.scanners.iter().find(|s| path.starts_with(s.root())) else {
            debug!("Ignoring change outside resource directories: {:?}", path);
            return Ok(None);
        };

        let previous = self
            .manager
            .source(scanner.source())
            .map(|set| set.items_in_file(path))
            .unwrap_or_default();
        let delta = scanner
            .rescan_file(path, previous)
            .with_context(|| format!("Failed to rescan {:?}", path))?;

        Ok(Some(self.manager.apply_delta(delta)))
    }

    /// Full rescan of every resource directory; returns the new id generation
    ///
    /// Registered packages become stale until prepared again.
    pub fn rescan_all(&self) -> Result<u64> {
        self.ensure_open()?;

        let mut generation = self.manager.ids().generation();
        for scanner in &self.scanners {
            let items = scanner
                .scan()
                .with_context(|| format!("Failed to scan {:?}", scanner.root()))?;
            generation = self.manager.replace_source(scanner.source().clone(), items);
        }
        Ok(generation)
    }

    /// Languages used anywhere in the project
    pub fn languages(&self) -> Vec<String> {
        self.manager.languages_in_project()
    }

    /// Close the session and release registered classes
    pub fn close(&self) {
        {
            let mut state = self.state.write();
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }

        self.registry.clear();
        self.events.emit(Event::SessionClosed {
            project: self.project.name.clone(),
        });
        info!("Session for {} closed", self.project.name);
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            SessionState::Open => Ok(()),
            SessionState::Closed => Err(anyhow::anyhow!("Session for {} is closed", self.project.name)),
        }
    }
}

impl std::fmt::Debug for PreviewSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewSession")
            .field("root", &self.root)
            .field("project", &self.project.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use r_droid_rclass::{ClassSummary, RegistrationState};
    use r_droid_resources::ResourceValue;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// App module depending on a `ui` module and an exploded library
    fn project(root: &Path) {
        write(
            root,
            "rdroid.toml",
            r#"
name = "demo"
framework_symbols = "sdk/R.txt"

[[modules]]
name = "app"
package = "com.example.app"
resource_dirs = ["app/res"]
dependencies = ["ui"]
libraries = [{ path = "libs/chart" }]

[[modules]]
name = "ui"
package = "com.example.ui"
resource_dirs = ["ui/res"]
"#,
        );
        write(root, "sdk/R.txt", "int attr textColor 0x01010098\n");
        write(
            root,
            "app/res/values/strings.xml",
            r#"<resources>
    <string name="title">Title</string>
    <string name="shared">From app</string>
    <declare-styleable name="Badge">
        <attr name="badgeColor" format="color"/>
        <attr name="android:textColor"/>
    </declare-styleable>
</resources>"#,
        );
        write(root, "app/res/values-fr/strings.xml", r#"<resources><string name="title">Titre</string></resources>"#);
        write(root, "app/res/values-de/strings.xml", r#"<resources><string name="title">Titel</string></resources>"#);
        write(
            root,
            "app/res/layout/main.xml",
            r#"<LinearLayout xmlns:android="http://schemas.android.com/apk/res/android">
    <TextView android:id="@+id/label"/>
</LinearLayout>"#,
        );
        write(
            root,
            "ui/res/values/strings.xml",
            r#"<resources>
    <string name="shared">From ui</string>
    <string name="ui_only">Ui</string>
</resources>"#,
        );
        write(root, "libs/chart/AndroidManifest.xml", r#"<manifest package="com.example.chart"/>"#);
        write(root, "libs/chart/R.txt", "int string chart_title 0x7f140010\n");
        write(
            root,
            "libs/chart/res/values/values.xml",
            r#"<resources>
    <string name="chart_title">Chart</string>
    <string name="shared">From chart</string>
</resources>"#,
        );
    }

    fn open(root: &Path) -> PreviewSession {
        PreviewSession::open(root, AppConfig::default()).unwrap()
    }

    fn text(item: Option<Arc<ResourceItem>>) -> Option<String> {
        item.map(|i| i.value.display_value())
    }

    #[test]
    fn test_locale_resolution() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path());
        let session = open(dir.path());

        let resolve = |qualifiers: &str| {
            let config = session.runtime_config(Some(qualifiers)).unwrap();
            text(session.resolve("app", ResourceType::String, "title", &config).unwrap())
        };
        assert_eq!(resolve("fr-rFR").as_deref(), Some("Titre"));
        assert_eq!(resolve("de").as_deref(), Some("Titel"));
        assert_eq!(resolve("ja").as_deref(), Some("Title"));

        assert_eq!(session.languages(), vec!["de", "fr"]);
    }

    #[test]
    fn test_module_layers_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path());
        let session = open(dir.path());
        let config = session.runtime_config(None).unwrap();

        assert_eq!(
            text(session.resolve("app", ResourceType::String, "shared", &config).unwrap()).as_deref(),
            Some("From app")
        );
        assert_eq!(
            text(session.resolve("ui", ResourceType::String, "shared", &config).unwrap()).as_deref(),
            Some("From ui")
        );
        assert_eq!(
            text(session.resolve("app", ResourceType::String, "chart_title", &config).unwrap()).as_deref(),
            Some("Chart")
        );
        assert!(session.resolve("app", ResourceType::String, "missing", &config).unwrap().is_none());
        assert!(session.resolve("nope", ResourceType::String, "title", &config).is_err());
    }

    #[test]
    fn test_r_classes_for_all_packages() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path());
        let session = open(dir.path());

        let build = session.prepare("app").unwrap();
        assert!(build.is_complete());
        assert_eq!(
            session.registry().packages(),
            vec!["com.example.app", "com.example.chart", "com.example.ui"]
        );

        let strings = session.find_class_bytes("com.example.app.R$string").unwrap().unwrap();
        let summary = ClassSummary::parse(&strings).unwrap();
        let names: Vec<&str> = summary.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["chart_title", "shared", "title", "ui_only"]);
        // Library ids are used verbatim
        assert_eq!(summary.field("chart_title").unwrap().constant, Some(0x7f140010));

        let chart = session.find_class_bytes("com.example.chart.R$string").unwrap().unwrap();
        let chart = ClassSummary::parse(&chart).unwrap();
        assert_eq!(chart.field("chart_title").unwrap().constant, Some(0x7f140010));

        let ids = session.find_class_bytes("com.example.app.R$id").unwrap().unwrap();
        assert!(ClassSummary::parse(&ids).unwrap().field("label").is_some());

        let styleable = session.find_class_bytes("com.example.app.R$styleable").unwrap().unwrap();
        let styleable = ClassSummary::parse(&styleable).unwrap();
        let arrays = styleable.static_int_arrays().unwrap();
        assert_eq!(arrays["Badge"][0], 0x01010098);
        assert_eq!(styleable.field("Badge_android_textColor").unwrap().constant, Some(0));
        assert_eq!(styleable.field("Badge_badgeColor").unwrap().constant, Some(1));

        assert!(session.find_class_bytes("com.example.other.R").unwrap().is_none());
        assert!(session.find_class_bytes("com.example.app.MainActivity").unwrap().is_none());
    }

    #[test]
    fn test_class_bytes_are_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path());

        let first = open(dir.path());
        let second = open(dir.path());
        first.prepare("app").unwrap();
        second.prepare("app").unwrap();

        for name in ["com.example.app.R", "com.example.app.R$string", "com.example.app.R$styleable"] {
            let a = first.find_class_bytes(name).unwrap().unwrap();
            let b = second.find_class_bytes(name).unwrap().unwrap();
            assert_eq!(a, b, "{} differs between sessions", name);
            assert_eq!(a, first.find_class_bytes(name).unwrap().unwrap());
        }
    }

    #[test]
    fn test_incremental_file_change() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path());
        let session = open(dir.path());
        let subscription = session.events().subscribe();
        let config = session.runtime_config(Some("fr")).unwrap();

        write(
            dir.path(),
            "app/res/values-fr/strings.xml",
            r#"<resources><string name="title">Nouveau</string><string name="extra">Plus</string></resources>"#,
        );
        let stats = session
            .file_changed(&dir.path().join("app/res/values-fr/strings.xml"))
            .unwrap()
            .unwrap();
        assert_eq!((stats.added, stats.removed), (2, 1));
        assert_eq!(
            text(session.resolve("app", ResourceType::String, "title", &config).unwrap()).as_deref(),
            Some("Nouveau")
        );

        fs::remove_file(dir.path().join("app/res/values-de/strings.xml")).unwrap();
        session
            .file_changed(&dir.path().join("app/res/values-de/strings.xml"))
            .unwrap();
        assert_eq!(session.languages(), vec!["fr"]);

        assert!(session.file_changed(&dir.path().join("README.md")).unwrap().is_none());
        assert!(subscription
            .drain()
            .iter()
            .any(|e| matches!(e, Event::SourceChanged { added: 2, removed: 1, .. })));
    }

    #[test]
    fn test_file_edit_keeps_ids_and_registration() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path());
        let session = open(dir.path());
        session.prepare("app").unwrap();
        session.find_class_bytes("com.example.app.R$string").unwrap();
        let before = session.manager().ids().get(ResourceType::String, "title").unwrap();

        write(
            dir.path(),
            "app/res/values/strings.xml",
            r#"<resources>
    <string name="added">New</string>
    <string name="title">Renamed title</string>
    <string name="shared">From app</string>
</resources>"#,
        );
        session
            .file_changed(&dir.path().join("app/res/values/strings.xml"))
            .unwrap();

        assert_eq!(session.registry().status("com.example.app"), RegistrationState::Active);
        assert_eq!(session.manager().ids().get(ResourceType::String, "title"), Some(before));

        let bytes = session.find_class_bytes("com.example.app.R$string").unwrap().unwrap();
        let summary = ClassSummary::parse(&bytes).unwrap();
        assert_eq!(summary.field("title").unwrap().constant, Some(before.as_i32()));
        assert!(summary.field("added").is_some());
    }

    #[test]
    fn test_rescan_makes_registrations_stale() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path());
        let session = open(dir.path());
        session.prepare("app").unwrap();
        assert_eq!(session.registry().status("com.example.app"), RegistrationState::Active);
        session.find_class_bytes("com.example.app.R$string").unwrap();

        let before = session.manager().ids().get(ResourceType::String, "title").unwrap();
        session.rescan_all().unwrap();
        assert_eq!(session.registry().status("com.example.app"), RegistrationState::Stale);
        // Stale ids no longer resolve to a name
        assert!(session.manager().ids().name_for(ResourceType::String, before).is_none());
        assert!(session.find_class_bytes("com.example.app.R$string").unwrap().is_some());

        session.prepare("app").unwrap();
        assert_eq!(session.registry().status("com.example.app"), RegistrationState::Active);
    }

    #[test]
    fn test_missing_library_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path());
        fs::remove_dir_all(dir.path().join("libs/chart")).unwrap();
        let session = open(dir.path());

        let build = session.prepare("app").unwrap();
        assert!(!build.is_complete());
        assert_eq!(build.failures.len(), 1);
        let config = session.runtime_config(None).unwrap();
        assert!(session.resolve("app", ResourceType::String, "chart_title", &config).unwrap().is_none());
        assert!(session.find_class_bytes("com.example.chart.R").unwrap().is_none());
    }

    #[test]
    fn test_concurrent_readers_during_updates() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path());
        let session = open(dir.path());
        session.prepare("app").unwrap();
        let config = session.runtime_config(Some("fr")).unwrap();
        let file = dir.path().join("app/res/values-fr/strings.xml");

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        let title = text(session.resolve("app", ResourceType::String, "title", &config).unwrap());
                        assert!(matches!(title.as_deref(), Some("Titre") | Some("Changé")));
                        let bytes = session.find_class_bytes("com.example.app.R$string").unwrap().unwrap();
                        assert!(ClassSummary::parse(&bytes).unwrap().field("title").is_some());
                    }
                });
            }
            scope.spawn(|| {
                for i in 0..20 {
                    let value = if i % 2 == 0 { "Changé" } else { "Titre" };
                    fs::write(&file, format!(r#"<resources><string name="title">{}</string></resources>"#, value))
                        .unwrap();
                    session.file_changed(&file).unwrap();
                }
            });
        });
    }

    #[test]
    fn test_close() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path());
        let session = open(dir.path());
        let subscription = session.events().subscribe();
        session.prepare("app").unwrap();

        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.registry().packages().is_empty());
        assert!(session.prepare("app").is_err());

        let closed = subscription
            .drain()
            .into_iter()
            .filter(|e| matches!(e, Event::SessionClosed { .. }))
            .count();
        assert_eq!(closed, 1);
    }

    #[test]
    fn test_values_reach_items() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path());
        let session = open(dir.path());
        let config = session.runtime_config(None).unwrap();
        let badge = session
            .resolve("app", ResourceType::Styleable, "Badge", &config)
            .unwrap()
            .unwrap();
        assert!(matches!(&badge.value, ResourceValue::Styleable { attrs } if attrs.len() == 2));
    }
}
