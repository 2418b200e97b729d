//! Resource Folder Scanner
//!
//! Full scans of a `res/` directory and single file rescans producing
//! deltas for the repository.

use std::path::{Path, PathBuf};
use r_droid_resources::{ResourceItem, SourceDelta, SourceId};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::files::items_for_file;
use crate::ParseError;

/// Scanner of one `res/` directory
#[derive(Debug, Clone)]
pub struct ResourceFolderScanner {
    root: PathBuf,
    source: SourceId,
}

impl ResourceFolderScanner {
    /// The source id is the directory path
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let source = SourceId::new(root.to_string_lossy());
        Self { root, source }
    }

    pub fn with_source(root: impl Into<PathBuf>, source: SourceId) -> Self {
        Self {
            root: root.into(),
            source,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// Parse every file of the directory in path order
    ///
    /// Files that cannot be parsed are skipped with a warning. A missing
    /// directory yields no items.
    pub fn scan(&self) -> Result<Vec<ResourceItem>, ParseError> {
        if !self.root.is_dir() {
            debug!("Resource directory {:?} does not exist", self.root);
            return Ok(Vec::new());
        }

        let mut items = Vec::new();
        let mut files = 0;

        for entry in WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            files += 1;
            match self.parse_file(entry.path()) {
                Ok(file_items) => items.extend(file_items),
                Err(e) => warn!("Skipping {:?}: {}", entry.path(), e),
            }
        }

        info!("Scanned {:?}: {} files, {} items", self.root, files, items.len());
        Ok(items)
    }

    /// Items declared by one file of this directory
    pub fn parse_file(&self, path: &Path) -> Result<Vec<ResourceItem>, ParseError> {
        let folder = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .ok_or_else(|| ParseError::InvalidFolder(path.display().to_string()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ParseError::InvalidFolder(path.display().to_string()))?;

        items_for_file(folder, file_name, path, &self.source, || {
            Ok(std::fs::read_to_string(path)?)
        })
    }

    /// Delta replacing what `previous` recorded for `path` with its current content
    ///
    /// A deleted file removes everything it declared.
    pub fn rescan_file(&self, path: &Path, previous: Vec<ResourceItem>) -> Result<SourceDelta, ParseError> {
        let added = if path.is_file() {
            self.parse_file(path)?
        } else {
            Vec::new()
        };

        debug!(
            "Rescanned {:?}: {} removed, {} added",
            path,
            previous.len(),
            added.len()
        );

        Ok(SourceDelta {
            source: self.source.clone(),
            added,
            removed: previous,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use r_droid_resources::{ResourceType, ResourceValue, SourceResourceSet};

    fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_scan_directory() {
        let dir = tempfile::tempdir().unwrap();
        let res = dir.path().join("res");
        write(&res, "values/strings.xml", r#"<resources><string name="title">Hello</string></resources>"#);
        write(&res, "values-fr/strings.xml", r#"<resources><string name="title">Bonjour</string></resources>"#);
        write(&res, "layout/main.xml", r#"<FrameLayout android:id="@+id/root"/>"#);
        write(&res, "drawable-hdpi/icon.png", "png");
        write(&res, "bogus-folder/file.xml", "<x/>");
        write(&res, "values/broken.xml", "<resources><string name=\"a\">");

        let scanner = ResourceFolderScanner::new(&res);
        let items = scanner.scan().unwrap();

        let summary: Vec<String> = items
            .iter()
            .map(|i| format!("{}/{}[{}]", i.resource_type, i.name, i.config))
            .collect();
        assert_eq!(
            summary,
            vec!["drawable/icon[hdpi]", "layout/main[]", "id/root[]", "string/title[]", "string/title[fr]"]
        );
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = ResourceFolderScanner::new(dir.path().join("nope"));
        assert!(scanner.scan().unwrap().is_empty());
    }

    #[test]
    fn test_rescan_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let res = dir.path().join("res");
        let file = write(&res, "values/strings.xml", r#"<resources><string name="title">Hello</string></resources>"#);

        let scanner = ResourceFolderScanner::new(&res);
        let mut set = SourceResourceSet::with_items(scanner.source().clone(), scanner.scan().unwrap());

        fs::write(&file, r#"<resources><string name="title">Hi</string><string name="extra">E</string></resources>"#).unwrap();
        let delta = scanner.rescan_file(&file, set.items_in_file(&file)).unwrap();
        let stats = set.apply(delta);
        assert_eq!((stats.added, stats.removed), (2, 1));
        assert_eq!(set.get(ResourceType::String, "title")[0].value, ResourceValue::text("Hi"));

        fs::remove_file(&file).unwrap();
        let delta = scanner.rescan_file(&file, set.items_in_file(&file)).unwrap();
        set.apply(delta);
        assert!(set.is_empty());
    }
}
