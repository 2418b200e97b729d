//! Library Loader
//!
//! Loads library resources from an exploded library directory or from an
//! `.aar` archive. Both carry `AndroidManifest.xml` (the package), an
//! optional `R.txt` (fixed ids) and a `res/` tree.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use r_droid_core::{RDroidError, Result};
use r_droid_resources::{LibraryLoader, LibraryLocation, LoadedLibrary, SourceId};
use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::files::items_for_file;
use crate::folder::ResourceFolderScanner;
use crate::manifest::read_package;
use crate::symbols::{parse_symbols, read_symbols};
use crate::ParseError;

/// [`LibraryLoader`] reading libraries from disk
#[derive(Debug, Clone, Default)]
pub struct ArchiveLibraryLoader;

impl ArchiveLibraryLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a library directory or archive
    pub fn load_path(&self, path: &Path) -> std::result::Result<LoadedLibrary, ParseError> {
        if path.is_dir() {
            self.load_directory(path)
        } else {
            self.load_archive(path)
        }
    }

    fn load_directory(&self, root: &Path) -> std::result::Result<LoadedLibrary, ParseError> {
        let manifest = std::fs::read_to_string(root.join("AndroidManifest.xml"))?;
        let package = read_package(&manifest)?
            .ok_or_else(|| ParseError::MissingPackage(root.display().to_string()))?;

        let symbols_path = root.join("R.txt");
        let symbols = if symbols_path.is_file() {
            Some(read_symbols(&symbols_path)?)
        } else {
            None
        };

        let source = SourceId::new(format!("{}/res", root.display()));
        let scanner = ResourceFolderScanner::with_source(root.join("res"), source.clone());
        let items = scanner.scan()?;

        info!("Loaded library directory {:?} ({}, {} items)", root, package, items.len());
        Ok(LoadedLibrary {
            package,
            sources: vec![(source, items)],
            symbols,
        })
    }

    fn load_archive(&self, path: &Path) -> std::result::Result<LoadedLibrary, ParseError> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;

        let manifest = read_entry(&mut archive, "AndroidManifest.xml")?
            .ok_or_else(|| ParseError::MissingPackage(path.display().to_string()))?;
        let package = read_package(&manifest)?
            .ok_or_else(|| ParseError::MissingPackage(path.display().to_string()))?;

        let symbols = match read_entry(&mut archive, "R.txt")? {
            Some(text) => Some(parse_symbols(&text)?),
            None => None,
        };

        let mut names: Vec<String> = archive
            .file_names()
            .filter(|n| n.starts_with("res/") && !n.ends_with('/'))
            .map(|n| n.to_string())
            .collect();
        names.sort();

        let source = SourceId::new(format!("{}!/res", path.display()));
        let mut items = Vec::new();

        for name in names {
            let mut parts = name.splitn(3, '/').skip(1);
            let (Some(folder), Some(file_name)) = (parts.next(), parts.next()) else {
                continue;
            };
            if file_name.contains('/') {
                debug!("Ignoring nested archive entry {}", name);
                continue;
            }

            let entry_path = PathBuf::from(format!("{}!/{}", path.display(), name));
            let result = items_for_file(folder, file_name, &entry_path, &source, || {
                read_entry(&mut archive, &name)?.ok_or_else(|| {
                    ParseError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, name.clone()))
                })
            });
            match result {
                Ok(file_items) => items.extend(file_items),
                Err(e) => warn!("Skipping {} in {:?}: {}", name, path, e),
            }
        }

        info!("Loaded library archive {:?} ({}, {} items)", path, package, items.len());
        Ok(LoadedLibrary {
            package,
            sources: vec![(source, items)],
            symbols,
        })
    }
}

impl LibraryLoader for ArchiveLibraryLoader {
    fn load(&self, location: &LibraryLocation) -> Result<LoadedLibrary> {
        self.load_path(Path::new(location.as_str()))
            .map_err(|e| RDroidError::Library {
                location: location.to_string(),
                reason: e.to_string(),
            })
    }
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> std::result::Result<Option<String>, ParseError> {
    match archive.by_name(name) {
        Ok(mut entry) => {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            Ok(Some(content))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
