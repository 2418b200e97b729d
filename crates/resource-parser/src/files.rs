//! Resource Files
//!
//! Folder name parsing, file based resources and `@+id/` declarations in
//! XML files.

use std::collections::HashSet;
use std::path::Path;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use r_droid_resources::{
    FolderConfiguration, ResourceItem, ResourceType, ResourceValue, SourceId, SourceLocator,
};
use tracing::debug;

use crate::values::parse_values;
use crate::{line_of, tag_start, ParseError};

/// What a `res/` sub folder holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderKind {
    /// `values*`: XML files declaring many resources
    Values,
    /// One resource per file
    Files(ResourceType),
}

impl FolderKind {
    /// Whether XML files in this folder may declare ids with `@+id/`
    pub fn declares_ids(&self) -> bool {
        matches!(
            self,
            FolderKind::Files(
                ResourceType::Layout
                    | ResourceType::Menu
                    | ResourceType::Navigation
                    | ResourceType::Xml
                    | ResourceType::Transition
            )
        )
    }
}

/// Parse a folder name such as `values-fr` or `drawable-xhdpi-v21`
pub fn parse_folder_name(folder: &str) -> Option<(FolderKind, FolderConfiguration)> {
    let (type_name, qualifiers) = match folder.split_once('-') {
        Some((type_name, qualifiers)) => (type_name, qualifiers),
        None => (folder, ""),
    };

    let kind = if type_name == "values" {
        FolderKind::Values
    } else {
        let resource_type = ResourceType::from_name(type_name)?;
        if !resource_type.is_file_folder_type() {
            return None;
        }
        FolderKind::Files(resource_type)
    };

    let config = FolderConfiguration::from_qualifiers(qualifiers)?;
    Some((kind, config))
}

/// Resource name of a file: the file name without its extension
///
/// Nine-patch images (`.9.png`) lose both suffixes. Hidden files have no name.
pub fn resource_name(file_name: &str) -> Option<String> {
    if file_name.starts_with('.') || file_name.is_empty() {
        return None;
    }
    if let Some(stem) = file_name.strip_suffix(".9.png") {
        return Some(stem.to_string());
    }
    let stem = match file_name.find('.') {
        Some(index) => &file_name[..index],
        None => file_name,
    };
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Ids declared with `@+id/name` anywhere in an XML file, first declaration wins
pub fn scan_xml_ids(
    xml: &str,
    file: &Path,
    config: &FolderConfiguration,
    source: &SourceId,
) -> Result<Vec<ResourceItem>, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    loop {
        let position = reader.buffer_position();
        let event = reader.read_event().map_err(|source| ParseError::Xml {
            file: file.to_path_buf(),
            source,
        })?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let offset = tag_start(xml, position);
                for name in declared_ids(e) {
                    if seen.insert(name.clone()) {
                        items.push(ResourceItem::new(
                            ResourceType::Id,
                            name,
                            config.clone(),
                            ResourceValue::Id,
                            source.clone(),
                            SourceLocator::at(file, line_of(xml, offset), offset as u64),
                        ));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}

fn declared_ids(e: &BytesStart) -> Vec<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .filter_map(|attr| {
            let value = attr.unescape_value().ok()?;
            value
                .strip_prefix("@+id/")
                .filter(|name| !name.is_empty())
                .map(|name| name.to_string())
        })
        .collect()
}

/// Items contributed by one file of a `res/` folder
///
/// `read_xml` is only called for XML content that has to be parsed.
pub fn items_for_file(
    folder: &str,
    file_name: &str,
    path: &Path,
    source: &SourceId,
    read_xml: impl FnOnce() -> Result<String, ParseError>,
) -> Result<Vec<ResourceItem>, ParseError> {
    let (kind, config) =
        parse_folder_name(folder).ok_or_else(|| ParseError::InvalidFolder(folder.to_string()))?;
    let is_xml = file_name.ends_with(".xml");

    match kind {
        FolderKind::Values => {
            if !is_xml {
                debug!("Ignoring non XML file {:?} in values folder", path);
                return Ok(Vec::new());
            }
            parse_values(&read_xml()?, path, &config, source)
        }
        FolderKind::Files(resource_type) => {
            let Some(name) = resource_name(file_name) else {
                return Ok(Vec::new());
            };
            let mut items = vec![ResourceItem::new(
                resource_type,
                name,
                config.clone(),
                ResourceValue::File(path.to_path_buf()),
                source.clone(),
                SourceLocator::file(path),
            )];
            if is_xml && kind.declares_ids() {
                items.extend(scan_xml_ids(&read_xml()?, path, &config, source)?);
            }
            Ok(items)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_folder_name() {
        let (kind, config) = parse_folder_name("values-fr").unwrap();
        assert_eq!(kind, FolderKind::Values);
        assert_eq!(config.to_string(), "fr");

        let (kind, config) = parse_folder_name("drawable-xhdpi-v21").unwrap();
        assert_eq!(kind, FolderKind::Files(ResourceType::Drawable));
        assert_eq!(config.api_level, Some(21));

        assert!(parse_folder_name("layout").unwrap().1.is_default());
        assert!(parse_folder_name("strings").is_none());
        assert!(parse_folder_name("dimen").is_none());
        assert!(parse_folder_name("values-notaqualifier").is_none());
    }

    #[test]
    fn test_resource_name() {
        assert_eq!(resource_name("ic_launcher.png").as_deref(), Some("ic_launcher"));
        assert_eq!(resource_name("button_bg.9.png").as_deref(), Some("button_bg"));
        assert_eq!(resource_name("activity_main.xml").as_deref(), Some("activity_main"));
        assert_eq!(resource_name(".DS_Store"), None);
    }

    #[test]
    fn test_scan_xml_ids_dedupes_per_file() {
        let xml = r#"<LinearLayout xmlns:android="http://schemas.android.com/apk/res/android">
    <TextView android:id="@+id/title"/>
    <Button android:id="@+id/ok" android:layout_below="@+id/title"/>
    <View android:id="@id/existing"/>
</LinearLayout>"#;
        let items = scan_xml_ids(
            xml,
            Path::new("res/layout/main.xml"),
            &FolderConfiguration::new(),
            &SourceId::new("res"),
        )
        .unwrap();

        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["title", "ok"]);
        assert_eq!(items[0].locator.line, 2);
    }

    #[test]
    fn test_layout_file_items() {
        let items = items_for_file(
            "layout-land",
            "main.xml",
            Path::new("res/layout-land/main.xml"),
            &SourceId::new("res"),
            || Ok(r#"<FrameLayout android:id="@+id/root"/>"#.to_string()),
        )
        .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].resource_type, ResourceType::Layout);
        assert_eq!(items[0].name, "main");
        assert_eq!(items[1].resource_type, ResourceType::Id);
        assert_eq!(items[1].config.to_string(), "land");
    }

    #[test]
    fn test_drawable_file_is_not_read() {
        let items = items_for_file(
            "drawable",
            "shape.xml",
            Path::new("res/drawable/shape.xml"),
            &SourceId::new("res"),
            || panic!("drawables are not scanned for ids"),
        )
        .unwrap();
        assert_eq!(items.len(), 1);
    }
}
