//! Resource Items
//!
//! One declared resource: a (type, name, qualifiers, source) identity plus its
//! value and where it was declared. Items are immutable; an edit replaces the
//! item wholesale.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use serde::{Deserialize, Serialize};

use crate::configuration::FolderConfiguration;
use crate::resource_type::ResourceType;

/// Stable identity of one resource source (usually a canonical directory path)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Arc<str>);

impl SourceId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Where an item was declared
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourceLocator {
    pub file: PathBuf,
    /// 1-based line, 0 when unknown
    pub line: u32,
    pub byte_offset: u64,
}

impl SourceLocator {
    pub fn file(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            line: 0,
            byte_offset: 0,
        }
    }

    pub fn at(file: impl Into<PathBuf>, line: u32, byte_offset: u64) -> Self {
        Self {
            file: file.into(),
            line,
            byte_offset,
        }
    }
}

/// Reference to an attribute from a `declare-styleable`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttrRef {
    /// Attribute name without the `android:` prefix
    pub name: String,
    /// Whether the attribute lives in the `android` framework namespace
    pub framework: bool,
}

impl AttrRef {
    /// Parse `android:textColor` or `colorAccent`
    pub fn parse(reference: &str) -> Self {
        match reference.strip_prefix("android:") {
            Some(name) => Self {
                name: name.to_string(),
                framework: true,
            },
            None => Self {
                name: reference.to_string(),
                framework: false,
            },
        }
    }
}

/// Value of a resource item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceValue {
    /// Literal text (strings, colors, dimensions, numbers)
    Text(String),
    /// Reference to another resource (`@string/other`, `?attr/colorPrimary`)
    Reference(String),
    /// File-based resource
    File(PathBuf),
    /// `array`, `string-array`, `integer-array`
    Array(Vec<String>),
    /// Quantity strings keyed by quantity (`one`, `other`, ...)
    Plurals(Vec<(String, String)>),
    /// Style with optional parent and `(name, value)` items
    Style {
        parent: Option<String>,
        items: Vec<(String, String)>,
    },
    /// `declare-styleable` with its attrs in declaration order
    Styleable { attrs: Vec<AttrRef> },
    /// Attribute definition with its `format`
    Attr { format: Option<String> },
    /// `@+id/` or `<item type="id">` marker
    Id,
}

impl ResourceValue {
    /// Text or reference for simple values
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.starts_with('@') || value.starts_with('?') {
            ResourceValue::Reference(value)
        } else {
            ResourceValue::Text(value)
        }
    }

    /// Short human readable rendering
    pub fn display_value(&self) -> String {
        match self {
            ResourceValue::Text(text) | ResourceValue::Reference(text) => text.clone(),
            ResourceValue::File(path) => path.display().to_string(),
            ResourceValue::Array(values) => format!("[{}]", values.join(", ")),
            ResourceValue::Plurals(quantities) => quantities
                .iter()
                .map(|(q, v)| format!("{}={}", q, v))
                .collect::<Vec<_>>()
                .join(", "),
            ResourceValue::Style { parent, items } => match parent {
                Some(parent) => format!("style(parent={}, {} items)", parent, items.len()),
                None => format!("style({} items)", items.len()),
            },
            ResourceValue::Styleable { attrs } => format!("styleable({} attrs)", attrs.len()),
            ResourceValue::Attr { format } => {
                format!("attr({})", format.as_deref().unwrap_or("any"))
            }
            ResourceValue::Id => "id".to_string(),
        }
    }
}

/// One declared resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceItem {
    pub resource_type: ResourceType,
    pub name: String,
    pub config: FolderConfiguration,
    pub value: ResourceValue,
    pub source: SourceId,
    pub locator: SourceLocator,
}

impl ResourceItem {
    pub fn new(
        resource_type: ResourceType,
        name: impl Into<String>,
        config: FolderConfiguration,
        value: ResourceValue,
        source: SourceId,
        locator: SourceLocator,
    ) -> Self {
        Self {
            resource_type,
            name: name.into(),
            config,
            value,
            source,
            locator,
        }
    }

    /// Whether `other` denotes the same (type, name, qualifiers, source)
    pub fn same_identity(&self, other: &ResourceItem) -> bool {
        self.resource_type == other.resource_type
            && self.name == other.name
            && self.config == other.config
            && self.source == other.source
    }

    /// `@type/name` form
    pub fn url(&self) -> String {
        format!("@{}/{}", self.resource_type, self.name)
    }
}
