//! Resource Types
//!
//! The closed set of Android resource types. The declaration order is the
//! ordinal used for dynamic id type bytes and for the nested class order of
//! synthesized `R` classes, so new variants must only ever be appended.

use std::fmt;
use serde::{Deserialize, Serialize};

/// Android resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Anim,
    Animator,
    Array,
    Attr,
    Bool,
    Color,
    Dimen,
    Drawable,
    Font,
    Fraction,
    Id,
    Integer,
    Interpolator,
    Layout,
    Menu,
    Mipmap,
    Navigation,
    Plurals,
    Raw,
    String,
    Style,
    Styleable,
    Transition,
    Xml,
}

impl ResourceType {
    /// Every resource type in ordinal order
    pub const ALL: [ResourceType; 24] = [
        ResourceType::Anim,
        ResourceType::Animator,
        ResourceType::Array,
        ResourceType::Attr,
        ResourceType::Bool,
        ResourceType::Color,
        ResourceType::Dimen,
        ResourceType::Drawable,
        ResourceType::Font,
        ResourceType::Fraction,
        ResourceType::Id,
        ResourceType::Integer,
        ResourceType::Interpolator,
        ResourceType::Layout,
        ResourceType::Menu,
        ResourceType::Mipmap,
        ResourceType::Navigation,
        ResourceType::Plurals,
        ResourceType::Raw,
        ResourceType::String,
        ResourceType::Style,
        ResourceType::Styleable,
        ResourceType::Transition,
        ResourceType::Xml,
    ];

    /// Canonical name; also the `R` inner class name and the `R.txt` type token
    pub fn name(&self) -> &'static str {
        match self {
            ResourceType::Anim => "anim",
            ResourceType::Animator => "animator",
            ResourceType::Array => "array",
            ResourceType::Attr => "attr",
            ResourceType::Bool => "bool",
            ResourceType::Color => "color",
            ResourceType::Dimen => "dimen",
            ResourceType::Drawable => "drawable",
            ResourceType::Font => "font",
            ResourceType::Fraction => "fraction",
            ResourceType::Id => "id",
            ResourceType::Integer => "integer",
            ResourceType::Interpolator => "interpolator",
            ResourceType::Layout => "layout",
            ResourceType::Menu => "menu",
            ResourceType::Mipmap => "mipmap",
            ResourceType::Navigation => "navigation",
            ResourceType::Plurals => "plurals",
            ResourceType::Raw => "raw",
            ResourceType::String => "string",
            ResourceType::Style => "style",
            ResourceType::Styleable => "styleable",
            ResourceType::Transition => "transition",
            ResourceType::Xml => "xml",
        }
    }

    /// Parse a canonical type name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// Stable ordinal of this type
    pub fn ordinal(&self) -> usize {
        *self as usize
    }

    /// Whether resources of this type can be declared inside `values` files
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            ResourceType::Array
                | ResourceType::Attr
                | ResourceType::Bool
                | ResourceType::Color
                | ResourceType::Dimen
                | ResourceType::Drawable
                | ResourceType::Fraction
                | ResourceType::Id
                | ResourceType::Integer
                | ResourceType::Plurals
                | ResourceType::String
                | ResourceType::Style
                | ResourceType::Styleable
        )
    }

    /// Whether a `res/<folder>` directory of this name holds one resource per file
    pub fn is_file_folder_type(&self) -> bool {
        matches!(
            self,
            ResourceType::Anim
                | ResourceType::Animator
                | ResourceType::Color
                | ResourceType::Drawable
                | ResourceType::Font
                | ResourceType::Interpolator
                | ResourceType::Layout
                | ResourceType::Menu
                | ResourceType::Mipmap
                | ResourceType::Navigation
                | ResourceType::Raw
                | ResourceType::Transition
                | ResourceType::Xml
        )
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Convert a resource name into the Java field name used in `R` classes
/// and `R.txt` (`Theme.App` becomes `Theme_App`).
pub fn field_name(resource_name: &str) -> String {
    resource_name
        .chars()
        .map(|c| match c {
            '.' | '-' | ':' => '_',
            other => other,
        })
        .collect()
}
