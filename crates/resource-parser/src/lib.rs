//! Android Resource Parser
//!
//! Turns files on disk into resource items for the repository:
//! - `res/` folder scanning and per-file rescans
//! - values XML, file resources and `@+id/` declarations
//! - `R.txt` symbol tables and manifest packages
//! - exploded and zipped (`.aar`) libraries

use std::path::PathBuf;
use r_droid_core::RDroidError;

pub mod aar;
pub mod files;
pub mod folder;
pub mod manifest;
pub mod symbols;
pub mod values;

pub use aar::ArchiveLibraryLoader;
pub use files::{parse_folder_name, resource_name, FolderKind};
pub use folder::ResourceFolderScanner;
pub use manifest::read_package;
pub use symbols::{parse_symbols, read_symbols};
pub use values::parse_values;

/// Parser errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("XML parsing error in {file:?}: {source}")]
    Xml {
        file: PathBuf,
        #[source]
        source: quick_xml::Error,
    },
    #[error("Invalid resource folder name: {0}")]
    InvalidFolder(String),
    #[error("Invalid R.txt line {line}: {text}")]
    InvalidSymbol { line: usize, text: String },
    #[error("No package declared in {0}")]
    MissingPackage(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl From<ParseError> for RDroidError {
    fn from(error: ParseError) -> Self {
        match error {
            ParseError::Io(e) => RDroidError::Io(e),
            other => RDroidError::Parse(other.to_string()),
        }
    }
}

/// 1-based line of a byte offset
pub(crate) fn line_of(text: &str, offset: usize) -> u32 {
    let end = offset.min(text.len());
    text.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() as u32 + 1
}

/// Offset of the tag starting at or after `position`
pub(crate) fn tag_start(text: &str, position: usize) -> usize {
    let position = position.min(text.len());
    text[position..]
        .find('<')
        .map(|i| position + i)
        .unwrap_or(position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_of() {
        let text = "a\nb\nc";
        assert_eq!(line_of(text, 0), 1);
        assert_eq!(line_of(text, 2), 2);
        assert_eq!(line_of(text, 100), 3);
    }

    #[test]
    fn test_parse_error_converts() {
        let err: RDroidError = ParseError::InvalidFolder("values-zz-bogus".into()).into();
        assert!(matches!(err, RDroidError::Parse(_)));
        assert!(err.is_recoverable());
    }
}
