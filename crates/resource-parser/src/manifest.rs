//! Manifest Package
//!
//! Libraries name their `R` package in `AndroidManifest.xml`.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::ParseError;

/// The `package` attribute of the root `<manifest>` element
pub fn read_package(xml: &str) -> Result<Option<String>, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        let event = reader.read_event().map_err(|source| ParseError::Xml {
            file: "AndroidManifest.xml".into(),
            source,
        })?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                if e.name().as_ref() != b"manifest" {
                    return Ok(None);
                }
                for attr in e.attributes().filter_map(|a| a.ok()) {
                    if attr.key.as_ref() == b"package" {
                        let value = attr.unescape_value().map_err(|source| ParseError::Xml {
                            file: "AndroidManifest.xml".into(),
                            source,
                        })?;
                        let package = value.trim();
                        return Ok((!package.is_empty()).then(|| package.to_string()));
                    }
                }
                return Ok(None);
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_package() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<!-- library manifest -->
<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    package="androidx.appcompat">
    <uses-sdk android:minSdkVersion="21"/>
</manifest>"#;
        assert_eq!(read_package(xml).unwrap().as_deref(), Some("androidx.appcompat"));
    }

    #[test]
    fn test_missing_package() {
        assert_eq!(read_package("<manifest/>").unwrap(), None);
        assert_eq!(read_package("<resources package=\"x\"/>").unwrap(), None);
        assert_eq!(read_package("").unwrap(), None);
    }
}
