//! R.txt Symbol Tables
//!
//! Reads the symbol file shipped with compiled libraries:
//!
//! ```text
//! int string app_name 0x7f140000
//! int[] styleable ChartView { 0x010100af, 0x7f030001 }
//! int styleable ChartView_android_gravity 0
//! ```

use std::path::Path;
use r_droid_resources::{ResourceType, SymbolTable};
use tracing::debug;

use crate::ParseError;

/// Parse the content of an `R.txt` file
pub fn parse_symbols(text: &str) -> Result<SymbolTable, ParseError> {
    let mut table = SymbolTable::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let invalid = || ParseError::InvalidSymbol {
            line: index + 1,
            text: raw.to_string(),
        };

        let mut parts = line.splitn(4, char::is_whitespace);
        let kind = parts.next().ok_or_else(invalid)?;
        let type_name = parts.next().ok_or_else(invalid)?;
        let name = parts.next().ok_or_else(invalid)?;
        let value = parts.next().ok_or_else(invalid)?.trim();

        let Some(resource_type) = ResourceType::from_name(type_name) else {
            debug!("Ignoring symbol of unknown type '{}' on line {}", type_name, index + 1);
            continue;
        };

        match kind {
            "int" => table.insert(resource_type, name, parse_int(value).ok_or_else(invalid)?),
            "int[]" => {
                let inner = value
                    .strip_prefix('{')
                    .and_then(|v| v.strip_suffix('}'))
                    .ok_or_else(invalid)?;
                let ids = inner
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| parse_int(v).ok_or_else(invalid))
                    .collect::<Result<Vec<u32>, _>>()?;
                table.insert_styleable(name, ids);
            }
            _ => return Err(invalid()),
        }
    }

    Ok(table)
}

/// Read and parse an `R.txt` file
pub fn read_symbols(path: &Path) -> Result<SymbolTable, ParseError> {
    let text = std::fs::read_to_string(path)?;
    parse_symbols(&text)
}

fn parse_int(value: &str) -> Option<u32> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
