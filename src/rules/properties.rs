// src/rules/properties.rs

//! Line-oriented `key=value` rule file parser

use crate::error::{Error, Result};

/// Parse rule file text into ordered `(key, value)` pairs
///
/// `#` and `!` start comment lines, blank lines are skipped and the key is
/// split from the value at the first `=`. Both sides are trimmed.
pub fn parse(source: &str, text: &str) -> Result<Vec<(String, String)>> {
    let mut entries = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(Error::RuleFormat {
                file: source.to_string(),
                line: index + 1,
                message: format!("expected key=value, found '{}'", line),
            });
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(Error::RuleFormat {
                file: source.to_string(),
                line: index + 1,
                message: "empty key".to_string(),
            });
        }

        entries.push((key.to_string(), value.trim().to_string()));
    }

    Ok(entries)
}
