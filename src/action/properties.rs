// src/action/properties.rs

//! `.properties` rewriter
//!
//! Keys are left alone; values have direct overrides and package names
//! rewritten. Resource bundles living in a package directory are renamed
//! along with the package.

use crate::action::{ActionKind, ActionOutput};
use crate::changes::Changes;
use crate::error::Result;
use crate::rules::RuleSet;

pub fn apply(rules: &RuleSet, name: &str, data: &[u8]) -> Result<ActionOutput> {
    let mut changes = Changes::new(name, Some(ActionKind::Properties));
    let output_name = rules
        .rename_resource_path(name)
        .unwrap_or_else(|| name.to_string());
    changes.set_output_name(&output_name);

    let mut out = Vec::with_capacity(data.len());
    let mut continued = false;

    for line in data.split_inclusive(|&b| b == b'\n') {
        let logical_start = !continued;
        continued = ends_with_continuation(line);

        let trimmed = trim_start(line);
        let blank = trimmed.iter().all(u8::is_ascii_whitespace);
        if logical_start && (blank || is_comment(trimmed)) {
            // Comments never continue onto the next line
            continued = false;
            out.extend_from_slice(line);
            continue;
        }

        // Continuation lines belong to the value of the previous line
        let value_start = if logical_start { value_offset(line) } else { 0 };

        match rules.rewrite_text(&line[value_start..]) {
            Some((value, _)) => {
                out.extend_from_slice(&line[..value_start]);
                out.extend_from_slice(&value);
                changes.add_changed_provider();
            }
            None => {
                out.extend_from_slice(line);
                changes.add_unchanged_provider();
            }
        }
    }

    Ok(ActionOutput {
        name: output_name,
        data: out,
        changes,
    })
}

fn trim_start(line: &[u8]) -> &[u8] {
    let skip = line
        .iter()
        .take_while(|b| **b == b' ' || **b == b'\t' || **b == 0x0c)
        .count();
    &line[skip..]
}

fn is_comment(line: &[u8]) -> bool {
    matches!(line.first(), Some(b'#') | Some(b'!'))
}

/// Offset of the first value byte
///
/// The key ends at the first unescaped whitespace, `=` or `:`. The separator
/// is any run of whitespace with at most one `=` or `:` inside it.
fn value_offset(line: &[u8]) -> usize {
    let is_space = |b: u8| b == b' ' || b == b'\t' || b == 0x0c;
    let start = line.len() - trim_start(line).len();

    let mut escaped = false;
    let mut pos = line.len();
    for (i, &b) in line.iter().enumerate().skip(start) {
        match b {
            _ if escaped => escaped = false,
            b'\\' => escaped = true,
            b'=' | b':' | b'\r' | b'\n' => {
                pos = i;
                break;
            }
            _ if is_space(b) => {
                pos = i;
                break;
            }
            _ => {}
        }
    }

    while pos < line.len() && is_space(line[pos]) {
        pos += 1;
    }
    if pos < line.len() && matches!(line[pos], b'=' | b':') {
        pos += 1;
    }
    pos
}

/// Odd number of trailing backslashes before the line break
fn ends_with_continuation(line: &[u8]) -> bool {
    let content = line
        .strip_suffix(b"\n")
        .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
        .unwrap_or(line);
    content.iter().rev().take_while(|b| **b == b'\\').count() % 2 == 1
}
