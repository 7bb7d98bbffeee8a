// src/action/text.rs

//! Generic text rewriter
//!
//! Fallback for JSPs, tag library descriptors and other plain text. Each
//! line first takes the per-format substitutions configured for the
//! resource name, then direct overrides and package renames. A
//! `package;version="..."` clause of a renamed package takes the version
//! range configured for its new name.

use crate::action::{ActionKind, ActionOutput};
use crate::changes::Changes;
use crate::error::Result;
use crate::rules::{RuleSet, substitute};

pub fn apply(rules: &RuleSet, name: &str, data: &[u8]) -> Result<ActionOutput> {
    let substitutions: Vec<(&str, &str)> = rules
        .text_substitutions_for(name)
        .map(|(from, to)| (from.as_str(), to.as_str()))
        .collect();

    let mut changes = Changes::new(name, Some(ActionKind::Text));
    let mut out = Vec::with_capacity(data.len());

    for line in data.split_inclusive(|&b| b == b'\n') {
        if line.iter().all(u8::is_ascii_whitespace) {
            out.extend_from_slice(line);
            continue;
        }

        let mut rewritten = std::str::from_utf8(line)
            .ok()
            .and_then(|text| rewrite_versions(rules, text))
            .map(String::into_bytes);
        if let Some((substituted, _)) =
            substitute(rewritten.as_deref().unwrap_or(line), &substitutions, false)
        {
            rewritten = Some(substituted);
        }
        if let Some((renamed, _)) = rules.rewrite_text(rewritten.as_deref().unwrap_or(line)) {
            rewritten = Some(renamed);
        }

        match rewritten {
            Some(rewritten) if rewritten != line => {
                out.extend_from_slice(&rewritten);
                changes.add_changed_provider();
            }
            _ => {
                out.extend_from_slice(line);
                changes.add_unchanged_provider();
            }
        }
    }

    Ok(ActionOutput {
        name: name.to_string(),
        data: out,
        changes,
    })
}

/// Replace the range of each `package;version="..."` clause whose package is renamed
fn rewrite_versions(rules: &RuleSet, line: &str) -> Option<String> {
    const MARKER: &str = ";version=\"";

    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    let mut changed = false;

    while let Some(pos) = rest.find(MARKER) {
        let head = &rest[..pos];
        let package_start = head
            .char_indices()
            .rev()
            .find(|(_, c)| !(c.is_alphanumeric() || matches!(c, '.' | '_' | '$')))
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let value_start = pos + MARKER.len();
        let Some(value_len) = rest[value_start..].find('"') else {
            break;
        };
        let value = &rest[value_start..value_start + value_len];

        let range = rules
            .rename_package(&head[package_start..])
            .and_then(|new| rules.version_for(&new));
        out.push_str(&rest[..value_start]);
        match range {
            Some(range) if range != value => {
                out.push_str(range);
                changed = true;
            }
            _ => out.push_str(value),
        }
        rest = &rest[value_start + value_len..];
    }

    out.push_str(rest);
    changed.then_some(out)
}
