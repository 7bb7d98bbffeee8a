// src/action/manifest.rs

//! Manifest rewriter
//!
//! Rewrites the OSGi and launcher headers of `META-INF/MANIFEST.MF`.
//! Headers are unfolded from their 72-byte continuation lines, rewritten
//! clause by clause and folded again. Headers that do not change are
//! copied with their original line breaks so the output diffs cleanly.

use crate::action::{ActionKind, ActionOutput};
use crate::changes::Changes;
use crate::error::{Error, Result};
use crate::rules::RuleSet;
use tracing::debug;

/// Maximum manifest line length in bytes, excluding the line break
const MAX_LINE: usize = 72;

/// Package headers whose clauses carry version ranges
const VERSIONED_HEADERS: &[&str] = &["Import-Package", "Export-Package", "DynamicImport-Package"];

/// Headers whose clauses may embed package or type names anywhere
const CLAUSE_HEADERS: &[&str] = &[
    "Private-Package",
    "Ignore-Package",
    "Require-Capability",
    "Provide-Capability",
    "Main-Class",
    "Premain-Class",
    "Agent-Class",
    "Launcher-Agent-Class",
    "Bundle-Activator",
];

/// Headers naming bundles by symbolic name
const BUNDLE_HEADERS: &[&str] = &["Bundle-SymbolicName", "Fragment-Host", "Require-Bundle"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderKind {
    Versioned,
    Clauses,
    Bundle,
}

impl HeaderKind {
    fn of(key: &str) -> Option<Self> {
        let is = |names: &[&str]| names.iter().any(|n| n.eq_ignore_ascii_case(key));
        if is(VERSIONED_HEADERS) {
            Some(Self::Versioned)
        } else if is(CLAUSE_HEADERS) {
            Some(Self::Clauses)
        } else if is(BUNDLE_HEADERS) {
            Some(Self::Bundle)
        } else {
            None
        }
    }
}

/// One unfolded manifest header or a line kept verbatim
#[derive(Debug)]
enum Block<'a> {
    Raw(&'a str),
    Header {
        raw: &'a str,
        key: &'a str,
        value: String,
        eol: &'a str,
    },
}

pub fn apply(rules: &RuleSet, name: &str, data: &[u8]) -> Result<ActionOutput> {
    let text = std::str::from_utf8(data)
        .map_err(|e| Error::malformed(name, format!("manifest is not UTF-8: {}", e)))?;
    let mut changes = Changes::new(name, Some(ActionKind::Manifest));
    let mut out = String::with_capacity(text.len() + 64);

    for block in parse_blocks(text) {
        match block {
            Block::Raw(raw) => out.push_str(raw),
            Block::Header {
                raw,
                key,
                value,
                eol,
            } => {
                let rewritten = HeaderKind::of(key)
                    .and_then(|kind| rewrite_header(rules, kind, &value, &mut changes));
                match rewritten {
                    Some(value) => out.push_str(&fold(&format!("{}: {}", key, value), eol)),
                    None => out.push_str(raw),
                }
            }
        }
    }

    debug!(
        "Manifest {}: {} clauses changed, {} unchanged",
        name,
        changes.changed_providers(),
        changes.unchanged_providers()
    );

    Ok(ActionOutput {
        name: name.to_string(),
        data: out.into_bytes(),
        changes,
    })
}

/// Split manifest text into headers (with continuations) and raw lines
fn parse_blocks(text: &str) -> Vec<Block<'_>> {
    let mut blocks = Vec::new();
    // (start offset, key, unfolded value, eol of first line)
    let mut current: Option<(usize, &str, String, &str)> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let (content, eol) = split_eol(line);

        if let Some(continuation) = content.strip_prefix(' ') {
            if let Some((_, _, value, _)) = current.as_mut() {
                value.push_str(continuation);
                continue;
            }
        }

        if let Some((header_start, key, value, header_eol)) = current.take() {
            blocks.push(Block::Header {
                raw: &text[header_start..start],
                key,
                value,
                eol: header_eol,
            });
        }

        match content.split_once(':') {
            Some((key, value)) if !key.is_empty() && !key.starts_with(' ') => {
                let value = value.strip_prefix(' ').unwrap_or(value);
                current = Some((start, key, value.to_string(), eol));
            }
            _ => blocks.push(Block::Raw(line)),
        }
    }

    if let Some((header_start, key, value, eol)) = current {
        blocks.push(Block::Header {
            raw: &text[header_start..],
            key,
            value,
            eol,
        });
    }

    blocks
}

fn split_eol(line: &str) -> (&str, &str) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = line.strip_suffix('\n') {
        (content, "\n")
    } else {
        (line, "")
    }
}

/// Fold a header line into 72-byte physical lines
fn fold(line: &str, eol: &str) -> String {
    let brk = if eol.is_empty() { "\n" } else { eol };
    let mut out = String::with_capacity(line.len() + line.len() / MAX_LINE * 3 + 2);
    let mut rest = line;
    let mut limit = MAX_LINE;

    loop {
        if rest.len() <= limit {
            out.push_str(rest);
            out.push_str(eol);
            return out;
        }
        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        out.push_str(&rest[..cut]);
        out.push_str(brk);
        out.push(' ');
        rest = &rest[cut..];
        limit = MAX_LINE - 1;
    }
}

/// Rewrite a header value clause by clause; `None` if nothing changed
fn rewrite_header(
    rules: &RuleSet,
    kind: HeaderKind,
    value: &str,
    changes: &mut Changes,
) -> Option<String> {
    let mut changed = false;
    let clauses: Vec<String> = split_top_level(value, ',')
        .into_iter()
        .map(|clause| {
            if clause.trim().is_empty() {
                return clause.to_string();
            }
            let rewritten = match kind {
                HeaderKind::Versioned => rewrite_package_clause(rules, clause),
                HeaderKind::Clauses => rules
                    .rewrite_text(clause.as_bytes())
                    .and_then(|(bytes, _)| String::from_utf8(bytes).ok()),
                HeaderKind::Bundle => rewrite_bundle_clause(rules, clause),
            };
            match rewritten {
                Some(rewritten) => {
                    changes.add_changed_provider();
                    changed = true;
                    rewritten
                }
                None => {
                    changes.add_unchanged_provider();
                    clause.to_string()
                }
            }
        })
        .collect();

    changed.then(|| clauses.join(","))
}

/// Rewrite `pkg;pkg;attr=value;dir:=value`
///
/// Package names are renamed; a `version` attribute of a clause whose
/// package was renamed takes the version range configured for the new
/// package. Other attribute values have embedded package names renamed.
fn rewrite_package_clause(rules: &RuleSet, clause: &str) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut renamed: Vec<String> = Vec::new();
    let mut changed = false;

    for part in split_top_level(clause, ';') {
        let trimmed = part.trim();
        if trimmed.contains('=') {
            parts.push(part.to_string());
            continue;
        }
        match rules.rename_package(trimmed) {
            Some(new) => {
                parts.push(part.replacen(trimmed, &new, 1));
                renamed.push(new);
                changed = true;
            }
            None => parts.push(part.to_string()),
        }
    }

    let range = renamed.iter().find_map(|package| rules.version_for(package));
    for part in parts.iter_mut() {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let attribute = key.trim().trim_end_matches(':');

        let replacement = if attribute == "version" {
            range
                .map(|range| format!("{}=\"{}\"", key, range))
                .filter(|replacement| replacement != part)
        } else {
            rules
                .renames()
                .rewrite_identifiers(value.as_bytes(), b'.')
                .and_then(|(bytes, _)| String::from_utf8(bytes).ok())
                .map(|value| format!("{}={}", key, value))
        };

        if let Some(replacement) = replacement {
            *part = replacement;
            changed = true;
        }
    }

    changed.then(|| parts.join(";"))
}

/// Rename the symbolic name leading a bundle clause
fn rewrite_bundle_clause(rules: &RuleSet, clause: &str) -> Option<String> {
    let (head, tail) = match clause.find(';') {
        Some(pos) => clause.split_at(pos),
        None => (clause, ""),
    };
    let symbolic_name = head.trim();
    let renamed = rules.rename_bundle(symbolic_name)?;
    Some(format!("{}{}", head.replacen(symbolic_name, renamed, 1), tail))
}

/// Split on `sep` outside double quotes
pub(crate) fn split_top_level(value: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                parts.push(&value[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}
