// src/rules/rename.rs

//! Package rename table with longest dot-bounded prefix lookup
//!
//! A rule `javax.servlet=jakarta.servlet` renames the package itself and
//! every name below it (`javax.servlet.http.Cookie`), but never a sibling
//! that merely shares characters (`javax.servletx.Foo`).

use std::collections::HashMap;

/// Mapping from old package prefixes to new ones
#[derive(Debug, Clone, Default)]
pub struct RenameTable {
    rules: HashMap<String, String>,
    /// Segment count of the longest rule key, bounds the prefix search
    max_segments: usize,
}

impl RenameTable {
    /// Build a table from `(old, new)` pairs; a repeated key keeps the last value
    pub fn new<I, K, V>(rules: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let rules: HashMap<String, String> = rules
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let max_segments = rules.keys().map(|k| k.split('.').count()).max().unwrap_or(0);

        Self {
            rules,
            max_segments,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rename a `sep`-delimited name by its longest matching package prefix
    ///
    /// Returns `None` when no rule matches or the rule maps the name onto
    /// itself. The unmatched remainder is retained verbatim.
    pub fn rename(&self, name: &str, sep: char) -> Option<String> {
        if self.is_empty() || name.is_empty() {
            return None;
        }

        let segments: Vec<&str> = name.split(sep).collect();
        let longest = segments.len().min(self.max_segments);

        for k in (1..=longest).rev() {
            let key = segments[..k].join(".");
            let Some(replacement) = self.rules.get(&key) else {
                continue;
            };

            let mut renamed = if sep == '.' {
                replacement.clone()
            } else {
                replacement.replace('.', &sep.to_string())
            };
            for segment in &segments[k..] {
                renamed.push(sep);
                renamed.push_str(segment);
            }

            return (renamed != name).then_some(renamed);
        }

        None
    }

    /// Rewrite every package-qualified identifier embedded in `input`
    ///
    /// Candidates are maximal runs of identifier bytes joined by `sep`
    /// (`b'.'` for source names, `b'/'` for internal names). A run directly
    /// preceded by the other separator is skipped so that `a/javax.servlet`
    /// style fragments of paths or URLs are left alone in dotted mode.
    /// Returns the rewritten bytes and the number of replaced identifiers,
    /// or `None` if nothing changed.
    pub fn rewrite_identifiers(&self, input: &[u8], sep: u8) -> Option<(Vec<u8>, usize)> {
        if self.rules.is_empty() {
            return None;
        }

        let other = if sep == b'.' { b'/' } else { b'.' };
        let mut out = Vec::with_capacity(input.len());
        let mut count = 0;
        let mut pos = 0;

        while pos < input.len() {
            if !is_identifier_byte(input[pos]) {
                out.push(input[pos]);
                pos += 1;
                continue;
            }

            let start = pos;
            while pos < input.len() && (is_identifier_byte(input[pos]) || input[pos] == sep) {
                pos += 1;
            }
            let run = &input[start..pos];

            let renamed = if start > 0 && input[start - 1] == other {
                None
            } else {
                std::str::from_utf8(run)
                    .ok()
                    .and_then(|s| self.rename(s, sep as char))
            };

            match renamed {
                Some(renamed) => {
                    out.extend_from_slice(renamed.as_bytes());
                    count += 1;
                }
                None => out.extend_from_slice(run),
            }
        }

        (count > 0).then_some((out, count))
    }
}

/// Bytes that may appear inside a Java identifier (ASCII subset)
pub fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}
