// src/action/service.rs

//! Service-loader configuration rewriter
//!
//! A file under `META-INF/services/` is named after the service type and
//! lists one provider type per line. Both the file name and every provider
//! line are renamed. When two entries end up with the same name their
//! contents are merged with [`merge`].

use crate::action::{ActionKind, ActionOutput};
use crate::changes::Changes;
use crate::error::{Error, Result};
use crate::rules::RuleSet;
use std::collections::HashSet;
use tracing::debug;

const SERVICES_DIR: &str = "META-INF/services/";

/// Service type encoded in a service configuration path
pub fn service_type(name: &str) -> Option<&str> {
    let service = name.strip_prefix(SERVICES_DIR)?;
    (!service.is_empty() && !service.contains('/')).then_some(service)
}

pub fn apply(rules: &RuleSet, name: &str, data: &[u8]) -> Result<ActionOutput> {
    let service = service_type(name)
        .ok_or_else(|| Error::malformed(name, "not a service configuration path"))?;
    let text = std::str::from_utf8(data)
        .map_err(|e| Error::malformed(name, format!("service configuration is not UTF-8: {}", e)))?;

    let mut changes = Changes::new(name, Some(ActionKind::ServiceConfig));
    let output_name = match rules.rename_package(service) {
        Some(renamed) => format!("{}{}", SERVICES_DIR, renamed),
        None => name.to_string(),
    };
    changes.set_output_name(&output_name);

    let mut out = String::with_capacity(text.len() + 16);
    for line in text.split_inclusive('\n') {
        let provider = provider_span(line);
        if provider.is_empty() {
            out.push_str(line);
            continue;
        }
        let start = line.len() - line.trim_start().len();
        match rules.rename_package(provider) {
            Some(renamed) => {
                out.push_str(&line[..start]);
                out.push_str(&renamed);
                out.push_str(&line[start + provider.len()..]);
                changes.add_changed_provider();
            }
            None => {
                out.push_str(line);
                changes.add_unchanged_provider();
            }
        }
    }

    if changes.has_resource_name_changes() {
        debug!("Service configuration {} renamed to {}", name, output_name);
    }

    Ok(ActionOutput {
        name: output_name,
        data: out.into_bytes(),
        changes,
    })
}

/// Provider type named on a line, without comment and surrounding blanks
fn provider_span(line: &str) -> &str {
    let content = match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    };
    content.trim()
}

/// Merge two configurations for the same service
///
/// Lines of `existing` are kept in order; provider lines of `incoming` that
/// `existing` does not already list are appended.
pub fn merge(existing: &[u8], incoming: &[u8]) -> Vec<u8> {
    let existing_text = String::from_utf8_lossy(existing);
    let incoming_text = String::from_utf8_lossy(incoming);

    let mut seen: HashSet<&str> = existing_text
        .lines()
        .map(provider_span)
        .filter(|p| !p.is_empty())
        .collect();

    let mut out = existing.to_vec();
    if !out.is_empty() && !out.ends_with(b"\n") {
        out.push(b'\n');
    }
    for line in incoming_text.lines() {
        let provider = provider_span(line);
        if !provider.is_empty() && seen.insert(provider) {
            out.extend_from_slice(provider.as_bytes());
            out.push(b'\n');
        }
    }
    out
}
