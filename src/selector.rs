// src/selector.rs

//! Resource selection
//!
//! Decides per resource name whether it is excluded, which action family
//! applies, or whether it is simply copied through. Selection never fails:
//! anything unrecognized falls back to pass-through.

use crate::action::{ActionKind, CompositeAction};
use crate::config::{SelectionConfig, TransformConfig};
use crate::error::{Error, Result};
use crate::rules::{RuleSet, file_name};
use glob::Pattern;
use std::collections::HashMap;

/// Text resources handled by the generic text action without configuration
pub const DEFAULT_TEXT_PATTERNS: &[&str] = &[
    "*.jsp", "*.jspx", "*.tag", "*.tagx", "*.tld", "*.txt", "*.json", "*.yaml", "*.yml",
    "*.html", "*.htm",
];

/// Result of classifying one resource name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Explicitly excluded; copied through without inspection
    Excluded,
    /// Handled by the given action family
    Action(ActionKind),
    /// No action accepts the resource; copied through
    PassThrough,
}

/// Include/exclude globs for one action family
///
/// Exclusion wins over inclusion. A name neither set mentions falls back
/// to the family default.
#[derive(Debug, Clone)]
pub struct SelectionRule {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    default_included: bool,
}

impl SelectionRule {
    pub fn new(include: &[String], exclude: &[String], default_included: bool) -> Result<Self> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
            default_included,
        })
    }

    pub fn selects(&self, name: &str) -> bool {
        if matches_any(&self.exclude, name) {
            return false;
        }
        if matches_any(&self.include, name) {
            return true;
        }
        self.default_included
    }
}

/// Resource classifier shared by every action in a run
#[derive(Debug, Clone)]
pub struct Selector {
    exclude: Vec<Pattern>,
    families: HashMap<ActionKind, SelectionRule>,
}

impl Selector {
    /// Build the selector from configuration and the loaded rule tables
    ///
    /// Text rule patterns become includes of the text family, so every
    /// resource with per-format substitutions reaches a rewriter.
    pub fn new(config: &TransformConfig, rules: &RuleSet) -> Result<Self> {
        let configured: HashMap<ActionKind, &SelectionConfig> =
            config.selection_rules()?.into_iter().collect();
        let empty = SelectionConfig::default();

        let mut families = HashMap::new();
        for kind in ActionKind::PRIORITY {
            let selection = configured.get(&kind).copied().unwrap_or(&empty);
            let mut include = selection.include.clone();
            if kind == ActionKind::Text {
                include.extend(DEFAULT_TEXT_PATTERNS.iter().map(|p| p.to_string()));
                include.extend(rules.text_rules().iter().map(|r| r.pattern().to_string()));
            }
            let rule = SelectionRule::new(&include, &selection.exclude, kind.selected_by_default())?;
            families.insert(kind, rule);
        }

        Ok(Self {
            exclude: compile(&config.exclude)?,
            families,
        })
    }

    /// Whether the resource must never be rewritten
    pub fn is_excluded(&self, name: &str) -> bool {
        is_signature_file(name) || matches_any(&self.exclude, name)
    }

    /// Whether the family's selection rule admits the resource
    pub fn selects(&self, kind: ActionKind, name: &str) -> bool {
        self.families
            .get(&kind)
            .map(|rule| rule.selects(name))
            .unwrap_or_else(|| kind.selected_by_default())
    }

    /// Classify a resource using the default action priority
    pub fn classify(&self, name: &str) -> Selection {
        if self.is_excluded(name) {
            return Selection::Excluded;
        }

        CompositeAction::default()
            .resolve(self, name)
            .map(Selection::Action)
            .unwrap_or(Selection::PassThrough)
    }
}

/// Archive signature files: `META-INF/*.SF|*.RSA|*.DSA|*.EC` and `META-INF/SIG-*`
pub fn is_signature_file(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("META-INF/") else {
        return false;
    };
    if rest.contains('/') {
        return false;
    }

    let upper = rest.to_ascii_uppercase();
    upper.starts_with("SIG-")
        || [".SF", ".RSA", ".DSA", ".EC"]
            .iter()
            .any(|ext| upper.ends_with(ext))
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| Error::Config(format!("Invalid glob pattern '{}': {}", p, e)))
        })
        .collect()
}

fn matches_any(patterns: &[Pattern], name: &str) -> bool {
    let file = file_name(name);
    patterns.iter().any(|p| p.matches(name) || p.matches(file))
}
