// src/rules/mod.rs

//! Rule tables driving every rewrite
//!
//! A [`RuleSet`] bundles the package renames, version updates, bundle
//! identifier renames, direct overrides and per-format text substitutions.
//! It is built once (from files or programmatically) and never mutated
//! afterwards; workers share it read-only.

pub mod properties;
pub mod rename;

pub use rename::RenameTable;

use crate::config::RuleFiles;
use crate::error::{Error, Result};
use glob::Pattern;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Literal substitutions applied to resources whose name matches `pattern`
#[derive(Debug, Clone)]
pub struct TextRule {
    pattern: Pattern,
    /// Sorted longest key first so overlapping keys resolve deterministically
    substitutions: Vec<(String, String)>,
}

impl TextRule {
    pub fn new(pattern: &str, substitutions: Vec<(String, String)>) -> Result<Self> {
        let pattern = Pattern::new(pattern)
            .map_err(|e| Error::Config(format!("Invalid text rule pattern '{}': {}", pattern, e)))?;
        let mut substitutions: Vec<(String, String)> = substitutions
            .into_iter()
            .filter(|(k, _)| !k.is_empty())
            .collect();
        substitutions.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Ok(Self {
            pattern,
            substitutions,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn matches(&self, resource_name: &str) -> bool {
        self.pattern.matches(resource_name) || self.pattern.matches(file_name(resource_name))
    }

    pub fn substitutions(&self) -> &[(String, String)] {
        &self.substitutions
    }
}

/// The complete, immutable set of rule tables for one run
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    renames: RenameTable,
    versions: BTreeMap<String, String>,
    bundles: BTreeMap<String, String>,
    direct: BTreeMap<String, String>,
    text: Vec<TextRule>,
}

impl RuleSet {
    pub fn builder() -> RuleSetBuilder {
        RuleSetBuilder::default()
    }

    /// Load every configured rule file
    ///
    /// Missing entries in `files` leave the corresponding table empty. Any
    /// malformed line fails the whole load with [`Error::RuleFormat`].
    pub fn load(files: &RuleFiles) -> Result<Self> {
        let mut builder = Self::builder();

        if let Some(path) = &files.renames {
            for (from, to) in load_rule_file(path)? {
                builder = builder.rename(from, to);
            }
        }
        if let Some(path) = &files.versions {
            for (package, range) in load_rule_file(path)? {
                builder = builder.version(package, range);
            }
        }
        if let Some(path) = &files.bundles {
            for (from, to) in load_rule_file(path)? {
                builder = builder.bundle(from, to);
            }
        }
        if let Some(path) = &files.direct {
            for (from, to) in load_rule_file(path)? {
                builder = builder.direct(from, to);
            }
        }
        if let Some(master) = &files.text {
            let base = master.parent().unwrap_or_else(|| Path::new("."));
            for (pattern, rules_path) in load_rule_file(master)? {
                let substitutions = load_rule_file(&base.join(&rules_path))?;
                builder = builder.text(pattern, substitutions);
            }
        }

        let rules = builder.build()?;
        debug!(
            "Loaded rules: {} renames, {} versions, {} bundles, {} direct, {} text",
            rules.renames.len(),
            rules.versions.len(),
            rules.bundles.len(),
            rules.direct.len(),
            rules.text.len()
        );
        Ok(rules)
    }

    pub fn renames(&self) -> &RenameTable {
        &self.renames
    }

    pub fn text_rules(&self) -> &[TextRule] {
        &self.text
    }

    /// Rename a dotted package or type name
    ///
    /// Direct overrides take precedence over prefix renames.
    pub fn rename_package(&self, name: &str) -> Option<String> {
        if let Some(direct) = self.direct.get(name) {
            return (direct != name).then(|| direct.clone());
        }
        self.renames.rename(name, '.')
    }

    /// Rename an internal (slash separated) class or package name
    pub fn rename_binary_name(&self, name: &str) -> Option<String> {
        let dotted = name.replace('/', ".");
        if let Some(direct) = self.direct.get(&dotted) {
            return (direct != &dotted).then(|| direct.replace('.', "/"));
        }
        self.renames.rename(name, '/')
    }

    /// Exact direct override for a string value
    pub fn direct(&self, value: &str) -> Option<&str> {
        self.direct
            .get(value)
            .filter(|replacement| replacement.as_str() != value)
            .map(String::as_str)
    }

    /// Target version range for a (renamed) package
    pub fn version_for(&self, package: &str) -> Option<&str> {
        self.versions.get(package).map(String::as_str)
    }

    /// Replacement for a bundle symbolic name
    pub fn rename_bundle(&self, symbolic_name: &str) -> Option<&str> {
        self.bundles
            .get(symbolic_name)
            .filter(|replacement| replacement.as_str() != symbolic_name)
            .map(String::as_str)
    }

    /// Per-format substitutions for a resource, in rule order
    pub fn text_substitutions_for<'a>(
        &'a self,
        resource_name: &'a str,
    ) -> impl Iterator<Item = &'a (String, String)> + 'a {
        self.text
            .iter()
            .filter(move |rule| rule.matches(resource_name))
            .flat_map(|rule| rule.substitutions.iter())
    }

    /// Rename the package directory of a resource path
    ///
    /// `javax/servlet/Foo.class` becomes `jakarta/servlet/Foo.class`. Class
    /// roots of web and multi-release archives are kept as they are.
    pub fn rename_resource_path(&self, path: &str) -> Option<String> {
        let (root, rest) = split_class_root(path);
        let (dir, file) = rest.rsplit_once('/')?;
        let renamed = self.renames.rename(dir, '/')?;
        Some(format!("{}{}/{}", root, renamed, file))
    }

    /// Apply direct overrides and package renames to free text
    ///
    /// Direct overrides are matched on identifier boundaries, then dotted
    /// and internal package names are renamed. Returns the rewritten bytes
    /// and the number of replacements.
    pub fn rewrite_text(&self, input: &[u8]) -> Option<(Vec<u8>, usize)> {
        let mut current: Option<Vec<u8>> = None;
        let mut total = 0;

        let direct: Vec<(&str, &str)> = {
            let mut pairs: Vec<(&str, &str)> = self
                .direct
                .iter()
                .filter(|(k, v)| !k.is_empty() && k != v)
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
            pairs
        };
        if let Some((out, count)) = substitute(input, &direct, true) {
            current = Some(out);
            total += count;
        }

        for sep in [b'.', b'/'] {
            let source = current.as_deref().unwrap_or(input);
            if let Some((out, count)) = self.renames.rewrite_identifiers(source, sep) {
                current = Some(out);
                total += count;
            }
        }

        current.map(|out| (out, total))
    }
}

/// Builder for an immutable [`RuleSet`]
#[derive(Debug, Default)]
pub struct RuleSetBuilder {
    renames: Vec<(String, String)>,
    versions: BTreeMap<String, String>,
    bundles: BTreeMap<String, String>,
    direct: BTreeMap<String, String>,
    text: Vec<(String, Vec<(String, String)>)>,
}

impl RuleSetBuilder {
    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.renames.push((from.into(), to.into()));
        self
    }

    pub fn version(mut self, package: impl Into<String>, range: impl Into<String>) -> Self {
        self.versions.insert(package.into(), range.into());
        self
    }

    pub fn bundle(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.bundles.insert(from.into(), to.into());
        self
    }

    pub fn direct(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.direct.insert(from.into(), to.into());
        self
    }

    pub fn text(mut self, pattern: impl Into<String>, substitutions: Vec<(String, String)>) -> Self {
        self.text.push((pattern.into(), substitutions));
        self
    }

    pub fn build(self) -> Result<RuleSet> {
        let text = self
            .text
            .into_iter()
            .map(|(pattern, substitutions)| TextRule::new(&pattern, substitutions))
            .collect::<Result<Vec<_>>>()?;

        Ok(RuleSet {
            renames: RenameTable::new(self.renames),
            versions: self.versions,
            bundles: self.bundles,
            direct: self.direct,
            text,
        })
    }
}

/// Replace literal `pairs` (longest key first) in `input`
///
/// With `bounded`, a match must not be glued to identifier characters on
/// either side.
pub(crate) fn substitute(
    input: &[u8],
    pairs: &[(&str, &str)],
    bounded: bool,
) -> Option<(Vec<u8>, usize)> {
    if pairs.is_empty() {
        return None;
    }

    let mut out = Vec::with_capacity(input.len());
    let mut count = 0;
    let mut pos = 0;

    'outer: while pos < input.len() {
        for (key, value) in pairs {
            let key = key.as_bytes();
            if !input[pos..].starts_with(key) {
                continue;
            }
            let end = pos + key.len();
            if bounded {
                let before = pos > 0 && rename::is_identifier_byte(input[pos - 1]);
                let after = end < input.len() && rename::is_identifier_byte(input[end]);
                if before || after {
                    continue;
                }
            }
            out.extend_from_slice(value.as_bytes());
            pos = end;
            count += 1;
            continue 'outer;
        }
        out.push(input[pos]);
        pos += 1;
    }

    (count > 0).then_some((out, count))
}

/// Last path segment of a resource name
pub(crate) fn file_name(resource_name: &str) -> &str {
    resource_name
        .rsplit_once('/')
        .map(|(_, name)| name)
        .unwrap_or(resource_name)
}

/// Split off a leading class root such as `WEB-INF/classes/`
fn split_class_root(path: &str) -> (&str, &str) {
    for root in ["WEB-INF/classes/", "BOOT-INF/classes/"] {
        if let Some(rest) = path.strip_prefix(root) {
            return (&path[..root.len()], rest);
        }
    }

    if let Some(rest) = path.strip_prefix("META-INF/versions/") {
        if let Some((version, inner)) = rest.split_once('/') {
            if !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit()) {
                let root_len = path.len() - inner.len();
                return (&path[..root_len], inner);
            }
        }
    }

    ("", path)
}

fn load_rule_file(path: &Path) -> Result<Vec<(String, String)>> {
    let source = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|e| Error::io(source.clone(), e))?;
    properties::parse(&source, &text)
}
