// src/config.rs

//! Run configuration
//!
//! Loaded from TOML. Rule file paths are resolved relative to the
//! directory holding the configuration file.

use crate::action::ActionKind;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default bound on nested archive depth
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// What to do with signature files inside archives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignaturePolicy {
    /// Copy signature files through untouched
    #[default]
    Keep,
    /// Remove signature files from the output archive
    Strip,
}

/// Locations of the rule files, one per rule category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleFiles {
    #[serde(default)]
    pub renames: Option<PathBuf>,
    #[serde(default)]
    pub versions: Option<PathBuf>,
    #[serde(default)]
    pub bundles: Option<PathBuf>,
    #[serde(default)]
    pub direct: Option<PathBuf>,
    /// Master file mapping resource globs to text substitution files
    #[serde(default)]
    pub text: Option<PathBuf>,
}

impl RuleFiles {
    fn resolve(&mut self, base: &Path) {
        for path in [
            &mut self.renames,
            &mut self.versions,
            &mut self.bundles,
            &mut self.direct,
            &mut self.text,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Tunables for the transformation engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Maximum number of archive levels below the root resource
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default)]
    pub signature_policy: SignaturePolicy,

    /// Transform archive entries and batch inputs on the rayon pool
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_parallel() -> bool {
    true
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            signature_policy: SignaturePolicy::default(),
            parallel: true,
        }
    }
}

/// Include/exclude globs for one action family
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Resources never rewritten (copied through)
    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default)]
    pub rules: RuleFiles,

    #[serde(default)]
    pub options: TransformOptions,

    /// Per action family selection, keyed by family name (`class`, `xml`, ...)
    #[serde(default)]
    pub selection: BTreeMap<String, SelectionConfig>,
}

impl TransformConfig {
    /// Load a configuration file, resolving rule paths against its directory
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path.display().to_string(), e))?;
        let mut config = Self::parse(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.rules.resolve(base);
        Ok(config)
    }

    /// Parse configuration from TOML text without touching the filesystem
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Failed to parse configuration: {}", e)))?;
        config.selection_rules()?;
        Ok(config)
    }

    /// Selection entries keyed by action family
    pub fn selection_rules(&self) -> Result<Vec<(ActionKind, &SelectionConfig)>> {
        self.selection
            .iter()
            .map(|(family, selection)| {
                ActionKind::parse(family)
                    .map(|kind| (kind, selection))
                    .ok_or_else(|| Error::Config(format!("Unknown action family '{}'", family)))
            })
            .collect()
    }
}
