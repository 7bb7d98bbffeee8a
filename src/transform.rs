// src/transform.rs

//! Transformation engine entry point
//!
//! A [`Transformer`] owns the immutable rule tables, the selector and the
//! action resolution order for one run. Every resource goes through
//! [`Transformer::transform`]: the composite action picks the strategy,
//! the strategy rewrites the bytes, and resource-scoped failures are
//! recorded in the ledger while the original bytes are passed through.

use crate::action::{self, ActionKind, ActionOutput, CompositeAction};
use crate::changes::Report;
use crate::config::{TransformConfig, TransformOptions};
use crate::error::{Error, Result};
use crate::rules::RuleSet;
use crate::selector::Selector;
use rayon::prelude::*;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// One top-level input/output pair of a batch run
#[derive(Debug, Clone)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Job {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transformer {
    rules: Arc<RuleSet>,
    selector: Selector,
    composite: CompositeAction,
    options: TransformOptions,
}

impl Transformer {
    /// Create a transformer from loaded rules and configuration
    ///
    /// Fails only on invalid selection patterns.
    pub fn new(rules: RuleSet, config: &TransformConfig) -> Result<Self> {
        let selector = Selector::new(config, &rules)?;
        Ok(Self {
            rules: Arc::new(rules),
            selector,
            composite: CompositeAction::default(),
            options: config.options.clone(),
        })
    }

    /// Load the rule files named by the configuration and build a transformer
    pub fn from_config(config: &TransformConfig) -> Result<Self> {
        let rules = RuleSet::load(&config.rules)?;
        Self::new(rules, config)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    /// Action that would handle a resource, `None` for pass-through
    pub fn resolve(&self, name: &str) -> Option<ActionKind> {
        self.composite.resolve(&self.selector, name)
    }

    /// Transform a root resource
    ///
    /// Never fails: malformed resources and nesting overflows are flagged
    /// in the returned ledger and the input is passed through unchanged.
    pub fn transform(&self, name: &str, data: &[u8]) -> ActionOutput {
        self.transform_at_depth(name, data, 0)
    }

    /// Transform a resource found `depth` archive levels below the root
    pub fn transform_at_depth(&self, name: &str, data: &[u8], depth: usize) -> ActionOutput {
        let Some(kind) = self.resolve(name) else {
            return ActionOutput::unchanged(name, data, None);
        };
        debug!("{} -> {} (depth {})", name, kind, depth);

        match self.apply(kind, name, data, depth) {
            Ok(output) => output,
            Err(e) => {
                warn!("Copying {} unchanged: {}", name, e);
                let mut output = ActionOutput::unchanged(name, data, Some(kind));
                output.changes.mark_failed(&e);
                output
            }
        }
    }

    fn apply(&self, kind: ActionKind, name: &str, data: &[u8], depth: usize) -> Result<ActionOutput> {
        match kind {
            ActionKind::Class => action::class::apply(&self.rules, name, data),
            ActionKind::Manifest => action::manifest::apply(&self.rules, name, data),
            ActionKind::ServiceConfig => action::service::apply(&self.rules, name, data),
            ActionKind::Properties => action::properties::apply(&self.rules, name, data),
            ActionKind::Xml => action::xml::apply(&self.rules, name, data),
            ActionKind::Archive => action::container::apply(self, name, data, depth),
            ActionKind::Text => action::text::apply(&self.rules, name, data),
        }
    }

    /// Read a resource from `input`, transform it and write it to `output`
    ///
    /// Read and write failures are fatal; rewrite failures are not.
    pub fn transform_stream<R: Read, W: Write>(
        &self,
        name: &str,
        mut input: R,
        mut output: W,
    ) -> Result<ActionOutput> {
        let mut data = Vec::new();
        input
            .read_to_end(&mut data)
            .map_err(|e| Error::io(name, e))?;
        let result = self.transform(name, &data);
        output
            .write_all(&result.data)
            .and_then(|_| output.flush())
            .map_err(|e| Error::io(name, e))?;
        Ok(result)
    }

    /// Transform a file, replacing `output` atomically
    pub fn transform_file(&self, input: &Path, output: &Path) -> Result<ActionOutput> {
        let data = fs::read(input).map_err(|e| Error::io(input.display().to_string(), e))?;
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.display().to_string());

        let result = self.transform(&name, &data);

        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let output_err = |e| Error::io(output.display().to_string(), e);
        fs::create_dir_all(dir).map_err(output_err)?;
        let mut temp = NamedTempFile::new_in(dir).map_err(output_err)?;
        temp.write_all(&result.data).map_err(output_err)?;
        temp.as_file().sync_all().map_err(output_err)?;
        temp.persist(output).map_err(|e| output_err(e.error))?;

        info!(
            "Transformed {} -> {}: {} replacements{}",
            input.display(),
            output.display(),
            result.changes.total_changed_providers(),
            if result.changes.is_failed() { " (failed, copied unchanged)" } else { "" }
        );
        Ok(result)
    }

    /// Transform independent top-level files, in parallel when enabled
    ///
    /// The first fatal error aborts the batch.
    pub fn transform_batch(&self, jobs: &[Job]) -> Result<Report> {
        let run = |job: &Job| self.transform_file(&job.input, &job.output);
        let results: Vec<Result<ActionOutput>> = if self.options.parallel {
            jobs.par_iter().map(run).collect()
        } else {
            jobs.iter().map(run).collect()
        };

        let mut report = Report::new();
        for result in results {
            report.record(&result?.changes);
        }

        info!(
            "Batch of {} resources: {} changed, {} unchanged, {} failed",
            jobs.len(),
            report.changed,
            report.unchanged,
            report.failed
        );
        Ok(report)
    }
}
