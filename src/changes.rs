// src/changes.rs

//! Change ledgers
//!
//! Every action invocation owns one [`Changes`] ledger recording what it
//! rewrote. Container ledgers hold the ledgers of their entries. Ledgers
//! are folded into a [`Report`] once the owning work unit has finished;
//! nothing is shared between concurrent invocations.

use crate::action::ActionKind;
use crate::error::Error;
use std::fmt;

/// Final state of one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Changed,
    Unchanged,
    /// Rewriting failed; the resource was copied through verbatim
    Failed,
}

/// Category of an isolated resource failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Malformed,
    RecursionLimit,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

/// Per-resource record of changed and unchanged providers
///
/// A provider is one rule-matchable unit: a class reference, a manifest
/// clause, an XML text node, a service provider line.
#[derive(Debug, Clone, Default)]
pub struct Changes {
    input_name: String,
    output_name: String,
    kind: Option<ActionKind>,
    changed_providers: usize,
    unchanged_providers: usize,
    failure: Option<Failure>,
    /// Ledgers of archive entries, in original order
    entries: Vec<Changes>,
    removed_entries: usize,
    merged_entries: usize,
}

impl Changes {
    pub fn new(name: &str, kind: Option<ActionKind>) -> Self {
        Self {
            input_name: name.to_string(),
            output_name: name.to_string(),
            kind,
            ..Self::default()
        }
    }

    /// Reset counters, failure and entry ledgers before reuse
    pub fn clear(&mut self) {
        self.changed_providers = 0;
        self.unchanged_providers = 0;
        self.failure = None;
        self.entries.clear();
        self.removed_entries = 0;
        self.merged_entries = 0;
        self.output_name = self.input_name.clone();
    }

    pub fn set_output_name(&mut self, output: &str) {
        self.output_name = output.to_string();
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    /// Action that produced this ledger; `None` for pass-through copies
    pub fn kind(&self) -> Option<ActionKind> {
        self.kind
    }

    pub fn add_changed_provider(&mut self) {
        self.changed_providers += 1;
    }

    pub fn add_unchanged_provider(&mut self) {
        self.unchanged_providers += 1;
    }

    pub fn changed_providers(&self) -> usize {
        self.changed_providers
    }

    pub fn unchanged_providers(&self) -> usize {
        self.unchanged_providers
    }

    pub fn has_resource_name_changes(&self) -> bool {
        self.input_name != self.output_name
    }

    /// True iff content was rewritten, as opposed to a path-only rename
    pub fn has_non_resource_name_changes(&self) -> bool {
        self.changed_providers > 0
            || self.removed_entries > 0
            || self.merged_entries > 0
            || self.entries.iter().any(Changes::has_changes)
    }

    pub fn has_changes(&self) -> bool {
        self.has_resource_name_changes() || self.has_non_resource_name_changes()
    }

    /// Record an isolated failure; provider counts are discarded
    pub fn mark_failed(&mut self, error: &Error) {
        let kind = match error {
            Error::MalformedResource { .. } => FailureKind::Malformed,
            Error::RecursionLimit { .. } => FailureKind::RecursionLimit,
            _ => FailureKind::Other,
        };
        self.clear();
        self.failure = Some(Failure {
            kind,
            message: error.to_string(),
        });
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn outcome(&self) -> Outcome {
        if self.is_failed() {
            Outcome::Failed
        } else if self.has_changes() {
            Outcome::Changed
        } else {
            Outcome::Unchanged
        }
    }

    pub fn add_entry(&mut self, entry: Changes) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[Changes] {
        &self.entries
    }

    pub fn add_removed_entry(&mut self) {
        self.removed_entries += 1;
    }

    pub fn add_merged_entry(&mut self) {
        self.merged_entries += 1;
    }

    pub fn removed_entries(&self) -> usize {
        self.removed_entries
    }

    pub fn merged_entries(&self) -> usize {
        self.merged_entries
    }

    pub fn renamed_entries(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.has_resource_name_changes())
            .count()
    }

    /// Changed providers of this resource and all nested entries
    pub fn total_changed_providers(&self) -> usize {
        self.changed_providers
            + self
                .entries
                .iter()
                .map(Changes::total_changed_providers)
                .sum::<usize>()
    }

    pub fn total_unchanged_providers(&self) -> usize {
        self.unchanged_providers
            + self
                .entries
                .iter()
                .map(Changes::total_unchanged_providers)
                .sum::<usize>()
    }
}

impl fmt::Display for Changes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Resource name [ {} ] [ {} ]",
            self.input_name, self.output_name
        )?;
        if let Some(failure) = &self.failure {
            return writeln!(f, "Failed [ {} ]", failure.message);
        }
        if self.entries.is_empty() {
            writeln!(
                f,
                "Replacements [ {} ] Unchanged [ {} ]",
                self.changed_providers, self.unchanged_providers
            )
        } else {
            writeln!(
                f,
                "Entries [ {} ] Renamed [ {} ] Removed [ {} ] Merged [ {} ] Replacements [ {} ]",
                self.entries.len(),
                self.renamed_entries(),
                self.removed_entries,
                self.merged_entries,
                self.total_changed_providers()
            )
        }
    }
}

/// Overall result of a run, as surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// At least one resource changed and none failed
    Changed,
    /// Nothing changed and nothing failed
    Unchanged,
    /// One or more resources failed and were copied through
    ResourceFailure,
}

/// Aggregate of ledgers across every processed resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Report {
    pub resources: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Total substitutions (changed providers)
    pub replacements: usize,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a ledger and all of its nested entry ledgers into the report
    pub fn record(&mut self, changes: &Changes) {
        self.resources += 1;
        match changes.outcome() {
            Outcome::Changed => self.changed += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Failed => self.failed += 1,
        }
        self.replacements += changes.changed_providers();

        for entry in changes.entries() {
            self.record(entry);
        }
    }

    pub fn merge(&mut self, other: &Report) {
        self.resources += other.resources;
        self.changed += other.changed;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
        self.replacements += other.replacements;
    }

    pub fn status(&self) -> RunStatus {
        if self.failed > 0 {
            RunStatus::ResourceFailure
        } else if self.changed > 0 {
            RunStatus::Changed
        } else {
            RunStatus::Unchanged
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Resources [ {} ]", self.resources)?;
        writeln!(f, "  Changed   [ {} ]", self.changed)?;
        writeln!(f, "  Unchanged [ {} ]", self.unchanged)?;
        writeln!(f, "  Failed    [ {} ]", self.failed)?;
        writeln!(f, "Replacements [ {} ]", self.replacements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_counters_are_disjoint() {
        let mut changes = Changes::new("a.properties", Some(ActionKind::Properties));
        changes.add_changed_provider();
        changes.add_unchanged_provider();
        changes.add_unchanged_provider();
        assert_eq!(changes.changed_providers(), 1);
        assert_eq!(changes.unchanged_providers(), 2);
        assert!(changes.has_non_resource_name_changes());
    }

    #[test]
    fn test_rename_only_is_not_a_content_change() {
        let mut changes = Changes::new("javax/servlet/Foo.class", Some(ActionKind::Class));
        changes.set_output_name("jakarta/servlet/Foo.class");
        changes.add_unchanged_provider();
        assert!(changes.has_resource_name_changes());
        assert!(!changes.has_non_resource_name_changes());
        assert_eq!(changes.outcome(), Outcome::Changed);
    }

    #[test]
    fn test_clear_resets_counters() {
        let mut changes = Changes::new("x.xml", Some(ActionKind::Xml));
        changes.set_output_name("y.xml");
        changes.add_changed_provider();
        changes.add_entry(Changes::new("inner", None));
        changes.clear();
        assert_eq!(changes.changed_providers(), 0);
        assert!(changes.entries().is_empty());
        assert!(!changes.has_changes());
        assert_eq!(changes.outcome(), Outcome::Unchanged);
    }

    #[test]
    fn test_failure_is_distinct_from_unchanged() {
        let mut changes = Changes::new("bad.class", Some(ActionKind::Class));
        changes.add_changed_provider();
        changes.mark_failed(&Error::malformed("bad.class", "bad magic"));
        assert_eq!(changes.outcome(), Outcome::Failed);
        assert_eq!(changes.changed_providers(), 0);
        assert_eq!(changes.failure().unwrap().kind, FailureKind::Malformed);
    }

    #[test]
    fn test_display_is_pure() {
        let mut changes = Changes::new("a.xml", Some(ActionKind::Xml));
        changes.add_changed_provider();
        let first = changes.to_string();
        let second = changes.to_string();
        assert_eq!(first, second);
        assert_eq!(changes.changed_providers(), 1);
        assert!(first.contains("Replacements [ 1 ]"));
    }

    #[test]
    fn test_report_recurses_into_entries() {
        let mut container = Changes::new("app.jar", Some(ActionKind::Archive));

        let mut changed = Changes::new("a/A.class", Some(ActionKind::Class));
        changed.add_changed_provider();
        changed.add_changed_provider();
        container.add_entry(changed);
        container.add_entry(Changes::new("logo.png", None));

        let mut failed = Changes::new("a/Bad.class", Some(ActionKind::Class));
        failed.mark_failed(&Error::malformed("a/Bad.class", "truncated"));
        container.add_entry(failed);

        let mut report = Report::new();
        report.record(&container);

        assert_eq!(report.resources, 4);
        assert_eq!(report.changed, 2);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.replacements, 2);
        assert_eq!(report.status(), RunStatus::ResourceFailure);
        assert_eq!(container.total_changed_providers(), 2);
    }

    #[test]
    fn test_status() {
        assert_eq!(Report::new().status(), RunStatus::Unchanged);
        let report = Report {
            resources: 1,
            changed: 1,
            ..Report::default()
        };
        assert_eq!(report.status(), RunStatus::Changed);
    }
}
