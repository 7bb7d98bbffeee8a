// src/lib.rs

//! nsmigrate: namespace migration for JVM artifacts
//!
//! Rewrites package namespaces (for example `javax.servlet` to
//! `jakarta.servlet`) inside class files, manifests, service-loader
//! configurations, XML descriptors, properties and other text resources,
//! recursing through jar, war, ear, rar and zip archives.
//!
//! # Architecture
//!
//! - Rule tables: immutable package, version, bundle, direct and text rules
//! - Selection: glob include/exclude per action family, pass-through fallback
//! - Actions: one rewrite strategy per resource kind, resolved by priority
//! - Ledgers: per-resource change records folded into a run report

pub mod action;
pub mod changes;
pub mod config;
mod error;
pub mod rules;
pub mod selector;
pub mod transform;

pub use action::{ActionKind, ActionOutput, ArchiveKind, CompositeAction};
pub use changes::{Changes, Failure, FailureKind, Outcome, Report, RunStatus};
pub use config::{RuleFiles, SelectionConfig, SignaturePolicy, TransformConfig, TransformOptions};
pub use error::{Error, Result};
pub use rules::{RenameTable, RuleSet, RuleSetBuilder, TextRule};
pub use selector::{Selection, SelectionRule, Selector};
pub use transform::{Job, Transformer};
