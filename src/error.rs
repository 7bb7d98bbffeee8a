// src/error.rs

//! Error taxonomy for namespace migration
//!
//! Rule and configuration errors are fatal and abort a run before any
//! resource is processed. Resource errors are isolated: the affected
//! resource is copied through verbatim and flagged in its ledger.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A rule file line could not be parsed
    #[error("Invalid rule in {file} at line {line}: {message}")]
    RuleFormat {
        file: String,
        line: usize,
        message: String,
    },

    /// A resource could not be parsed (class file, archive, XML, manifest)
    #[error("Malformed resource {resource}: {reason}")]
    MalformedResource { resource: String, reason: String },

    /// Nested archives went deeper than the configured bound
    #[error("Nested archive {resource} exceeds maximum depth of {limit}")]
    RecursionLimit { resource: String, limit: usize },

    /// Invalid configuration or selection pattern
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O failure on a named root input or output
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    IoError(#[from] io::Error),
}

impl Error {
    pub fn malformed(resource: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedResource {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error affects a single resource rather than the whole run
    pub fn is_resource_scoped(&self) -> bool {
        matches!(
            self,
            Self::MalformedResource { .. } | Self::RecursionLimit { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
