// src/action/mod.rs

//! Rewrite actions, one per resource kind
//!
//! The set of resource kinds is closed: [`ActionKind`] enumerates every
//! strategy and the acceptance table below decides by resource name which
//! strategies may apply. Leaf actions are pure functions of their input
//! bytes and the rule tables; the container action recurses through the
//! [`Transformer`](crate::Transformer).

pub mod class;
pub mod composite;
pub mod container;
pub mod manifest;
pub mod properties;
pub mod service;
pub mod signature;
pub mod text;
pub mod xml;

pub use composite::CompositeAction;

use crate::changes::Changes;
use crate::rules::file_name;

/// Resource kinds with a dedicated rewrite strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    /// Binary class files
    Class,
    /// `META-INF/MANIFEST.MF`
    Manifest,
    /// `META-INF/services/<type>` provider configuration
    ServiceConfig,
    /// `.properties` resources
    Properties,
    /// XML descriptors
    Xml,
    /// Zip-family archives (jar, war, ear, rar, zip)
    Archive,
    /// Fallback for recognizable text resources
    Text,
}

/// Acceptance predicate for one action kind
struct Acceptance {
    kind: ActionKind,
    accepts: fn(&str) -> bool,
}

/// Priority-ordered acceptance table: most specific kinds first
const ACCEPTANCE: &[Acceptance] = &[
    Acceptance {
        kind: ActionKind::Class,
        accepts: |name| has_extension(name, "class"),
    },
    Acceptance {
        kind: ActionKind::Manifest,
        accepts: |name| file_name(name).eq_ignore_ascii_case("MANIFEST.MF"),
    },
    Acceptance {
        kind: ActionKind::ServiceConfig,
        accepts: |name| service::service_type(name).is_some(),
    },
    Acceptance {
        kind: ActionKind::Properties,
        accepts: |name| has_extension(name, "properties"),
    },
    Acceptance {
        kind: ActionKind::Xml,
        accepts: |name| has_extension(name, "xml"),
    },
    Acceptance {
        kind: ActionKind::Archive,
        accepts: |name| ArchiveKind::from_name(name).is_some(),
    },
    Acceptance {
        kind: ActionKind::Text,
        accepts: |_| true,
    },
];

impl ActionKind {
    /// Every kind in resolution order
    pub const PRIORITY: [ActionKind; 7] = [
        Self::Class,
        Self::Manifest,
        Self::ServiceConfig,
        Self::Properties,
        Self::Xml,
        Self::Archive,
        Self::Text,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Manifest => "manifest",
            Self::ServiceConfig => "service_config",
            Self::Properties => "properties",
            Self::Xml => "xml",
            Self::Archive => "archive",
            Self::Text => "text",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "class" => Some(Self::Class),
            "manifest" => Some(Self::Manifest),
            "service_config" => Some(Self::ServiceConfig),
            "properties" => Some(Self::Properties),
            "xml" => Some(Self::Xml),
            "archive" => Some(Self::Archive),
            "text" => Some(Self::Text),
            _ => None,
        }
    }

    /// Name-based acceptance, before selection rules are consulted
    pub fn accepts(self, name: &str) -> bool {
        ACCEPTANCE
            .iter()
            .find(|a| a.kind == self)
            .is_some_and(|a| (a.accepts)(name))
    }

    /// Whether a name no selection rule mentions is handled by this kind
    ///
    /// Generic text only handles names matched by an include pattern.
    pub fn selected_by_default(self) -> bool {
        !matches!(self, Self::Text)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Zip-family container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Jar,
    War,
    Ear,
    Rar,
    Zip,
}

impl ArchiveKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let (_, ext) = file_name(name).rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "jar" => Some(Self::Jar),
            "war" => Some(Self::War),
            "ear" => Some(Self::Ear),
            "rar" => Some(Self::Rar),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jar => "jar",
            Self::War => "war",
            Self::Ear => "ear",
            Self::Rar => "rar",
            Self::Zip => "zip",
        }
    }
}

/// A rewritten (or passed-through) resource with its ledger
#[derive(Debug, Clone)]
pub struct ActionOutput {
    pub name: String,
    pub data: Vec<u8>,
    pub changes: Changes,
}

impl ActionOutput {
    /// Output for a resource copied through untouched
    pub fn unchanged(name: &str, data: &[u8], kind: Option<ActionKind>) -> Self {
        Self {
            name: name.to_string(),
            data: data.to_vec(),
            changes: Changes::new(name, kind),
        }
    }
}

fn has_extension(name: &str, ext: &str) -> bool {
    file_name(name)
        .rsplit_once('.')
        .is_some_and(|(stem, e)| !stem.is_empty() && e.eq_ignore_ascii_case(ext))
}
