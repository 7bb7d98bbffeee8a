// src/action/composite.rs

//! Action resolution
//!
//! A [`CompositeAction`] holds a priority-ordered list of action kinds and
//! resolves a resource name to the first kind whose acceptance predicate
//! matches and whose selection rule admits the name.

use crate::action::ActionKind;
use crate::selector::Selector;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct CompositeAction {
    actions: Vec<ActionKind>,
    accepted: Option<ActionKind>,
}

impl Default for CompositeAction {
    fn default() -> Self {
        Self::new(ActionKind::PRIORITY.to_vec())
    }
}

impl CompositeAction {
    /// Create a composite trying `actions` in the given order
    pub fn new(actions: Vec<ActionKind>) -> Self {
        Self {
            actions,
            accepted: None,
        }
    }

    pub fn actions(&self) -> &[ActionKind] {
        &self.actions
    }

    /// Resolve the action for a resource without recording the decision
    ///
    /// `None` means the resource is excluded or unrecognized and must be
    /// copied through.
    pub fn resolve(&self, selector: &Selector, name: &str) -> Option<ActionKind> {
        if selector.is_excluded(name) {
            return None;
        }
        self.actions
            .iter()
            .copied()
            .find(|kind| kind.accepts(name) && selector.selects(*kind, name))
    }

    /// Resolve and remember the accepted action
    pub fn accept_action(&mut self, selector: &Selector, name: &str) -> Option<ActionKind> {
        self.accepted = self.resolve(selector, name);
        trace!(
            "{} -> {}",
            name,
            self.accepted.map(|k| k.as_str()).unwrap_or("pass-through")
        );
        self.accepted
    }

    /// Action chosen by the last [`accept_action`](Self::accept_action) call
    pub fn accepted_action(&self) -> Option<ActionKind> {
        self.accepted
    }
}
