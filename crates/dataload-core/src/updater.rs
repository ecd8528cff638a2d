//! Deferred and unsaved-reference updaters
//!
//! A [`DeferredUpdater`] is the set of mutations a load state cannot apply
//! until a declared id becomes resolvable. An [`UnsavedRefUpdater`] records
//! which nodes of a load state hold a reference to an object that has not
//! been saved yet, so they can be rewritten once it is.

use crate::state::StateId;
use dataload_model::ObjectRef;
use std::fmt::{self, Display, Formatter};

/// Identity of a deferred updater within a load
///
/// Allocated from a per-tree sequence, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UpdaterKey(pub(crate) u64);

impl Display for UpdaterKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A mutation waiting on a declared id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredAction {
    /// Set a reference node to the object declared with the id
    SetReference { node: String },

    /// Add the object declared with the id to a collection
    AddChild { collection: String },

    /// Add a child load state to a collection once it is complete
    ///
    /// The id is one of the child's own outstanding ids.
    AttachChild { collection: String, child: StateId },
}

impl DeferredAction {
    /// Node the action mutates
    #[must_use]
    pub fn node(&self) -> &str {
        match self {
            Self::SetReference { node } => node,
            Self::AddChild { collection } | Self::AttachChild { collection, .. } => collection,
        }
    }
}

/// Mutations of one load state waiting on one id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredUpdater {
    key: UpdaterKey,
    id: String,
    actions: Vec<DeferredAction>,
}

impl DeferredUpdater {
    pub(crate) fn new(key: UpdaterKey, id: String, action: DeferredAction) -> Self {
        Self {
            key,
            id,
            actions: vec![action],
        }
    }

    /// Updater identity
    #[inline]
    #[must_use]
    pub fn key(&self) -> UpdaterKey {
        self.key
    }

    /// The awaited id, without prefix
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Outstanding actions in registration order
    #[inline]
    #[must_use]
    pub fn actions(&self) -> &[DeferredAction] {
        &self.actions
    }

    /// True if every action only attaches a child that is still waiting on
    /// the id itself
    #[must_use]
    pub fn attaches_only(&self) -> bool {
        self.actions
            .iter()
            .all(|action| matches!(action, DeferredAction::AttachChild { .. }))
    }

    /// Returns false if an identical action is already waiting
    pub(crate) fn merge(&mut self, action: DeferredAction) -> bool {
        if self.actions.contains(&action) {
            return false;
        }
        self.actions.push(action);
        true
    }

    pub(crate) fn take_actions(&mut self) -> Vec<DeferredAction> {
        std::mem::take(&mut self.actions)
    }

    pub(crate) fn restore_actions(&mut self, actions: Vec<DeferredAction>) {
        self.actions = actions;
    }
}

/// Entry of a flattened deferred cache
///
/// Names the state owning the updater, so a driver can retry it without
/// walking the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingUpdate {
    /// Updater identity
    pub key: UpdaterKey,

    /// State whose local map holds the updater
    pub owner: StateId,

    /// The awaited id
    pub id: String,
}

/// Outcome of retrying a deferred updater
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// Every action was applied and the updater was removed
    Resolved,

    /// At least one action still waits; the registry is unchanged
    Pending,
}

impl Retry {
    /// Check for [`Retry::Resolved`]
    #[inline]
    #[must_use]
    pub fn is_resolved(self) -> bool {
        self == Self::Resolved
    }
}

/// Nodes of one load state holding an unsaved reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsavedRefUpdater {
    reference: ObjectRef,
    nodes: Vec<String>,
}

impl UnsavedRefUpdater {
    pub(crate) fn new(reference: ObjectRef, node: String) -> Self {
        Self {
            reference,
            nodes: vec![node],
        }
    }

    /// The unsaved reference
    #[inline]
    #[must_use]
    pub fn reference(&self) -> &ObjectRef {
        &self.reference
    }

    /// Nodes to rewrite
    #[inline]
    #[must_use]
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub(crate) fn add_node(&mut self, node: &str) {
        if !self.nodes.iter().any(|n| n == node) {
            self.nodes.push(node.to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_skips_identical_actions() {
        let mut updater = DeferredUpdater::new(
            UpdaterKey(1),
            "C1".into(),
            DeferredAction::SetReference {
                node: "customer".into(),
            },
        );

        assert!(!updater.merge(DeferredAction::SetReference {
            node: "customer".into()
        }));
        assert!(updater.merge(DeferredAction::SetReference {
            node: "author".into()
        }));
        assert_eq!(updater.actions().len(), 2);
        assert_eq!(updater.actions()[1].node(), "author");
    }

    #[test]
    fn unsaved_nodes_are_distinct() {
        let mut updater =
            UnsavedRefUpdater::new(ObjectRef::new("party.customerperson"), "customer".into());
        updater.add_node("customer");
        updater.add_node("owner");

        assert_eq!(updater.nodes(), &["customer".to_owned(), "owner".to_owned()]);
    }

    #[test]
    fn attachment_updaters() {
        let attach = DeferredAction::AttachChild {
            collection: "patients".into(),
            child: StateId(1),
        };
        let mut updater = DeferredUpdater::new(UpdaterKey(2), "P1".into(), attach);
        assert!(updater.attaches_only());

        updater.merge(DeferredAction::AddChild {
            collection: "contacts".into(),
        });
        assert!(!updater.attaches_only());
    }

    #[test]
    fn retry_outcome() {
        assert!(Retry::Resolved.is_resolved());
        assert!(!Retry::Pending.is_resolved());
    }
}
