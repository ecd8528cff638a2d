//! Visit-once traversal of a load tree

use crate::state::{LoadTree, StateId};
use std::collections::HashSet;

/// Whether a traversal descends further
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    /// Visit the node's children
    Continue,

    /// Stop the whole traversal
    Stop,
}

/// Depth-first walker over attached children
///
/// Each state is visited at most once per visitor, across every
/// [`Visitor::visit`] call, even when it is attached to more than one
/// collection. Parents are visited before their children, and children in
/// attachment order.
#[derive(Debug, Default)]
pub struct Visitor {
    visited: HashSet<StateId>,
}

impl Visitor {
    /// Create visitor
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk from `start`, calling `f` for each unvisited state
    ///
    /// Returns [`Walk::Stop`] if `f` stopped the traversal.
    pub fn visit<F>(&mut self, tree: &mut LoadTree, start: StateId, mut f: F) -> Walk
    where
        F: FnMut(&mut LoadTree, StateId) -> Walk,
    {
        let mut stack = vec![start];
        while let Some(state) = stack.pop() {
            if !self.visited.insert(state) {
                continue;
            }
            if f(tree, state) == Walk::Stop {
                return Walk::Stop;
            }
            stack.extend(
                tree[state]
                    .children()
                    .iter()
                    .rev()
                    .copied()
                    .filter(|child| !self.visited.contains(child)),
            );
        }
        Walk::Continue
    }

    /// Check if a state was visited
    #[inline]
    #[must_use]
    pub fn visited(&self, state: StateId) -> bool {
        self.visited.contains(&state)
    }

    /// Number of visited states
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.visited.len()
    }

    /// Check if nothing was visited
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}
