//! Load state tree
//!
//! Every object-producing element gets a [`LoadState`] in a [`LoadTree`]
//! arena. A state links to its parent, so mutations it cannot apply yet
//! are registered locally and propagated into the flattened caches of every
//! ancestor. A state is complete iff its flattened deferred cache is empty.
//!
//! # Flattened caches
//!
//! - The deferred cache of a state holds one [`PendingUpdate`] per deferred
//!   updater registered on the state or any descendant.
//! - The unsaved cache counts, per unsaved reference, how many states at or
//!   below the state still hold it.
//!
//! Both are maintained incrementally by walking the parent chain.

use crate::context::LoadContext;
use crate::data::{strip_id_prefix, SourceLocation, ID_PREFIX};
use crate::date;
use crate::error::LoadError;
use crate::updater::{
    DeferredAction, DeferredUpdater, PendingUpdate, Retry, UnsavedRefUpdater, UpdaterKey,
};
use crate::visitor::{Visitor, Walk};
use dataload_model::{
    ArchetypeDescriptor, NodeDescriptor, NodeError, NodeKind, Object, ObjectRef, Value,
};
use indexmap::IndexMap;
use std::fmt::{self, Display, Formatter};
use std::ops::Index;
use std::sync::Arc;
use tracing::debug;

/// Index of a state within its tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub(crate) usize);

impl StateId {
    /// State at `index` in creation order
    #[inline]
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Position in creation order
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for StateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "state {}", self.0)
    }
}

/// Load progress of one object
#[derive(Debug)]
pub struct LoadState {
    object: Object,
    descriptor: Arc<ArchetypeDescriptor>,
    parent: Option<StateId>,
    children: Vec<StateId>,
    deferred: IndexMap<String, DeferredUpdater>,
    deferred_cache: IndexMap<UpdaterKey, PendingUpdate>,
    unsaved: IndexMap<ObjectRef, UnsavedRefUpdater>,
    unsaved_cache: IndexMap<ObjectRef, usize>,
    location: SourceLocation,
}

impl LoadState {
    /// The object being built
    #[inline]
    #[must_use]
    pub fn object(&self) -> &Object {
        &self.object
    }

    /// Descriptor of the object's archetype
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &ArchetypeDescriptor {
        &self.descriptor
    }

    /// Archetype short name
    #[inline]
    #[must_use]
    pub fn archetype(&self) -> &str {
        self.descriptor.short_name()
    }

    /// Enclosing state, `None` for a root
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<StateId> {
        self.parent
    }

    /// Children attached to this state's collections, in attachment order
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[StateId] {
        &self.children
    }

    /// Where the element was read from
    #[inline]
    #[must_use]
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// True iff neither this state nor any descendant waits on an id
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.deferred_cache.is_empty()
    }

    /// Updaters registered on this state itself
    pub fn local_deferred(&self) -> impl Iterator<Item = &DeferredUpdater> {
        self.deferred.values()
    }

    /// Updaters registered on this state or any descendant
    pub fn deferred(&self) -> impl Iterator<Item = &PendingUpdate> {
        self.deferred_cache.values()
    }

    /// Unsaved reference updaters of this state itself
    pub fn local_unsaved(&self) -> impl Iterator<Item = &UnsavedRefUpdater> {
        self.unsaved.values()
    }

    /// Distinct unsaved references held by this state or any descendant
    pub fn unsaved(&self) -> impl Iterator<Item = &ObjectRef> {
        self.unsaved_cache.keys()
    }

    fn invalid_attribute(&self, node: &str) -> LoadError {
        LoadError::InvalidAttribute {
            node: node.to_owned(),
            archetype: self.archetype().to_owned(),
            location: self.location.clone(),
        }
    }

    fn failed_to_set(&self, node: &str, value: impl Into<String>, source: NodeError) -> LoadError {
        LoadError::FailedToSetAtribute {
            node: node.to_owned(),
            value: value.into(),
            location: self.location.clone(),
            source,
        }
    }
}

/// Arena of load states
///
/// States are only ever added; a [`StateId`] stays valid for the life of the
/// tree.
#[derive(Debug, Default)]
pub struct LoadTree {
    states: Vec<LoadState>,
    next_key: u64,
}

impl LoadTree {
    /// Create empty tree
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a state for `object`
    ///
    /// The state is linked to `parent` for propagation but is not attached
    /// to any of its collections until [`LoadTree::add_child`].
    pub fn push(
        &mut self,
        parent: Option<StateId>,
        object: Object,
        descriptor: Arc<ArchetypeDescriptor>,
        location: SourceLocation,
    ) -> StateId {
        let id = StateId(self.states.len());
        self.states.push(LoadState {
            object,
            descriptor,
            parent,
            children: Vec::new(),
            deferred: IndexMap::new(),
            deferred_cache: IndexMap::new(),
            unsaved: IndexMap::new(),
            unsaved_cache: IndexMap::new(),
            location,
        });
        id
    }

    /// State by id
    #[inline]
    #[must_use]
    pub fn get(&self, id: StateId) -> Option<&LoadState> {
        self.states.get(id.0)
    }

    /// Number of states
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Check if the tree has no states
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// States in creation order
    pub fn iter(&self) -> impl Iterator<Item = (StateId, &LoadState)> {
        self.states.iter().enumerate().map(|(i, s)| (StateId(i), s))
    }

    /// See [`LoadState::is_complete`]
    #[inline]
    #[must_use]
    pub fn is_complete(&self, state: StateId) -> bool {
        self[state].is_complete()
    }

    /// Assign an attribute value to a node
    ///
    /// - `id:` values on a collection node add the declared object to the
    ///   collection.
    /// - `id:` values on other nodes set a reference to the declared object.
    /// - Date nodes parse the value; an empty value clears the node.
    /// - Anything else is handed to the node descriptor as text.
    ///
    /// A reference or child that can't be resolved yet is deferred, which is
    /// not an error.
    ///
    /// # Errors
    /// [`LoadError::InvalidAttribute`] if the archetype has no such node,
    /// [`LoadError::FailedToSetAtribute`] if the value is rejected.
    pub fn set_value(
        &mut self,
        state: StateId,
        name: &str,
        value: &str,
        context: &dyn LoadContext,
    ) -> Result<(), LoadError> {
        let descriptor = Arc::clone(&self[state].descriptor);
        let Some(node) = descriptor.node(name) else {
            return Err(self[state].invalid_attribute(name));
        };
        if let Some(id) = strip_id_prefix(value) {
            if node.is_collection() {
                self.try_add_by_id(state, node, id, context)?;
            } else {
                self.try_set_reference(state, node, id, context)?;
            }
            return Ok(());
        }
        let typed = if node.is_date() {
            match date::parse(value) {
                Ok(Some(parsed)) => Value::Date(parsed),
                Ok(None) => Value::Null,
                Err(_) => {
                    let source = NodeError::Conversion {
                        node: name.to_owned(),
                        value: value.to_owned(),
                        kind: NodeKind::Date,
                    };
                    return Err(self[state].failed_to_set(name, value, source));
                }
            }
        } else {
            Value::Text(value.to_owned())
        };
        let target = &mut self.states[state.0];
        node.set_value(&mut target.object, typed)
            .map_err(|source| target.failed_to_set(name, value, source))
    }

    /// Attach a child state to a collection of `parent`
    ///
    /// A complete child is attached immediately. Otherwise the attachment is
    /// deferred on one of the child's outstanding ids and happens on the
    /// first retry after the child completes.
    ///
    /// # Errors
    /// [`LoadError::InvalidAttribute`] for an unknown node,
    /// [`LoadError::ParentNotACollection`] if the node is single-valued,
    /// [`LoadError::FailedToSetAtribute`] if the collection rejects the
    /// child.
    pub fn add_child(
        &mut self,
        parent: StateId,
        collection: &str,
        child: StateId,
    ) -> Result<(), LoadError> {
        let descriptor = Arc::clone(&self[parent].descriptor);
        let node = self.collection_node(parent, &descriptor, collection, &self[child].location)?;
        let waiting_on = self[child].deferred_cache.values().next().map(|p| p.id.clone());
        match waiting_on {
            None => self.attach(parent, node, child),
            Some(id) => {
                self.defer(
                    parent,
                    &id,
                    DeferredAction::AttachChild {
                        collection: collection.to_owned(),
                        child,
                    },
                );
                Ok(())
            }
        }
    }

    /// Add the object declared as `id` to a collection of `state`
    ///
    /// Returns false if the object isn't available yet and the addition was
    /// deferred.
    ///
    /// # Errors
    /// As for [`LoadTree::add_child`].
    pub fn add_child_by_id(
        &mut self,
        state: StateId,
        collection: &str,
        id: &str,
        context: &dyn LoadContext,
    ) -> Result<bool, LoadError> {
        let descriptor = Arc::clone(&self[state].descriptor);
        let location = self[state].location.clone();
        let node = self.collection_node(state, &descriptor, collection, &location)?;
        let id = strip_id_prefix(id).unwrap_or(id);
        self.try_add_by_id(state, node, id, context)
    }

    /// Retry the updater `owner` registered for `id`
    ///
    /// Applies every action whose condition now holds. If all were applied
    /// the updater is removed from `owner` and every ancestor. Retrying an
    /// updater that no longer exists is [`Retry::Resolved`].
    ///
    /// # Errors
    /// A structural failure applying a now-resolvable action. The updater is
    /// left registered.
    pub fn retry(
        &mut self,
        owner: StateId,
        id: &str,
        context: &dyn LoadContext,
    ) -> Result<Retry, LoadError> {
        let descriptor = Arc::clone(&self[owner].descriptor);
        let Some(updater) = self.states[owner.0].deferred.get_mut(id) else {
            return Ok(Retry::Resolved);
        };
        let mut actions = updater.take_actions().into_iter();
        let mut waiting = Vec::new();
        while let Some(action) = actions.next() {
            match self.apply(owner, &descriptor, id, &action, context) {
                Ok(true) => {}
                Ok(false) => waiting.push(action),
                Err(err) => {
                    waiting.push(action);
                    waiting.extend(actions);
                    self.restore(owner, id, waiting);
                    return Err(err);
                }
            }
        }
        if waiting.is_empty() {
            self.remove_deferred(owner, id);
            debug!("resolved id:{} for {} at {}", id, self[owner].archetype(), self[owner].location);
            Ok(Retry::Resolved)
        } else {
            self.restore(owner, id, waiting);
            Ok(Retry::Pending)
        }
    }

    /// Rewrite references to a newly saved object, starting at `start`
    ///
    /// Returns the number of states rewritten.
    pub fn update(&mut self, start: StateId, saved: &ObjectRef) -> usize {
        self.update_all([start], saved)
    }

    /// As [`LoadTree::update`], visiting each reachable state once across
    /// all `starts`
    pub fn update_all(
        &mut self,
        starts: impl IntoIterator<Item = StateId>,
        saved: &ObjectRef,
    ) -> usize {
        let mut visitor = Visitor::new();
        let mut rewritten = 0;
        for start in starts {
            visitor.visit(self, start, |tree, state| {
                if tree.rewrite_unsaved(state, saved) {
                    rewritten += 1;
                }
                Walk::Continue
            });
        }
        rewritten
    }

    /// Give a state's object the persistent id carried by `saved`
    pub fn mark_saved(&mut self, state: StateId, saved: &ObjectRef) {
        self.states[state.0].object.mark_saved(saved);
    }

    pub(crate) fn object_mut(&mut self, state: StateId) -> &mut Object {
        &mut self.states[state.0].object
    }

    fn collection_node<'d>(
        &self,
        state: StateId,
        descriptor: &'d ArchetypeDescriptor,
        collection: &str,
        location: &SourceLocation,
    ) -> Result<&'d NodeDescriptor, LoadError> {
        let node = descriptor
            .node(collection)
            .ok_or_else(|| self[state].invalid_attribute(collection))?;
        if node.is_collection() {
            Ok(node)
        } else {
            Err(LoadError::ParentNotACollection {
                node: collection.to_owned(),
                archetype: descriptor.short_name().to_owned(),
                location: location.clone(),
            })
        }
    }

    fn apply(
        &mut self,
        owner: StateId,
        descriptor: &ArchetypeDescriptor,
        id: &str,
        action: &DeferredAction,
        context: &dyn LoadContext,
    ) -> Result<bool, LoadError> {
        let node = descriptor
            .node(action.node())
            .ok_or_else(|| self[owner].invalid_attribute(action.node()))?;
        match action {
            DeferredAction::SetReference { .. } => match context.reference(id) {
                Some(reference) => self.apply_reference(owner, node, id, reference).map(|()| true),
                None => Ok(false),
            },
            DeferredAction::AddChild { .. } => match context.object(id) {
                Some(child) => self.add_member(owner, node, child.reference()).map(|()| true),
                None => Ok(false),
            },
            DeferredAction::AttachChild { child, .. } => {
                if self.is_complete(*child) {
                    self.attach(owner, node, *child).map(|()| true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    fn try_set_reference(
        &mut self,
        state: StateId,
        node: &NodeDescriptor,
        id: &str,
        context: &dyn LoadContext,
    ) -> Result<bool, LoadError> {
        match context.reference(id) {
            Some(reference) => {
                self.apply_reference(state, node, id, reference)?;
                Ok(true)
            }
            None => {
                let action = DeferredAction::SetReference {
                    node: node.name().to_owned(),
                };
                self.defer(state, id, action);
                Ok(false)
            }
        }
    }

    fn try_add_by_id(
        &mut self,
        state: StateId,
        node: &NodeDescriptor,
        id: &str,
        context: &dyn LoadContext,
    ) -> Result<bool, LoadError> {
        match context.object(id) {
            Some(child) => {
                self.add_member(state, node, child.reference())?;
                Ok(true)
            }
            None => {
                let action = DeferredAction::AddChild {
                    collection: node.name().to_owned(),
                };
                self.defer(state, id, action);
                Ok(false)
            }
        }
    }

    fn apply_reference(
        &mut self,
        state: StateId,
        node: &NodeDescriptor,
        id: &str,
        reference: ObjectRef,
    ) -> Result<(), LoadError> {
        let target = &mut self.states[state.0];
        node.set_value(&mut target.object, Value::Reference(reference.clone()))
            .map_err(|source| target.failed_to_set(node.name(), format!("{ID_PREFIX}{id}"), source))?;
        if reference.is_new() {
            self.add_unsaved(state, reference, node.name());
        }
        Ok(())
    }

    fn add_member(
        &mut self,
        state: StateId,
        node: &NodeDescriptor,
        member: &ObjectRef,
    ) -> Result<(), LoadError> {
        let target = &mut self.states[state.0];
        node.add_child_to_collection(&mut target.object, member)
            .map_err(|source| target.failed_to_set(node.name(), member.to_string(), source))
    }

    fn attach(&mut self, parent: StateId, node: &NodeDescriptor, child: StateId) -> Result<(), LoadError> {
        let member = self[child].object.reference().clone();
        self.add_member(parent, node, &member)?;
        let children = &mut self.states[parent.0].children;
        if !children.contains(&child) {
            children.push(child);
        }
        Ok(())
    }

    fn ancestry(&self, state: StateId) -> Vec<StateId> {
        std::iter::successors(Some(state), |s| self[*s].parent).collect()
    }

    fn defer(&mut self, state: StateId, id: &str, action: DeferredAction) {
        if let Some(updater) = self.states[state.0].deferred.get_mut(id) {
            updater.merge(action);
            return;
        }
        self.next_key += 1;
        let key = UpdaterKey(self.next_key);
        debug!("deferring {} of {} until id:{}", action.node(), self[state].archetype(), id);
        self.states[state.0]
            .deferred
            .insert(id.to_owned(), DeferredUpdater::new(key, id.to_owned(), action));
        let pending = PendingUpdate {
            key,
            owner: state,
            id: id.to_owned(),
        };
        for ancestor in self.ancestry(state) {
            self.states[ancestor.0]
                .deferred_cache
                .insert(key, pending.clone());
        }
    }

    fn restore(&mut self, owner: StateId, id: &str, actions: Vec<DeferredAction>) {
        if let Some(updater) = self.states[owner.0].deferred.get_mut(id) {
            updater.restore_actions(actions);
        }
    }

    fn remove_deferred(&mut self, state: StateId, id: &str) {
        let Some(updater) = self.states[state.0].deferred.shift_remove(id) else {
            return;
        };
        for ancestor in self.ancestry(state) {
            self.states[ancestor.0]
                .deferred_cache
                .shift_remove(&updater.key());
        }
    }

    fn add_unsaved(&mut self, state: StateId, reference: ObjectRef, node: &str) {
        if let Some(updater) = self.states[state.0].unsaved.get_mut(&reference) {
            updater.add_node(node);
            return;
        }
        for ancestor in self.ancestry(state) {
            *self.states[ancestor.0]
                .unsaved_cache
                .entry(reference.clone())
                .or_insert(0) += 1;
        }
        let updater = UnsavedRefUpdater::new(reference.clone(), node.to_owned());
        self.states[state.0].unsaved.insert(reference, updater);
    }

    fn remove_unsaved(&mut self, state: StateId, reference: &ObjectRef) {
        if self.states[state.0].unsaved.shift_remove(reference).is_none() {
            return;
        }
        for ancestor in self.ancestry(state) {
            let cache = &mut self.states[ancestor.0].unsaved_cache;
            if let Some(count) = cache.get_mut(reference) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    cache.shift_remove(reference);
                }
            }
        }
    }

    /// Returns false if the state holds no unsaved copy of `saved`
    fn rewrite_unsaved(&mut self, state: StateId, saved: &ObjectRef) -> bool {
        let target = &mut self.states[state.0];
        let Some(updater) = target.unsaved.get(saved) else {
            return false;
        };
        for node in updater.nodes() {
            target.object.rewrite_node(node, saved);
        }
        self.remove_unsaved(state, saved);
        true
    }
}

impl Index<StateId> for LoadTree {
    type Output = LoadState;

    fn index(&self, id: StateId) -> &LoadState {
        &self.states[id.0]
    }
}
