//! Declared id to object reference cache

use crate::data::strip_id_prefix;
use dataload_model::ObjectRef;
use indexmap::IndexMap;

/// Maps ids declared in the input to the references of their objects
///
/// Lookups accept the id with or without the `id:` prefix.
#[derive(Debug, Clone, Default)]
pub struct IdRefCache {
    refs: IndexMap<String, ObjectRef>,
}

impl IdRefCache {
    /// Create empty cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declared id
    ///
    /// Returns false, leaving the cache unchanged, if the id is already
    /// declared.
    pub fn add(&mut self, id: impl Into<String>, reference: ObjectRef) -> bool {
        match self.refs.entry(id.into()) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(reference);
                true
            }
        }
    }

    /// Reference declared for an id
    #[must_use]
    pub fn reference(&self, id: &str) -> Option<&ObjectRef> {
        let id = strip_id_prefix(id).unwrap_or(id);
        self.refs.get(id)
    }

    /// Id declared for a reference
    #[must_use]
    pub fn id_of(&self, reference: &ObjectRef) -> Option<&str> {
        self.refs
            .iter()
            .find(|(_, r)| *r == reference)
            .map(|(id, _)| id.as_str())
    }

    /// Replace the stored copy of `saved` with its durable form
    ///
    /// Returns false if no id refers to it.
    pub fn update(&mut self, saved: &ObjectRef) -> bool {
        let mut found = false;
        for reference in self.refs.values_mut().filter(|r| *r == saved) {
            *reference = saved.clone();
            found = true;
        }
        found
    }

    /// Number of declared ids
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Check if no ids are declared
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Declared ids and their references, in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObjectRef)> {
        self.refs.iter().map(|(id, r)| (id.as_str(), r))
    }
}
