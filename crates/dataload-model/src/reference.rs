//! Object references
//!
//! Provides [`ObjectRef`], the handle by which loaded objects refer to each
//! other before and after they acquire a persistent identity.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Reference to an archetype object
///
/// A reference is created together with its object and is stable for the
/// lifetime of a load. Identity is the pair `(archetype, link_id)`: the
/// persistent id assigned on save does not take part in equality, so a
/// reference recorded while its target was unsaved still compares equal to
/// the durable reference returned by the store.
///
/// # Example
/// ```
/// use dataload_model::ObjectRef;
///
/// let unsaved = ObjectRef::new("party.customerperson");
/// assert!(unsaved.is_new());
///
/// let saved = unsaved.saved(42);
/// assert!(!saved.is_new());
/// assert_eq!(unsaved, saved);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Archetype short name, e.g. `party.customerperson`
    archetype: String,

    /// Load-stable identity
    link_id: Uuid,

    /// Persistent id, assigned by the store on save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
}

impl ObjectRef {
    /// Create a new unsaved reference with a fresh link id
    #[inline]
    #[must_use]
    pub fn new(archetype: impl Into<String>) -> Self {
        Self {
            archetype: archetype.into(),
            link_id: Uuid::new_v4(),
            id: None,
        }
    }

    /// Archetype short name
    #[inline]
    #[must_use]
    pub fn archetype(&self) -> &str {
        &self.archetype
    }

    /// Load-stable link id
    #[inline]
    #[must_use]
    pub fn link_id(&self) -> Uuid {
        self.link_id
    }

    /// Persistent id, if the target has been saved
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// True while the target has no persistent identity
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// Durable copy of this reference carrying the persistent id
    #[inline]
    #[must_use]
    pub fn saved(&self, id: u64) -> Self {
        Self {
            archetype: self.archetype.clone(),
            link_id: self.link_id,
            id: Some(id),
        }
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.link_id == other.link_id && self.archetype == other.archetype
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.archetype.hash(state);
        self.link_id.hash(state);
    }
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{}#{}", self.archetype, id),
            None => write!(f, "{}#new:{}", self.archetype, self.link_id.simple()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn new_reference_is_unsaved() {
        let r = ObjectRef::new("lookup.staff");
        assert!(r.is_new());
        assert_eq!(r.id(), None);
        assert_eq!(r.archetype(), "lookup.staff");
    }

    #[test]
    fn saved_reference_keeps_identity() {
        let r = ObjectRef::new("lookup.staff");
        let saved = r.saved(7);

        assert_eq!(r, saved);
        assert_eq!(saved.id(), Some(7));

        let mut set = HashSet::new();
        set.insert(r);
        assert!(set.contains(&saved));
    }

    #[test]
    fn distinct_references_differ() {
        let a = ObjectRef::new("lookup.staff");
        let b = ObjectRef::new("lookup.staff");
        assert_ne!(a, b);
    }

    #[test]
    fn display_shows_persistent_id() {
        let r = ObjectRef::new("party.patientpet").saved(12);
        assert_eq!(r.to_string(), "party.patientpet#12");
    }
}
