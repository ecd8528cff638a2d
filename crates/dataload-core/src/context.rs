//! Load context
//!
//! The engine resolves declared ids only through [`LoadContext`], so the
//! id cache and the store stay injectable.

use crate::cache::IdRefCache;
use dataload_model::{ArchetypeService, Object, ObjectRef};

/// Resolves declared ids during a load
pub trait LoadContext {
    /// Reference declared for an id, saved or not
    fn reference(&self, id: &str) -> Option<ObjectRef>;

    /// Object declared for an id, if it can be attached to a collection
    fn object(&self, id: &str) -> Option<Object>;
}

/// [`LoadContext`] over an [`IdRefCache`] and an [`ArchetypeService`]
///
/// Objects are only available once saved. In validate-only mode nothing is
/// ever saved, so a fresh object of the declared archetype stands in.
#[derive(Debug)]
pub struct ServiceContext<'a, S: ?Sized> {
    cache: &'a IdRefCache,
    service: &'a S,
    validate_only: bool,
}

impl<'a, S: ArchetypeService + ?Sized> ServiceContext<'a, S> {
    /// Create context
    #[inline]
    #[must_use]
    pub fn new(cache: &'a IdRefCache, service: &'a S, validate_only: bool) -> Self {
        Self {
            cache,
            service,
            validate_only,
        }
    }
}

impl<S: ArchetypeService + ?Sized> LoadContext for ServiceContext<'_, S> {
    fn reference(&self, id: &str) -> Option<ObjectRef> {
        self.cache.reference(id).cloned()
    }

    fn object(&self, id: &str) -> Option<Object> {
        let reference = self.cache.reference(id)?;
        if self.validate_only {
            let descriptor = self.service.archetype(reference.archetype())?;
            Some(self.service.create(&descriptor))
        } else if reference.is_new() {
            None
        } else {
            self.service.get(reference)
        }
    }
}
