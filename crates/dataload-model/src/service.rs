//! Archetype service
//!
//! [`ArchetypeService`] is the persistence seam of the loader: it resolves
//! archetype descriptors, creates objects, derives values and saves.
//! [`MemoryArchetypeService`] keeps everything in memory.

use crate::descriptor::{ArchetypeDescriptor, NodeError};
use crate::object::{Object, Value};
use crate::reference::ObjectRef;
use crate::schema::Schema;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

/// Errors raised by an archetype service
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// No descriptor for the archetype
    #[error("unknown archetype '{0}'")]
    UnknownArchetype(String),

    /// Required node has no value
    #[error("{reference}: required node '{node}' has no value")]
    MissingRequired { reference: ObjectRef, node: String },

    /// Object refers to an object that is neither stored nor being saved
    #[error("{object} references unsaved object {reference}")]
    UnsavedReference {
        object: ObjectRef,
        reference: ObjectRef,
    },

    /// Save call that produced no reference
    #[error("nothing was saved")]
    NothingSaved,

    /// Failure deriving a node value
    #[error(transparent)]
    Node(#[from] NodeError),
}

/// Persistence operations needed by the loader
pub trait ArchetypeService {
    /// Descriptor for an archetype short name
    fn archetype(&self, short_name: &str) -> Option<Arc<ArchetypeDescriptor>>;

    /// Stored object for a reference
    fn get(&self, reference: &ObjectRef) -> Option<Object>;

    /// Save objects as a unit
    ///
    /// Either every object is saved, or none is. References between the
    /// objects are allowed; references to other unsaved objects are not.
    /// Returns the saved references in input order.
    ///
    /// # Errors
    /// Returns [`StoreError`] if any object fails validation or refers to
    /// an unsaved object outside the call.
    fn save_all(&mut self, objects: Vec<Object>) -> Result<Vec<ObjectRef>, StoreError>;

    /// Create an empty, unsaved object
    fn create(&self, descriptor: &ArchetypeDescriptor) -> Object {
        Object::new(ObjectRef::new(descriptor.short_name()))
    }

    /// Save a single object
    ///
    /// # Errors
    /// See [`ArchetypeService::save_all`].
    fn save(&mut self, object: Object) -> Result<ObjectRef, StoreError> {
        self.save_all(vec![object])?
            .pop()
            .ok_or(StoreError::NothingSaved)
    }

    /// Populate derived nodes
    ///
    /// The `name` node is rendered from the archetype's name template, if
    /// it has one.
    ///
    /// # Errors
    /// Returns [`StoreError`] for an unknown archetype or a rejected value.
    fn derive_values(&self, object: &mut Object) -> Result<(), StoreError> {
        let descriptor = self
            .archetype(object.archetype())
            .ok_or_else(|| StoreError::UnknownArchetype(object.archetype().to_owned()))?;
        let (Some(template), Some(node)) = (descriptor.name_template(), descriptor.node("name"))
        else {
            return Ok(());
        };
        let name = render(template, object);
        node.set_value(object, Value::Text(name))?;
        Ok(())
    }

    /// Check required nodes
    ///
    /// # Errors
    /// Returns [`StoreError::MissingRequired`] for the first empty required
    /// node.
    fn validate(&self, object: &Object) -> Result<(), StoreError> {
        let descriptor = self
            .archetype(object.archetype())
            .ok_or_else(|| StoreError::UnknownArchetype(object.archetype().to_owned()))?;
        for node in descriptor.nodes().filter(|node| node.is_required()) {
            let present = if node.is_collection() {
                !object.collection(node.name()).is_empty()
            } else {
                object.value(node.name()).is_some()
            };
            if !present {
                return Err(StoreError::MissingRequired {
                    reference: object.reference().clone(),
                    node: node.name().to_owned(),
                });
            }
        }
        Ok(())
    }
}

/// Expand `{node}` placeholders from the object's values
fn render(template: &str, object: &Object) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                if let Some(value) = object.value(&after[..end]) {
                    out.push_str(&value.to_string());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// In-memory archetype service
///
/// Assigns persistent ids from a counter starting at 1.
#[derive(Debug, Default)]
pub struct MemoryArchetypeService {
    descriptors: IndexMap<String, Arc<ArchetypeDescriptor>>,
    objects: IndexMap<ObjectRef, Object>,
    next_id: u64,
}

impl MemoryArchetypeService {
    /// Create a service over the given descriptors
    #[must_use]
    pub fn new(descriptors: impl IntoIterator<Item = ArchetypeDescriptor>) -> Self {
        Self {
            descriptors: descriptors
                .into_iter()
                .map(|d| (d.short_name().to_owned(), Arc::new(d)))
                .collect(),
            objects: IndexMap::new(),
            next_id: 0,
        }
    }

    /// Create a service over a schema's archetypes
    #[must_use]
    pub fn from_schema(schema: &Schema) -> Self {
        Self::new(schema.descriptors())
    }

    /// Stored objects in save order
    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    /// Stored objects of one archetype
    #[must_use]
    pub fn by_archetype(&self, short_name: &str) -> Vec<&Object> {
        self.objects
            .values()
            .filter(|o| o.archetype() == short_name)
            .collect()
    }

    /// Number of stored objects
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if nothing is stored
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ArchetypeService for MemoryArchetypeService {
    fn archetype(&self, short_name: &str) -> Option<Arc<ArchetypeDescriptor>> {
        self.descriptors.get(short_name).cloned()
    }

    fn get(&self, reference: &ObjectRef) -> Option<Object> {
        self.objects.get(reference).cloned()
    }

    fn save_all(&mut self, mut objects: Vec<Object>) -> Result<Vec<ObjectRef>, StoreError> {
        let in_call: HashSet<ObjectRef> = objects.iter().map(|o| o.reference().clone()).collect();

        // Checks first, nothing is stored unless every object passes
        let mut durable = Vec::new();
        for object in &mut objects {
            self.derive_values(object)?;
            self.validate(object)?;
            for reference in object.references().filter(|r| r.is_new()) {
                if in_call.contains(reference) {
                    continue;
                }
                match self.objects.get(reference) {
                    Some(stored) => durable.push(stored.reference().clone()),
                    None => {
                        return Err(StoreError::UnsavedReference {
                            object: object.reference().clone(),
                            reference: reference.clone(),
                        })
                    }
                }
            }
        }

        let mut saved = Vec::with_capacity(objects.len());
        for object in &objects {
            let reference = match object.reference().id() {
                Some(_) => object.reference().clone(),
                None => {
                    self.next_id += 1;
                    object.reference().saved(self.next_id)
                }
            };
            saved.push(reference);
        }
        durable.extend(saved.iter().cloned());

        for (mut object, reference) in objects.into_iter().zip(&saved) {
            for target in &durable {
                object.rewrite_reference(target);
            }
            object.mark_saved(reference);
            tracing::debug!("saved {}", reference);
            self.objects.insert(reference.clone(), object);
        }
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{NodeDescriptor, NodeKind};
    use pretty_assertions::assert_eq;

    fn service() -> MemoryArchetypeService {
        MemoryArchetypeService::new([
            ArchetypeDescriptor::new(
                "party.customerperson",
                [
                    NodeDescriptor::new("name", NodeKind::Text),
                    NodeDescriptor::new("firstName", NodeKind::Text).required(),
                    NodeDescriptor::new("lastName", NodeKind::Text).required(),
                    NodeDescriptor::new("classification", NodeKind::Reference),
                ],
            )
            .with_name_template("{lastName},{firstName}"),
            ArchetypeDescriptor::new(
                "lookup.staff",
                [NodeDescriptor::new("code", NodeKind::Text).required()],
            ),
        ])
    }

    fn customer(service: &MemoryArchetypeService) -> Object {
        let descriptor = service.archetype("party.customerperson").unwrap();
        let mut object = service.create(&descriptor);
        let first = descriptor.node("firstName").unwrap();
        let last = descriptor.node("lastName").unwrap();
        first.set_value(&mut object, Value::Text("Foo".into())).unwrap();
        last.set_value(&mut object, Value::Text("Bar".into())).unwrap();
        object
    }

    fn lookup(service: &MemoryArchetypeService) -> Object {
        let descriptor = service.archetype("lookup.staff").unwrap();
        let mut object = service.create(&descriptor);
        descriptor
            .node("code")
            .unwrap()
            .set_value(&mut object, Value::Text("VET".into()))
            .unwrap();
        object
    }

    #[test]
    fn save_assigns_ids_and_derives_name() {
        let mut service = service();
        let object = customer(&service);

        let saved = service.save(object).unwrap();

        assert_eq!(saved.id(), Some(1));
        let stored = service.get(&saved).unwrap();
        assert_eq!(stored.text("name"), Some("Bar,Foo"));
        assert!(!stored.is_new());
    }

    #[test]
    fn missing_required_node_rejected() {
        let mut service = service();
        let descriptor = service.archetype("lookup.staff").unwrap();
        let object = service.create(&descriptor);

        let err = service.save(object).unwrap_err();
        assert!(matches!(err, StoreError::MissingRequired { node, .. } if node == "code"));
        assert!(service.is_empty());
    }

    #[test]
    fn unsaved_reference_outside_call_rejected() {
        let mut service = service();
        let target = lookup(&service);
        let mut object = customer(&service);
        service
            .archetype("party.customerperson")
            .unwrap()
            .node("classification")
            .unwrap()
            .set_value(&mut object, Value::Reference(target.reference().clone()))
            .unwrap();

        let err = service.save(object.clone()).unwrap_err();
        assert!(matches!(err, StoreError::UnsavedReference { .. }));
        assert!(service.is_empty());

        // Saved together, the reference is rewritten to the durable copy
        let saved = service.save_all(vec![object, target]).unwrap();
        let stored = service.get(&saved[0]).unwrap();
        let held = stored.value("classification").and_then(Value::as_reference).unwrap();
        assert_eq!(held.id(), saved[1].id());
    }

    #[test]
    fn stale_reference_to_stored_object_is_rewritten() {
        let mut service = service();
        let target = lookup(&service);
        let stale = target.reference().clone();
        service.save(target).unwrap();

        let mut object = customer(&service);
        service
            .archetype("party.customerperson")
            .unwrap()
            .node("classification")
            .unwrap()
            .set_value(&mut object, Value::Reference(stale))
            .unwrap();
        let saved = service.save(object).unwrap();

        let stored = service.get(&saved).unwrap();
        assert!(stored.references().all(|r| !r.is_new()));
    }

    #[test]
    fn render_handles_missing_and_unclosed_placeholders() {
        let object = Object::new(ObjectRef::new("x"));
        assert_eq!(render("{a}-{b", &object), "-{b");
        assert_eq!(render("plain", &object), "plain");
    }
}
