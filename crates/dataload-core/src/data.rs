//! Parsed input elements
//!
//! [`Data`] is the immutable description of one object-producing element:
//! archetype, optional declared id, optional owning collection and the
//! remaining attributes in document order. [`ChildRef`] is the element
//! form that attaches an already-declared object to a collection.

use crate::error::LoadError;
use indexmap::IndexMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// Prefix marking an attribute value as a reference to a declared id
pub const ID_PREFIX: &str = "id:";

/// Attribute naming the element's archetype
pub const ARCHETYPE: &str = "archetype";

/// Attribute declaring the element's id
pub const ID: &str = "id";

/// Attribute naming the parent collection the element belongs to
pub const COLLECTION: &str = "collection";

/// Attribute naming an already-declared object to add to a collection
pub const CHILD_ID: &str = "childId";

/// Strip [`ID_PREFIX`] from an attribute value
///
/// Returns `None` if the value is not an id reference.
#[inline]
#[must_use]
pub fn strip_id_prefix(value: &str) -> Option<&str> {
    value.strip_prefix(ID_PREFIX)
}

/// Where an element was read from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    path: Arc<str>,
    line: usize,
}

impl SourceLocation {
    /// Create a location
    #[must_use]
    pub fn new(path: impl Into<Arc<str>>, line: usize) -> Self {
        Self {
            path: path.into(),
            line,
        }
    }

    /// Source path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// One-based line number
    #[inline]
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }
}

impl Display for SourceLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.line)
    }
}

/// An object-producing element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    archetype: String,
    id: Option<String>,
    collection: Option<String>,
    attributes: IndexMap<String, String>,
    location: SourceLocation,
}

impl Data {
    /// Build from raw attributes, separating the reserved ones
    ///
    /// Empty `id` and `collection` attributes are treated as absent.
    ///
    /// # Errors
    /// Returns [`LoadError::InvalidArchetype`] if `archetype` is missing or
    /// empty.
    pub fn new<I, K, V>(attributes: I, location: SourceLocation) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut archetype = None;
        let mut id = None;
        let mut collection = None;
        let mut rest = IndexMap::new();
        for (name, value) in attributes {
            let (name, value) = (name.into(), value.into());
            match name.as_str() {
                ARCHETYPE => archetype = Some(value),
                ID => id = Some(value).filter(|v| !v.is_empty()),
                COLLECTION => collection = Some(value).filter(|v| !v.is_empty()),
                _ => {
                    rest.insert(name, value);
                }
            }
        }
        let archetype = match archetype {
            Some(a) if !a.trim().is_empty() => a,
            other => {
                return Err(LoadError::InvalidArchetype {
                    archetype: other.unwrap_or_default(),
                    location,
                })
            }
        };
        Ok(Self {
            archetype,
            id,
            collection,
            attributes: rest,
            location,
        })
    }

    /// Archetype short name
    #[inline]
    #[must_use]
    pub fn archetype(&self) -> &str {
        &self.archetype
    }

    /// Declared id
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Parent collection node name
    #[inline]
    #[must_use]
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Node attributes in document order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Source location
    #[inline]
    #[must_use]
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }
}

impl Display for Data {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<data {ARCHETYPE}=\"{}\"", self.archetype)?;
        if let Some(id) = &self.id {
            write!(f, " {ID}=\"{id}\"")?;
        }
        if let Some(collection) = &self.collection {
            write!(f, " {COLLECTION}=\"{collection}\"")?;
        }
        for (name, value) in &self.attributes {
            write!(f, " {name}=\"{value}\"")?;
        }
        f.write_str("/>")
    }
}

/// Element adding a declared object to the parent's collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRef {
    collection: String,
    child_id: String,
    location: SourceLocation,
}

impl ChildRef {
    /// Build from the `collection` and `childId` attribute values
    ///
    /// The `id:` prefix on the child id is optional.
    ///
    /// # Errors
    /// Returns [`LoadError::NoCollectionAttribute`] if `collection` is
    /// missing or empty.
    pub fn new(
        collection: Option<String>,
        child_id: &str,
        location: SourceLocation,
    ) -> Result<Self, LoadError> {
        let Some(collection) = collection.filter(|c| !c.is_empty()) else {
            return Err(LoadError::NoCollectionAttribute { location });
        };
        let child_id = strip_id_prefix(child_id).unwrap_or(child_id).to_owned();
        Ok(Self {
            collection,
            child_id,
            location,
        })
    }

    /// Parent collection node name
    #[inline]
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Declared id of the child, without prefix
    #[inline]
    #[must_use]
    pub fn child_id(&self) -> &str {
        &self.child_id
    }

    /// Source location
    #[inline]
    #[must_use]
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> SourceLocation {
        SourceLocation::new("test.xml", 3)
    }

    #[test]
    fn reserved_attributes_are_separated() {
        let data = Data::new(
            [
                ("archetype", "contact.location"),
                ("id", "L1"),
                ("collection", "contacts"),
                ("address", "12 Station Road"),
                ("preferred", "true"),
            ],
            location(),
        )
        .unwrap();

        assert_eq!(data.archetype(), "contact.location");
        assert_eq!(data.id(), Some("L1"));
        assert_eq!(data.collection(), Some("contacts"));
        assert_eq!(
            data.attributes().collect::<Vec<_>>(),
            vec![("address", "12 Station Road"), ("preferred", "true")]
        );
    }

    #[test]
    fn missing_archetype_is_invalid() {
        let err = Data::new([("id", "X")], location()).unwrap_err();
        assert!(matches!(err, LoadError::InvalidArchetype { archetype, .. } if archetype.is_empty()));

        let err = Data::new([("archetype", " ")], location()).unwrap_err();
        assert!(matches!(err, LoadError::InvalidArchetype { .. }));
    }

    #[test]
    fn empty_id_and_collection_are_absent() {
        let data = Data::new([("archetype", "x"), ("id", ""), ("collection", "")], location()).unwrap();
        assert_eq!(data.id(), None);
        assert_eq!(data.collection(), None);
    }

    #[test]
    fn display_formats_as_element() {
        let data = Data::new([("archetype", "x"), ("id", "1"), ("name", "id:2")], location()).unwrap();
        assert_eq!(data.to_string(), r#"<data archetype="x" id="1" name="id:2"/>"#);
    }

    #[test]
    fn child_ref_strips_prefix_and_requires_collection() {
        let child = ChildRef::new(Some("classifications".into()), "id:V1", location()).unwrap();
        assert_eq!(child.child_id(), "V1");
        assert_eq!(child.collection(), "classifications");

        let err = ChildRef::new(None, "V1", location()).unwrap_err();
        assert!(matches!(err, LoadError::NoCollectionAttribute { .. }));
    }

    #[test]
    fn id_prefix() {
        assert_eq!(strip_id_prefix("id:C1"), Some("C1"));
        assert_eq!(strip_id_prefix("C1"), None);
    }
}
