//! Archetype objects and node values

use crate::reference::ObjectRef;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Value of a single-valued node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// No value
    Null,

    /// Free text
    Text(String),

    /// Signed integer
    Integer(i64),

    /// Boolean flag
    Boolean(bool),

    /// Decimal number
    Decimal(f64),

    /// Date/time, without zone
    Date(NaiveDateTime),

    /// Reference to another object
    Reference(ObjectRef),
}

impl Value {
    /// Short name of the value's type, for diagnostics
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Boolean(_) => "boolean",
            Self::Decimal(_) => "decimal",
            Self::Date(_) => "date",
            Self::Reference(_) => "reference",
        }
    }

    /// Text content, if this is a text value
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Referenced object, if this is a reference value
    #[inline]
    #[must_use]
    pub fn as_reference(&self) -> Option<&ObjectRef> {
        match self {
            Self::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// Check for [`Value::Null`]
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Text(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Date(d) => write!(f, "{d}"),
            Self::Reference(r) => write!(f, "{r}"),
        }
    }
}

/// An archetype object
///
/// Holds single-valued nodes and collection nodes separately. Collection
/// members are held by reference; their objects are stored alongside the
/// owner when it is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    reference: ObjectRef,

    #[serde(default)]
    values: BTreeMap<String, Value>,

    #[serde(default)]
    collections: BTreeMap<String, Vec<ObjectRef>>,
}

impl Object {
    /// Create an empty object with the given reference
    #[inline]
    #[must_use]
    pub fn new(reference: ObjectRef) -> Self {
        Self {
            reference,
            values: BTreeMap::new(),
            collections: BTreeMap::new(),
        }
    }

    /// The object's reference
    #[inline]
    #[must_use]
    pub fn reference(&self) -> &ObjectRef {
        &self.reference
    }

    /// Archetype short name
    #[inline]
    #[must_use]
    pub fn archetype(&self) -> &str {
        self.reference.archetype()
    }

    /// True until the object has been saved
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.reference.is_new()
    }

    /// Value of a single-valued node
    #[inline]
    #[must_use]
    pub fn value(&self, node: &str) -> Option<&Value> {
        self.values.get(node)
    }

    /// Text value of a node
    #[must_use]
    pub fn text(&self, node: &str) -> Option<&str> {
        self.value(node).and_then(Value::as_text)
    }

    /// Members of a collection node, in insertion order
    #[must_use]
    pub fn collection(&self, node: &str) -> &[ObjectRef] {
        self.collections.get(node).map_or(&[], Vec::as_slice)
    }

    /// All single-valued nodes
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Every reference held by this object, in node order
    pub fn references(&self) -> impl Iterator<Item = &ObjectRef> {
        self.values
            .values()
            .filter_map(Value::as_reference)
            .chain(self.collections.values().flatten())
    }

    /// Adopt the persistent id carried by `saved`
    ///
    /// Ignored if `saved` refers to a different object.
    pub fn mark_saved(&mut self, saved: &ObjectRef) {
        if self.reference == *saved {
            self.reference = saved.clone();
        }
    }

    /// Replace every held reference equal to `saved` with `saved` itself
    pub fn rewrite_reference(&mut self, saved: &ObjectRef) {
        for value in self.values.values_mut() {
            if let Value::Reference(r) = value {
                if r == saved {
                    *r = saved.clone();
                }
            }
        }
        for member in self.collections.values_mut().flatten() {
            if member == saved {
                *member = saved.clone();
            }
        }
    }

    /// Replace the reference held by `node` with `saved`
    ///
    /// Returns false if `node` holds no reference to the same object.
    pub fn rewrite_node(&mut self, node: &str, saved: &ObjectRef) -> bool {
        match self.values.get_mut(node) {
            Some(Value::Reference(r)) if r == saved => {
                *r = saved.clone();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn set(&mut self, node: &str, value: Value) {
        if value.is_null() {
            self.values.remove(node);
        } else {
            self.values.insert(node.to_owned(), value);
        }
    }

    /// Returns false if `member` was already present
    pub(crate) fn push_member(&mut self, node: &str, member: ObjectRef) -> bool {
        let members = self.collections.entry(node.to_owned()).or_default();
        if members.contains(&member) {
            return false;
        }
        members.push(member);
        true
    }
}
