//! Archetype and node descriptors
//!
//! A [`NodeDescriptor`] knows how to coerce and assign a value to one node of
//! an [`Object`]; an [`ArchetypeDescriptor`] groups the node descriptors of
//! one archetype.

use crate::object::{Object, Value};
use crate::reference::ObjectRef;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Errors raised while assigning node values
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NodeError {
    /// Text could not be converted to the node's type
    #[error("cannot convert '{value}' to {kind} for node '{node}'")]
    Conversion {
        node: String,
        value: String,
        kind: NodeKind,
    },

    /// Value of the wrong type for the node
    #[error("node '{node}' expects {expected}, got {found}")]
    TypeMismatch {
        node: String,
        expected: NodeKind,
        found: &'static str,
    },

    /// Collection operation on a single-valued node
    #[error("node '{node}' is not a collection")]
    NotACollection { node: String },

    /// Single value assigned to a collection node
    #[error("node '{node}' is a collection and cannot hold a single value")]
    CollectionNode { node: String },

    /// Referenced archetype not accepted by the node
    #[error("node '{node}' does not accept archetype '{archetype}'")]
    ArchetypeNotAccepted { node: String, archetype: String },
}

/// Kind of value a node holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Free text
    Text,
    /// Signed integer
    Integer,
    /// `true` / `false`
    Boolean,
    /// Decimal number
    Decimal,
    /// Date/time
    Date,
    /// Reference to another object
    Reference,
    /// Ordered set of object references
    Collection,
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::Reference => "reference",
            Self::Collection => "collection",
        };
        f.write_str(name)
    }
}

/// Describes one node of an archetype
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    name: String,

    kind: NodeKind,

    /// A required single node must be non-null; a required collection
    /// must have at least one member
    #[serde(default)]
    required: bool,

    /// Archetypes accepted by reference and collection nodes. Empty accepts
    /// anything; a trailing `*` matches by prefix.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    archetypes: Vec<String>,
}

impl NodeDescriptor {
    /// Create an optional node accepting any archetype
    #[must_use]
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            archetypes: Vec::new(),
        }
    }

    /// Mark as required
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restrict the archetypes accepted by a reference or collection node
    #[must_use]
    pub fn accepting<I, S>(mut self, archetypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.archetypes = archetypes.into_iter().map(Into::into).collect();
        self
    }

    /// Node name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Whether the node must be populated before save
    #[inline]
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Whether the node is a collection
    #[inline]
    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.kind == NodeKind::Collection
    }

    /// Whether the node holds a date
    #[inline]
    #[must_use]
    pub fn is_date(&self) -> bool {
        self.kind == NodeKind::Date
    }

    /// Check an archetype against the accepted list
    #[must_use]
    pub fn accepts(&self, archetype: &str) -> bool {
        self.archetypes.is_empty()
            || self.archetypes.iter().any(|pattern| match pattern.strip_suffix('*') {
                Some(prefix) => archetype.starts_with(prefix),
                None => pattern == archetype,
            })
    }

    /// Coerce `value` to the node's kind and assign it
    ///
    /// Text is parsed into integer, boolean and decimal nodes. Dates and
    /// references must already be typed.
    ///
    /// # Errors
    /// Returns [`NodeError`] on a collection node, a failed conversion, a
    /// type mismatch or a reference to a non-accepted archetype.
    pub fn set_value(&self, object: &mut Object, value: Value) -> Result<(), NodeError> {
        if self.is_collection() {
            return Err(NodeError::CollectionNode {
                node: self.name.clone(),
            });
        }
        let value = self.coerce(value)?;
        object.set(&self.name, value);
        Ok(())
    }

    /// Add `child` to this collection node of `parent`
    ///
    /// Adding a member twice is a no-op.
    ///
    /// # Errors
    /// Returns [`NodeError`] if the node is not a collection or does not
    /// accept the child's archetype.
    pub fn add_child_to_collection(
        &self,
        parent: &mut Object,
        child: &ObjectRef,
    ) -> Result<(), NodeError> {
        if !self.is_collection() {
            return Err(NodeError::NotACollection {
                node: self.name.clone(),
            });
        }
        self.check_archetype(child)?;
        parent.push_member(&self.name, child.clone());
        Ok(())
    }

    fn coerce(&self, value: Value) -> Result<Value, NodeError> {
        let converted = match (self.kind, value) {
            (_, Value::Null) => Value::Null,
            (NodeKind::Text, Value::Text(s)) => Value::Text(s),
            (NodeKind::Integer, Value::Text(s)) => {
                Value::Integer(s.trim().parse().map_err(|_| self.conversion(s))?)
            }
            (NodeKind::Boolean, Value::Text(s)) => {
                let flag = s.trim().to_ascii_lowercase();
                match flag.as_str() {
                    "true" => Value::Boolean(true),
                    "false" => Value::Boolean(false),
                    _ => return Err(self.conversion(s)),
                }
            }
            (NodeKind::Decimal, Value::Text(s)) => {
                Value::Decimal(s.trim().parse().map_err(|_| self.conversion(s))?)
            }
            (NodeKind::Reference, Value::Reference(r)) => {
                self.check_archetype(&r)?;
                Value::Reference(r)
            }
            (NodeKind::Integer, v @ Value::Integer(_))
            | (NodeKind::Boolean, v @ Value::Boolean(_))
            | (NodeKind::Decimal, v @ Value::Decimal(_))
            | (NodeKind::Date, v @ Value::Date(_)) => v,
            (expected, other) => {
                return Err(NodeError::TypeMismatch {
                    node: self.name.clone(),
                    expected,
                    found: other.type_name(),
                })
            }
        };
        Ok(converted)
    }

    fn check_archetype(&self, reference: &ObjectRef) -> Result<(), NodeError> {
        if self.accepts(reference.archetype()) {
            Ok(())
        } else {
            Err(NodeError::ArchetypeNotAccepted {
                node: self.name.clone(),
                archetype: reference.archetype().to_owned(),
            })
        }
    }

    fn conversion(&self, value: String) -> NodeError {
        NodeError::Conversion {
            node: self.name.clone(),
            value,
            kind: self.kind,
        }
    }
}

/// Describes an archetype: its short name and nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchetypeDescriptor {
    short_name: String,
    nodes: IndexMap<String, NodeDescriptor>,
    name_template: Option<String>,
}

impl ArchetypeDescriptor {
    /// Create a descriptor from its nodes
    ///
    /// Later nodes replace earlier nodes of the same name.
    #[must_use]
    pub fn new(short_name: impl Into<String>, nodes: impl IntoIterator<Item = NodeDescriptor>) -> Self {
        Self {
            short_name: short_name.into(),
            nodes: nodes
                .into_iter()
                .map(|node| (node.name.clone(), node))
                .collect(),
            name_template: None,
        }
    }

    /// Derive the `name` node from other text nodes on save
    ///
    /// Placeholders are node names in braces: `"{lastName},{firstName}"`.
    #[must_use]
    pub fn with_name_template(mut self, template: impl Into<String>) -> Self {
        self.name_template = Some(template.into());
        self
    }

    /// Archetype short name
    #[inline]
    #[must_use]
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Node descriptor by name
    #[inline]
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&NodeDescriptor> {
        self.nodes.get(name)
    }

    /// Node descriptors in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.nodes.values()
    }

    /// Template for the derived `name` node
    #[inline]
    #[must_use]
    pub fn name_template(&self) -> Option<&str> {
        self.name_template.as_deref()
    }
}
