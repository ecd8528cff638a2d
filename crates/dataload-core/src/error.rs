//! Error types for the load engine
//!
//! Two classes of failure are distinguished:
//! - Structural failures (malformed element, unknown node, failed
//!   conversion) abort the load immediately.
//! - Unresolved references are not errors while the load is running; they
//!   become [`LoadError::UnresolvedReferences`] once the input is exhausted.

use crate::data::SourceLocation;
use dataload_model::{NodeError, StoreError};
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

/// Main load error type
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Element without a usable archetype, or an archetype the service
    /// doesn't know
    #[error("{location}: invalid archetype '{archetype}'")]
    InvalidArchetype {
        archetype: String,
        location: SourceLocation,
    },

    /// Element other than `<data>` or the `<archetype>` wrapper
    #[error("{location}: unexpected element <{element}>")]
    UnexpectedElement {
        element: String,
        location: SourceLocation,
    },

    /// Attribute naming a node the archetype doesn't have
    #[error("{location}: archetype '{archetype}' has no node '{node}'")]
    InvalidAttribute {
        node: String,
        archetype: String,
        location: SourceLocation,
    },

    /// Child added to a node that is not a collection
    #[error("{location}: node '{node}' of '{archetype}' is not a collection")]
    ParentNotACollection {
        node: String,
        archetype: String,
        location: SourceLocation,
    },

    /// Node value could not be applied
    #[error("{location}: failed to set {node}=\"{value}\": {source}")]
    FailedToSetAtribute {
        node: String,
        value: String,
        location: SourceLocation,
        #[source]
        source: NodeError,
    },

    /// Collection member without an enclosing element
    #[error("{location}: element names a collection but has no parent")]
    NoParentForChild { location: SourceLocation },

    /// Nested `<data>` or `childId` element without a `collection` attribute
    #[error("{location}: nested element has no collection attribute")]
    NoCollectionAttribute { location: SourceLocation },

    /// Id declared twice within one load
    #[error("{location}: id '{id}' is already declared")]
    DuplicateId {
        id: String,
        location: SourceLocation,
    },

    /// References still outstanding after the input is exhausted
    #[error("{} unresolved reference(s): {}", .0.len(), UnresolvedList(.0))]
    UnresolvedReferences(Vec<UnresolvedReference>),

    /// Malformed XML
    #[error("{path}:{line}: xml error: {source}")]
    Xml {
        path: String,
        line: usize,
        #[source]
        source: quick_xml::Error,
    },

    /// IO error reading input
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Save or validation failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl LoadError {
    /// Check if this is an immediate structural failure rather than an
    /// end-of-input resolution failure
    #[inline]
    #[must_use]
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::UnresolvedReferences(_))
    }

    /// Source location of the offending element, if known
    #[must_use]
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            Self::InvalidArchetype { location, .. }
            | Self::UnexpectedElement { location, .. }
            | Self::InvalidAttribute { location, .. }
            | Self::ParentNotACollection { location, .. }
            | Self::FailedToSetAtribute { location, .. }
            | Self::NoParentForChild { location }
            | Self::NoCollectionAttribute { location }
            | Self::DuplicateId { location, .. } => Some(location),
            Self::UnresolvedReferences(_) | Self::Xml { .. } | Self::Io { .. } | Self::Store(_) => {
                None
            }
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// An id still awaited when the load finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    /// The awaited id
    pub id: String,

    /// Archetype of the element waiting on it
    pub archetype: String,

    /// Where the waiting element was read from
    pub location: SourceLocation,
}

impl Display for UnresolvedReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "id:{} required by {} at {}", self.id, self.archetype, self.location)
    }
}

struct UnresolvedList<'a>(&'a [UnresolvedReference]);

impl Display for UnresolvedList<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, unresolved) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{unresolved}")?;
        }
        Ok(())
    }
}
