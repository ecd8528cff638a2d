//! Declarative archetype schema
//!
//! Archetypes are described in YAML and turned into [`ArchetypeDescriptor`]s:
//!
//! ```yaml
//! archetypes:
//!   - short_name: party.customerperson
//!     name: "{lastName},{firstName}"
//!     nodes:
//!       - { name: firstName, kind: text, required: true }
//!       - { name: contacts, kind: collection, archetypes: ["contact.*"] }
//! ```

use crate::descriptor::{ArchetypeDescriptor, NodeDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Errors while reading a schema
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Malformed YAML
    #[error("invalid schema: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error reading the schema file
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archetype declared twice
    #[error("archetype '{0}' declared more than once")]
    DuplicateArchetype(String),

    /// Node declared twice within an archetype
    #[error("node '{node}' declared more than once in archetype '{archetype}'")]
    DuplicateNode { archetype: String, node: String },
}

/// Archetype definitions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    archetypes: Vec<ArchetypeDefinition>,
}

/// One archetype as written in the schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchetypeDefinition {
    /// Archetype short name
    pub short_name: String,

    /// Template for the derived `name` node
    #[serde(default, rename = "name", skip_serializing_if = "Option::is_none")]
    pub name_template: Option<String>,

    /// Nodes in declaration order
    #[serde(default)]
    pub nodes: Vec<NodeDescriptor>,
}

impl Schema {
    /// Parse and check a YAML schema
    ///
    /// # Errors
    /// Returns [`SchemaError`] for malformed YAML or duplicate declarations.
    pub fn from_yaml(source: &str) -> Result<Self, SchemaError> {
        let schema: Self = serde_yaml::from_str(source)?;
        schema.check()?;
        Ok(schema)
    }

    /// Read a YAML schema file
    ///
    /// # Errors
    /// Returns [`SchemaError`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&source)
    }

    /// Archetype definitions
    #[inline]
    #[must_use]
    pub fn archetypes(&self) -> &[ArchetypeDefinition] {
        &self.archetypes
    }

    /// Build the archetype descriptors
    #[must_use]
    pub fn descriptors(&self) -> Vec<ArchetypeDescriptor> {
        self.archetypes
            .iter()
            .map(|definition| {
                let descriptor = ArchetypeDescriptor::new(
                    definition.short_name.clone(),
                    definition.nodes.iter().cloned(),
                );
                match &definition.name_template {
                    Some(template) => descriptor.with_name_template(template.clone()),
                    None => descriptor,
                }
            })
            .collect()
    }

    fn check(&self) -> Result<(), SchemaError> {
        let mut archetypes = HashSet::new();
        for definition in &self.archetypes {
            if !archetypes.insert(definition.short_name.as_str()) {
                return Err(SchemaError::DuplicateArchetype(definition.short_name.clone()));
            }
            let mut nodes = HashSet::new();
            for node in &definition.nodes {
                if !nodes.insert(node.name()) {
                    return Err(SchemaError::DuplicateNode {
                        archetype: definition.short_name.clone(),
                        node: node.name().to_owned(),
                    });
                }
            }
        }
        Ok(())
    }
}
