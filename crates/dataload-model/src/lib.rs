//! Data loader model
//!
//! The persistence side of the archetype data loader.
//!
//! # Overview
//!
//! - **ObjectRef**: reference that keeps its identity across save
//! - **Object**: single-valued nodes plus collection nodes
//! - **NodeDescriptor / ArchetypeDescriptor**: typed node assignment
//! - **Schema**: archetypes declared in YAML
//! - **ArchetypeService**: create, derive, validate and save objects
//!
//! # Example
//!
//! ```rust
//! use dataload_model::{ArchetypeService, MemoryArchetypeService, Schema, Value};
//!
//! let schema = Schema::from_yaml(r#"
//! archetypes:
//!   - short_name: lookup.staff
//!     nodes:
//!       - { name: code, kind: text, required: true }
//! "#).unwrap();
//! let mut service = MemoryArchetypeService::from_schema(&schema);
//!
//! let descriptor = service.archetype("lookup.staff").unwrap();
//! let mut object = service.create(&descriptor);
//! descriptor.node("code").unwrap().set_value(&mut object, Value::Text("VET".into())).unwrap();
//!
//! let saved = service.save(object).unwrap();
//! assert!(!saved.is_new());
//! ```

#![warn(missing_docs)]

pub mod descriptor;
pub mod object;
pub mod reference;
pub mod schema;
pub mod service;

// Re-exports
pub use descriptor::{ArchetypeDescriptor, NodeDescriptor, NodeError, NodeKind};
pub use object::{Object, Value};
pub use reference::ObjectRef;
pub use schema::{ArchetypeDefinition, Schema, SchemaError};
pub use service::{ArchetypeService, MemoryArchetypeService, StoreError};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the model
    pub use crate::{
        ArchetypeDescriptor, ArchetypeService, MemoryArchetypeService, NodeDescriptor, NodeKind,
        Object, ObjectRef, Value,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
