//! Dataload Core - reference-resolving load engine
//!
//! Streams `<data>` elements into archetype objects and saves them in
//! batches, while:
//! - Deferring references to ids that are declared later in the input
//! - Tracking references to objects that are not saved yet, so the holders
//!   are saved with or after them
//! - Propagating both up the element tree, so a parent is never saved while
//!   a descendant is unresolved
//!
//! # Example
//!
//! ```rust
//! use dataload_core::{DataLoader, LoaderConfig};
//! use dataload_model::{ArchetypeDescriptor, MemoryArchetypeService, NodeDescriptor, NodeKind};
//!
//! let service = MemoryArchetypeService::new([
//!     ArchetypeDescriptor::new("x", [NodeDescriptor::new("name", NodeKind::Reference)]),
//!     ArchetypeDescriptor::new("y", [NodeDescriptor::new("label", NodeKind::Text)]),
//! ]);
//! let mut loader = DataLoader::new(service, LoaderConfig::new());
//!
//! loader.load_str(r#"
//!     <archetype>
//!         <data archetype="x" name="id:2"/>
//!         <data id="2" archetype="y" label="target"/>
//!     </archetype>"#, "inline.xml").unwrap();
//! loader.finish().unwrap();
//!
//! assert_eq!(loader.service().len(), 2);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod cache;
pub mod config;
pub mod context;
pub mod data;
pub mod date;
pub mod error;
pub mod loader;
pub mod reader;
pub mod state;
pub mod updater;
pub mod visitor;

// Re-exports for convenience
pub use cache::IdRefCache;
pub use config::{ConfigError, LoaderConfig};
pub use context::{LoadContext, ServiceContext};
pub use data::{ChildRef, Data, SourceLocation};
pub use error::{LoadError, UnresolvedReference};
pub use loader::{DataLoader, Statistics};
pub use reader::{ReadEvent, XmlReader};
pub use state::{LoadState, LoadTree, StateId};
pub use updater::{DeferredAction, DeferredUpdater, PendingUpdate, Retry, UnsavedRefUpdater, UpdaterKey};
pub use visitor::{Visitor, Walk};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running a load
    pub use crate::{DataLoader, LoadError, LoadTree, LoaderConfig, Retry, StateId, Statistics};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
