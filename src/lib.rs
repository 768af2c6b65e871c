//! # Recliner
//!
//! An object-document mapping layer for CouchDB-style document stores.
//!
//! Applications declare typed document classes once, in code, and the mapper
//! handles validation, persistence, many-to-many relationships, server-side
//! views, and schema-version synchronization against the store.
//!
//! ## Core Concepts
//!
//! ### Classes and the registry
//!
//! Document shapes are declared as [`ClassSpec`]s and assembled into an
//! immutable [`Registry`]. Building the registry wires reverse link
//! properties onto their target classes and injects the base properties
//! every persisted document carries (`_id`, `_rev`, `type_`,
//! `schema_version_`).
//!
//! ### Documents
//!
//! A [`Document`] is a schema-validated property bag. Every mutation is
//! validated up front; a failed set leaves the stored state untouched.
//! Documents fetched from the store whose schema version stamp does not
//! match the deployed version of their class come back *unbound*, with raw
//! values preserved.
//!
//! ### Links
//!
//! Relationships are stored as separate link documents, one per edge,
//! queryable in both directions through a shared design document. Link
//! properties may declare indexed paths; the mapper snapshots those values
//! onto each edge and refreshes them when the linked document changes.
//!
//! ### Sync
//!
//! [`Database::sync`] pushes one schema design document per class into the
//! store, bumping the stored schema version only when the serialized schema
//! actually changed.
//!
//! ## Quick Start
//!
//! ```rust
//! use recliner::{ClassSpec, Property, Registry};
//! use serde_json::json;
//!
//! let registry = Registry::builder()
//!     .register(
//!         ClassSpec::document("Person")
//!             .with_property(Property::string("name").required())
//!             .with_property(Property::integer("age").with_minimum(0.0)),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let mut person = registry.create("person").unwrap();
//! person.set("name", json!("will")).unwrap();
//! assert!(person.set("age", json!(-1)).is_err());
//!
//! let data = person.marshal();
//! assert_eq!(data["name"], json!("will"));
//! assert_eq!(data["type_"], json!("person"));
//! ```
//!
//! Persistence goes through [`Database`], which pairs the registry with a
//! [`Transport`] bound to one database URL.

pub mod database;
pub mod design;
pub mod document;
pub mod error;
pub mod lock;
pub mod property;
pub mod registry;
pub mod schema;
pub mod sync;
pub mod transport;
pub mod view;

// Re-export main types at crate root
pub use database::{BulkFailure, BulkResult, Database};
pub use document::{Document, EmbeddedValue, LinkRef};
pub use error::{Error, Result};
pub use lock::{LockManager, LockSet};
pub use property::{Property, PropertyKind};
pub use registry::{
    ClassDef, ClassKind, ClassSpec, IndexDef, IndexRef, Registry, RegistryBuilder, ViewDef,
    ViewRef,
};
pub use schema::Schema;
pub use transport::{Query, Response, Transport};
pub use view::{ViewQuery, ViewResult, ViewRow};

/// Type aliases for clarity
pub type DocumentId = String;
pub type Revision = String;
pub type TypeName = String;
pub type PropertyPath = String;
pub type SchemaVersion = u32;
