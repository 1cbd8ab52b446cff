//! # Declarative
//!
//! A convergence engine for declarative resource management.
//!
//! A [`Catalog`] holds the desired state of one node as a graph of
//! [`Resource`]s. Each resource owns [`Property`] values that know how to
//! read the current state of one attribute through a [`Provider`], compare
//! it with the desired state, and write the desired state back. A
//! [`Transaction`] walks the catalog in dependency order, converging each
//! resource once, propagating refreshes along `notify`/`subscribe` edges and
//! skipping dependents of failed resources.
//!
//! ## Core Concepts
//!
//! - **Value**: closed union of attribute value shapes with explicit rendering
//! - **Property**: one convergent attribute (`retrieve`, `insync`, `sync`)
//! - **Resource**: identity, parameters, properties and a provider
//! - **TypeRegistry**: explicit name to [`TypeDescriptor`] registry
//! - **Catalog**: resources plus edges, convertible to and from documents
//! - **Transaction**: dependency-ordered application with rollback
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{ApplyOptions, Catalog, NoProgress, TypeDescriptor, TypeRegistry};
//!
//! let mut registry = TypeRegistry::new();
//! registry.register(
//!     TypeDescriptor::builder("setting")
//!         .property("value", declarative::Plain)
//!         .provider("memory", |_| Box::new(MemoryProvider::default()))
//!         .build(),
//! )?;
//!
//! let mut catalog = Catalog::from_document(document, &registry)?;
//! let report = catalog.apply(&ApplyOptions::default(), &mut NoProgress)?;
//! println!("{} changed", report.summary.changed);
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`Provider`]: reads and writes the real entity behind a resource
//! - [`PropertyKind`]: per-attribute munging, comparison and sync behavior
//! - [`ProgressCallback`]: receives progress updates
//!
//! This allows the engine to be used without hard dependencies on concrete
//! operating system backends or a particular UI.

pub mod catalog;
pub mod context;
pub mod document;
pub mod error;
pub mod graph;
pub mod property;
pub mod reference;
pub mod registry;
pub mod resource;
pub mod transaction;
pub mod types;
pub mod value;

// Re-export main types at crate root
pub use catalog::Catalog;
pub use context::{NoProgress, NullProvider, Parameters, ProgressCallback, PropertyContext, Provider};
pub use document::{AttributeValue, CatalogDocument, ResourceDocument};
pub use error::{Error, ErrorCategory, Result};
pub use graph::{Edge, RelationshipGraph};
pub use property::{Plain, Property, PropertyKind};
pub use reference::{CLASS_TYPE, ResourceRef, canonical_type};
pub use registry::{
    AttributeKind, METAPARAMS, ParamSpec, PROVIDER_PARAM, TypeBuilder, TypeDescriptor,
    TypeRegistry,
};
pub use resource::{Convergence, Resource};
pub use transaction::{Transaction, TransactionReport};
pub use types::{ApplyOptions, ApplyResult, Event, ExecuteSummary, TransactionState};
pub use value::{ABSENT, Value, ValueFormat, render_all};
