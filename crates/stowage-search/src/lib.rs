//! Search index lifecycle management for stowage.
//!
//! Queries always go through a stable alias (e.g. `charms`). Behind it sits
//! exactly one physical index generation (e.g. `charms-000001`). This crate
//! creates, promotes and retires those generations without downtime and
//! without a lock service: the only synchronisation is a compare-and-swap
//! on a single version document per alias, kept in the search store itself.
//!
//! # Architecture
//!
//! - [`SearchStore`] is the set of primitives the external store must offer:
//!   revisioned documents with conditional writes, index creation and
//!   deletion, atomic alias retargeting.
//! - [`IndexVersionStore`] reads and conditionally writes the version
//!   document for one alias and provisions fresh physical indexes.
//! - [`IndexLifecycleManager`] runs the bounded CAS retry loop in
//!   [`ensure_indexes`](IndexLifecycleManager::ensure_indexes).
//!
//! # Modules
//!
//! - [`error`] -- Error types for index operations
//! - [`store`] -- The [`SearchStore`] trait
//! - [`memory`] -- In-memory [`InMemorySearchStore`] for tests and embedding
//! - [`version`] -- [`IndexVersion`] and [`IndexVersionStore`]
//! - [`names`] -- Alias/index name validation and generation
//! - [`config`] -- [`LifecycleConfig`]
//! - [`lifecycle`] -- [`IndexLifecycleManager`]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod names;
pub mod store;
pub mod version;

pub use config::LifecycleConfig;
pub use error::{SearchError, SearchResult};
pub use lifecycle::{EnsureOutcome, IndexLifecycleManager};
pub use memory::{InMemorySearchStore, StoreEvent};
pub use names::{
    validate_alias_name, validate_index_name, IndexNameGenerator, SequentialIndexNames,
    UniqueIndexNames,
};
pub use store::{CasOutcome, SearchStore, VersionedDocument};
pub use version::{IndexVersion, IndexVersionStore};
