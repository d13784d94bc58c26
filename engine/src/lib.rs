//! # Basket Engine
//!
//! Optimistic synchronization of a shopping cart and wishlist against an
//! authoritative remote service.
//!
//! Mutations show up in the local store immediately, survive restarts
//! through a durable cache, and are either confirmed by the server (whose
//! snapshot then replaces local state) or rolled back to exactly what was
//! shown before.
//!
//! ## Design Principles
//!
//! - **Server wins**: a confirmed response replaces the collection, never merges
//! - **Snapshot rollback**: failures restore the captured prior snapshot wholesale
//! - **Ports at the edges**: network and persistence are traits ([`CollectionService`],
//!   [`DurableCache`]); the engine itself knows no transport
//! - **Total reconciliation**: any response shape produces a valid snapshot
//!
//! ## Core Concepts
//!
//! ### Snapshots
//!
//! A [`CollectionSnapshot`] is an immutable list of [`CollectionItem`]s plus
//! the server's total count. The store only ever swaps whole snapshots.
//!
//! ### Mutations
//!
//! Changes are expressed as [`Mutation`]s whose tentative effect is a pure
//! function of the prior snapshot:
//! - [`Mutation::Add`] - add an item (cart lines with the same product and
//!   variant merge quantities)
//! - [`Mutation::UpdateQuantity`] - set a cart line's quantity
//! - [`Mutation::Remove`] - remove one item
//! - [`Mutation::Clear`] - empty the collection
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] normalizes server responses (nested or flattened
//! entries, assorted envelopes) into a canonical snapshot.
//!
//! ## Quick Start
//!
//! ```rust
//! use basket_engine::{
//!     CollectionItem, CollectionKind, EngineConfig, MemoryCache, MemoryService, SyncEngine,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let engine = SyncEngine::new(MemoryService::new(), MemoryCache::new(), EngineConfig::default());
//!
//! engine
//!     .toggle(CollectionKind::Wishlist, CollectionItem::wishlist_entry("p-1"))
//!     .await
//!     .unwrap();
//!
//! assert!(engine.is_member(CollectionKind::Wishlist, "p-1"));
//! # });
//! ```

pub mod cache;
pub mod engine;
pub mod error;
pub mod item;
pub mod operation;
pub mod reconcile;
pub mod service;
pub mod snapshot;
pub mod store;

// Re-export main types at crate root
pub use cache::{DurableCache, MemoryCache, SnapshotCache, CACHE_FORMAT_VERSION};
pub use engine::{EngineConfig, SyncEngine};
pub use error::{CacheError, Rejection, ServiceError, ServiceResult, SnapshotError, SyncError};
pub use item::{line_key, CollectionItem, CollectionKind, Variant};
pub use operation::{Mutation, MutationOutcome, OperationKind, PendingMutation};
pub use reconcile::Reconciler;
pub use service::{CollectionService, MemoryService, ServiceCall, WireSnapshot};
pub use snapshot::CollectionSnapshot;
pub use store::{CollectionState, CollectionStore, CollectionView, Hydration};

/// Type aliases for clarity
pub type ItemId = String;
pub type ProductId = String;
pub type Timestamp = chrono::DateTime<chrono::Utc>;
