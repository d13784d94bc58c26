//! Error types for the basket engine.

use crate::{CollectionKind, ItemId, OperationKind};
use thiserror::Error;

/// Errors returned to callers of the [`SyncEngine`](crate::SyncEngine).
///
/// Only [`SyncError::NetworkFailure`] ever follows an optimistic update, and it
/// is always paired with a complete rollback of store and cache.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("{operation} on {collection} rejected: {rejection}")]
    ValidationRejected {
        operation: OperationKind,
        collection: CollectionKind,
        rejection: Rejection,
    },

    #[error(
        "{operation} on {collection} failed for {}: {source}",
        .item_id.as_deref().unwrap_or("the whole collection")
    )]
    NetworkFailure {
        operation: OperationKind,
        collection: CollectionKind,
        item_id: Option<ItemId>,
        source: ServiceError,
    },
}

impl SyncError {
    /// The operation that was attempted.
    pub fn operation(&self) -> OperationKind {
        match self {
            SyncError::ValidationRejected { operation, .. } => *operation,
            SyncError::NetworkFailure { operation, .. } => *operation,
        }
    }

    /// The collection the operation targeted.
    pub fn collection(&self) -> CollectionKind {
        match self {
            SyncError::ValidationRejected { collection, .. } => *collection,
            SyncError::NetworkFailure { collection, .. } => *collection,
        }
    }

    /// Item the failed operation referenced, if any.
    pub fn item_id(&self) -> Option<&str> {
        match self {
            SyncError::ValidationRejected { rejection, .. } => rejection.item_id(),
            SyncError::NetworkFailure { item_id, .. } => item_id.as_deref(),
        }
    }

    /// Whether re-triggering the same action may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::NetworkFailure { .. })
    }
}

/// Why a mutation was refused before any network call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("quantity {0} is below the floor of 1")]
    QuantityBelowFloor(i64),

    #[error("quantity {0} is out of range")]
    QuantityOutOfRange(i64),

    #[error("item not in collection: {0}")]
    NotInCollection(ItemId),

    #[error("wishlist item id '{item_id}' does not match product id '{product_id}'")]
    IdentityMismatch { item_id: ItemId, product_id: String },

    #[error("operation not supported for this collection")]
    Unsupported,
}

impl Rejection {
    fn item_id(&self) -> Option<&str> {
        match self {
            Rejection::NotInCollection(id) => Some(id),
            Rejection::IdentityMismatch { item_id, .. } => Some(item_id),
            _ => None,
        }
    }
}

/// Failure reported by a [`CollectionService`](crate::CollectionService).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("service responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("undecodable response: {0}")]
    Decode(String),
}

/// Failure of the durable cache boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(String),

    #[error("cache encode error: {0}")]
    Encode(String),
}

/// A snapshot that violates the invariants of its collection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("duplicate item id: {0}")]
    DuplicateItem(ItemId),

    #[error("duplicate cart line for product {product_id} (item {item_id})")]
    DuplicateLine { item_id: ItemId, product_id: String },

    #[error("item {0} has quantity below 1")]
    QuantityBelowFloor(ItemId),

    #[error("wishlist item {0} does not use its product id as identity")]
    IdentityMismatch(ItemId),

    #[error("total count {total} is smaller than item count {items}")]
    CountMismatch { total: usize, items: usize },
}

/// Result type for remote service calls.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;
