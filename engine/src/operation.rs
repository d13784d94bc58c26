//! Mutation intents and their outcomes.
//!
//! A [`Mutation`] describes what the caller wants. Applying it to a snapshot is
//! a pure function, which is what the engine installs as the tentative state
//! while the remote call is in flight.

use crate::{CollectionItem, CollectionKind, CollectionSnapshot, ItemId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of operation, carried in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Fetch,
    Add,
    UpdateQuantity,
    Remove,
    Clear,
    CheckMembership,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Fetch => "fetch",
            OperationKind::Add => "add",
            OperationKind::UpdateQuantity => "update_quantity",
            OperationKind::Remove => "remove",
            OperationKind::Clear => "clear",
            OperationKind::CheckMembership => "check_membership",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated local mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Add(CollectionItem),
    UpdateQuantity { item_id: ItemId, quantity: u32 },
    Remove { item_id: ItemId },
    Clear,
}

impl Mutation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Mutation::Add(_) => OperationKind::Add,
            Mutation::UpdateQuantity { .. } => OperationKind::UpdateQuantity,
            Mutation::Remove { .. } => OperationKind::Remove,
            Mutation::Clear => OperationKind::Clear,
        }
    }

    /// The item the mutation targets; `None` for whole-collection mutations.
    pub fn item_id(&self) -> Option<&ItemId> {
        match self {
            Mutation::Add(item) => Some(&item.item_id),
            Mutation::UpdateQuantity { item_id, .. } => Some(item_id),
            Mutation::Remove { item_id } => Some(item_id),
            Mutation::Clear => None,
        }
    }

    /// Compute the tentative snapshot. Never touches `prior`.
    pub fn apply(&self, collection: CollectionKind, prior: &CollectionSnapshot) -> CollectionSnapshot {
        match self {
            Mutation::Add(item) => prior.with_added(collection, item.clone()),
            Mutation::UpdateQuantity { item_id, quantity } => prior.with_quantity(item_id, *quantity),
            Mutation::Remove { item_id } => prior.without(item_id),
            Mutation::Clear => CollectionSnapshot::empty(),
        }
    }
}

/// Working record of one in-flight remote call. Dropped on settlement.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub prior: Arc<CollectionSnapshot>,
    pub tentative: Arc<CollectionSnapshot>,
    pub operation: OperationKind,
    /// Store epoch of the collection when the mutation started
    pub epoch: u64,
}

/// Successful result of a mutation entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The server confirmed the operation; `snapshot` is what the store now holds.
    Confirmed {
        operation: OperationKind,
        snapshot: Arc<CollectionSnapshot>,
    },
    /// `add` found the item already present; nothing was sent or changed.
    AlreadyPresent { item_id: ItemId },
}

impl MutationOutcome {
    /// The confirmed snapshot, if the operation went to the server.
    pub fn snapshot(&self) -> Option<&Arc<CollectionSnapshot>> {
        match self {
            MutationOutcome::Confirmed { snapshot, .. } => Some(snapshot),
            MutationOutcome::AlreadyPresent { .. } => None,
        }
    }

    pub fn operation(&self) -> OperationKind {
        match self {
            MutationOutcome::Confirmed { operation, .. } => *operation,
            MutationOutcome::AlreadyPresent { .. } => OperationKind::Add,
        }
    }
}
