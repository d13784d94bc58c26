//! Immutable collection snapshots.
//!
//! A snapshot is the whole collection at one point in time. Nothing mutates a
//! snapshot in place: every helper here returns a new value, so the engine can
//! roll back by swapping an `Arc` instead of undoing a diff.

use crate::{error::SnapshotError, CollectionItem, CollectionKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Items of one collection plus the server's total count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSnapshot {
    items: Vec<CollectionItem>,
    total_count: usize,
}

impl CollectionSnapshot {
    /// The empty collection.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot whose total count is the number of items.
    pub fn from_items(items: Vec<CollectionItem>) -> Self {
        let total_count = items.len();
        Self { items, total_count }
    }

    /// Snapshot with an explicit total count. The count is raised to the
    /// item count if it is smaller.
    pub fn new(items: Vec<CollectionItem>, total_count: usize) -> Self {
        let total_count = total_count.max(items.len());
        Self { items, total_count }
    }

    pub fn items(&self) -> &[CollectionItem] {
        &self.items
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, item_id: &str) -> Option<&CollectionItem> {
        self.items.iter().find(|item| item.item_id == item_id)
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.get(item_id).is_some()
    }

    /// Cart line with the same `(product, variant)` pair as `item`.
    pub fn find_line(&self, item: &CollectionItem) -> Option<&CollectionItem> {
        self.items.iter().find(|existing| existing.same_line(item))
    }

    /// Sum of quantities.
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Sum of price times quantity over items with a known price.
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().filter_map(CollectionItem::line_total).sum()
    }

    /// New snapshot with `item` added.
    ///
    /// In the cart an item matching an existing `(product, variant)` pair
    /// increments that line instead of inserting a second one.
    pub fn with_added(&self, collection: CollectionKind, item: CollectionItem) -> Self {
        let mut items = self.items.clone();
        let mut total_count = self.total_count;

        let existing = match collection {
            CollectionKind::Cart => items.iter_mut().find(|line| line.same_line(&item)),
            CollectionKind::Wishlist => items.iter_mut().find(|e| e.item_id == item.item_id),
        };

        match existing {
            Some(line) if collection == CollectionKind::Cart => {
                line.quantity = line.quantity.saturating_add(item.quantity);
            }
            Some(_) => {}
            None => {
                items.push(item);
                total_count += 1;
            }
        }

        Self::new(items, total_count)
    }

    /// New snapshot with the quantity of `item_id` replaced.
    pub fn with_quantity(&self, item_id: &str, quantity: u32) -> Self {
        let items = self
            .items
            .iter()
            .map(|item| {
                if item.item_id == item_id {
                    CollectionItem {
                        quantity,
                        ..item.clone()
                    }
                } else {
                    item.clone()
                }
            })
            .collect();
        Self {
            items,
            total_count: self.total_count,
        }
    }

    /// New snapshot without `item_id`.
    pub fn without(&self, item_id: &str) -> Self {
        if !self.contains(item_id) {
            return self.clone();
        }
        let items: Vec<_> = self
            .items
            .iter()
            .filter(|item| item.item_id != item_id)
            .cloned()
            .collect();
        Self::new(items, self.total_count.saturating_sub(1))
    }

    /// Check the invariants of `collection`.
    pub fn validate(&self, collection: CollectionKind) -> Result<(), SnapshotError> {
        if self.total_count < self.items.len() {
            return Err(SnapshotError::CountMismatch {
                total: self.total_count,
                items: self.items.len(),
            });
        }

        let mut ids = HashSet::new();
        let mut lines = HashSet::new();
        for item in &self.items {
            if !ids.insert(item.item_id.as_str()) {
                return Err(SnapshotError::DuplicateItem(item.item_id.clone()));
            }
            if item.quantity < 1 {
                return Err(SnapshotError::QuantityBelowFloor(item.item_id.clone()));
            }
            match collection {
                CollectionKind::Cart => {
                    if !lines.insert((item.product_id.as_str(), item.variant.as_ref())) {
                        return Err(SnapshotError::DuplicateLine {
                            item_id: item.item_id.clone(),
                            product_id: item.product_id.clone(),
                        });
                    }
                }
                CollectionKind::Wishlist => {
                    if item.item_id != item.product_id {
                        return Err(SnapshotError::IdentityMismatch(item.item_id.clone()));
                    }
                }
            }
        }

        Ok(())
    }
}
