//! Store - the in-memory state container.
//!
//! The store holds one snapshot per collection plus the bookkeeping the UI
//! needs (loading, last error). It contains no business logic: the engine
//! decides what to install, the store only records it through one reducer
//! per lifecycle step.

use crate::{error::SyncError, CollectionItem, CollectionKind, CollectionSnapshot};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where the current confirmed state of a collection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hydration {
    /// Nothing cached and never confirmed by the server
    #[default]
    Unknown,
    /// Restored from the durable cache
    Cache,
    /// Confirmed by the remote service
    Remote,
}

/// State of one collection.
#[derive(Debug, Clone, Default)]
pub struct CollectionState {
    snapshot: Arc<CollectionSnapshot>,
    /// Last snapshot not carrying unconfirmed tentative data
    confirmed: Arc<CollectionSnapshot>,
    in_flight: usize,
    last_error: Option<SyncError>,
    hydration: Hydration,
    /// Bumped by every teardown; settlements of an older epoch are stale.
    epoch: u64,
}

impl CollectionState {
    pub fn snapshot(&self) -> &Arc<CollectionSnapshot> {
        &self.snapshot
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    pub fn last_error(&self) -> Option<&SyncError> {
        self.last_error.as_ref()
    }

    pub fn hydration(&self) -> Hydration {
        self.hydration
    }

    pub fn confirmed(&self) -> &Arc<CollectionSnapshot> {
        &self.confirmed
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn finish_one(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}

/// Owned copy of what the UI reads for one collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionView {
    pub collection: CollectionKind,
    pub items: Vec<CollectionItem>,
    pub total_count: usize,
    pub total_quantity: u64,
    pub subtotal: Decimal,
    pub is_loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub hydration: Hydration,
}

/// The cart and wishlist state.
#[derive(Debug, Clone, Default)]
pub struct CollectionStore {
    cart: CollectionState,
    wishlist: CollectionState,
    revision: u64,
}

impl CollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, collection: CollectionKind) -> &CollectionState {
        match collection {
            CollectionKind::Cart => &self.cart,
            CollectionKind::Wishlist => &self.wishlist,
        }
    }

    fn state_mut(&mut self, collection: CollectionKind) -> &mut CollectionState {
        self.revision += 1;
        match collection {
            CollectionKind::Cart => &mut self.cart,
            CollectionKind::Wishlist => &mut self.wishlist,
        }
    }

    // ---- selectors ----

    /// Current snapshot (confirmed or tentative).
    pub fn snapshot(&self, collection: CollectionKind) -> Arc<CollectionSnapshot> {
        Arc::clone(&self.state(collection).snapshot)
    }

    pub fn items(&self, collection: CollectionKind) -> &[CollectionItem] {
        self.state(collection).snapshot.items()
    }

    pub fn total_count(&self, collection: CollectionKind) -> usize {
        self.state(collection).snapshot.total_count()
    }

    pub fn is_loading(&self, collection: CollectionKind) -> bool {
        self.state(collection).is_loading()
    }

    pub fn last_error(&self, collection: CollectionKind) -> Option<&SyncError> {
        self.state(collection).last_error()
    }

    pub fn is_member(&self, collection: CollectionKind, item_id: &str) -> bool {
        self.state(collection).snapshot.contains(item_id)
    }

    pub fn hydration(&self, collection: CollectionKind) -> Hydration {
        self.state(collection).hydration
    }

    /// Sum of cart quantities.
    pub fn total_quantity(&self) -> u64 {
        self.cart.snapshot.total_quantity()
    }

    /// Cart subtotal over priced lines.
    pub fn subtotal(&self) -> Decimal {
        self.cart.snapshot.subtotal()
    }

    /// Teardown generation of `collection`.
    pub fn epoch(&self, collection: CollectionKind) -> u64 {
        self.state(collection).epoch
    }

    /// Bumped by every reducer call.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn view(&self, collection: CollectionKind) -> CollectionView {
        let state = self.state(collection);
        CollectionView {
            collection,
            items: state.snapshot.items().to_vec(),
            total_count: state.snapshot.total_count(),
            total_quantity: state.snapshot.total_quantity(),
            subtotal: state.snapshot.subtotal(),
            is_loading: state.is_loading(),
            last_error: state.last_error.as_ref().map(ToString::to_string),
            hydration: state.hydration,
        }
    }

    // ---- reducers ----

    /// Install a snapshot restored at start.
    pub fn hydrate(&mut self, collection: CollectionKind, snapshot: CollectionSnapshot, hydration: Hydration) {
        let state = self.state_mut(collection);
        state.snapshot = Arc::new(snapshot);
        state.confirmed = Arc::clone(&state.snapshot);
        state.hydration = hydration;
    }

    /// A mutation started: show its tentative snapshot.
    pub fn pending(&mut self, collection: CollectionKind, tentative: Arc<CollectionSnapshot>) {
        let state = self.state_mut(collection);
        state.snapshot = tentative;
        state.in_flight += 1;
        state.last_error = None;
    }

    /// A remote call succeeded: the server snapshot replaces whatever is shown.
    pub fn settle_success(&mut self, collection: CollectionKind, confirmed: Arc<CollectionSnapshot>) {
        let state = self.state_mut(collection);
        state.confirmed = Arc::clone(&confirmed);
        state.snapshot = confirmed;
        state.hydration = Hydration::Remote;
        state.finish_one();
    }

    /// A remote call failed: restore the prior snapshot wholesale.
    ///
    /// When nothing else is in flight the last confirmed snapshot is
    /// installed instead, since `prior` may hold the tentative state of an
    /// overlapping mutation that failed too. Returns what is now shown.
    pub fn settle_failure(
        &mut self,
        collection: CollectionKind,
        prior: Arc<CollectionSnapshot>,
        error: SyncError,
    ) -> Arc<CollectionSnapshot> {
        let state = self.state_mut(collection);
        state.finish_one();
        state.snapshot = if state.in_flight == 0 {
            Arc::clone(&state.confirmed)
        } else {
            prior
        };
        state.last_error = Some(error);
        Arc::clone(&state.snapshot)
    }

    /// A refresh started. The shown snapshot is kept.
    pub fn begin_refresh(&mut self, collection: CollectionKind) {
        let state = self.state_mut(collection);
        state.in_flight += 1;
        state.last_error = None;
    }

    /// A refresh failed. Nothing was installed, so nothing is restored.
    pub fn refresh_failed(&mut self, collection: CollectionKind, error: SyncError) {
        let state = self.state_mut(collection);
        state.last_error = Some(error);
        state.finish_one();
    }

    /// Tear the collection down (explicit sign-out).
    ///
    /// Operations still in flight are orphaned: the epoch moves on, so
    /// their settlements no longer touch this state.
    pub fn reset(&mut self, collection: CollectionKind) {
        let state = self.state_mut(collection);
        state.snapshot = Arc::new(CollectionSnapshot::empty());
        state.confirmed = Arc::clone(&state.snapshot);
        state.in_flight = 0;
        state.last_error = None;
        state.hydration = Hydration::Unknown;
        state.epoch += 1;
    }
}
