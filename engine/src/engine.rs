//! The optimistic mutation engine.
//!
//! Every mutation follows the same protocol:
//!
//! 1. Capture the prior snapshot from the store
//! 2. Compute the tentative snapshot (pure)
//! 3. Install it in the store and the durable cache, under one lock
//! 4. Call the remote service (the only suspension point)
//! 5. On success, install the reconciled server snapshot (replace, never merge)
//! 6. On failure, reinstall the prior snapshot and return the error
//!
//! There is no queue: overlapping mutations each install their tentative
//! state in issuance order, and whichever settlement arrives last decides
//! the final state. A failure that settles with nothing else in flight
//! falls back to the last confirmed snapshot, and settlements of operations
//! started before a [`SyncEngine::reset`] are dropped.

use crate::{
    cache::{DurableCache, SnapshotCache},
    error::{Rejection, Result, ServiceError, SyncError},
    service::{CollectionService, WireSnapshot},
    store::{CollectionStore, CollectionView, Hydration},
    CollectionItem, CollectionKind, CollectionSnapshot, Mutation, MutationOutcome, OperationKind,
    PendingMutation, Reconciler,
};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

/// Tunables of a [`SyncEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Items requested per page when refreshing
    pub page_size: u32,
    /// Upper bound on pages fetched by one refresh
    pub max_pages: u32,
    /// Prefix of the durable cache keys
    pub cache_namespace: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 10,
            cache_namespace: "basket".to_string(),
        }
    }
}

struct Shared<S, C> {
    service: S,
    cache: SnapshotCache<C>,
    store: Mutex<CollectionStore>,
    config: EngineConfig,
}

/// Keeps the cart and wishlist in sync across store, cache and server.
///
/// Cloning is cheap and every clone drives the same state, so an operation
/// can be spawned and left to settle on its own.
pub struct SyncEngine<S, C> {
    shared: Arc<Shared<S, C>>,
}

impl<S, C> Clone for SyncEngine<S, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

enum Start {
    Pending(PendingMutation),
    Settled(Result<MutationOutcome>),
}

impl<S: CollectionService, C: DurableCache> SyncEngine<S, C> {
    /// Create an engine, hydrating both collections from the cache.
    pub fn new(service: S, cache: C, config: EngineConfig) -> Self {
        let cache = SnapshotCache::new(cache, config.cache_namespace.clone());

        let mut store = CollectionStore::new();
        for collection in CollectionKind::ALL {
            match cache.load(collection) {
                Some(snapshot) => {
                    debug!(%collection, items = snapshot.len(), "hydrated from cache");
                    store.hydrate(collection, snapshot, Hydration::Cache);
                }
                None => store.hydrate(collection, CollectionSnapshot::empty(), Hydration::Unknown),
            }
        }

        Self {
            shared: Arc::new(Shared {
                service,
                cache,
                store: Mutex::new(store),
                config,
            }),
        }
    }

    pub fn service(&self) -> &S {
        &self.shared.service
    }

    pub fn cache(&self) -> &SnapshotCache<C> {
        &self.shared.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    // ---- selectors ----

    /// Run `f` against the store.
    pub fn select<T>(&self, f: impl FnOnce(&CollectionStore) -> T) -> T {
        f(&self.lock())
    }

    pub fn snapshot(&self, collection: CollectionKind) -> Arc<CollectionSnapshot> {
        self.select(|store| store.snapshot(collection))
    }

    pub fn items(&self, collection: CollectionKind) -> Vec<CollectionItem> {
        self.select(|store| store.items(collection).to_vec())
    }

    pub fn total_count(&self, collection: CollectionKind) -> usize {
        self.select(|store| store.total_count(collection))
    }

    pub fn is_loading(&self, collection: CollectionKind) -> bool {
        self.select(|store| store.is_loading(collection))
    }

    pub fn last_error(&self, collection: CollectionKind) -> Option<SyncError> {
        self.select(|store| store.last_error(collection).cloned())
    }

    pub fn is_member(&self, collection: CollectionKind, item_id: &str) -> bool {
        self.select(|store| store.is_member(collection, item_id))
    }

    pub fn total_quantity(&self) -> u64 {
        self.select(CollectionStore::total_quantity)
    }

    pub fn subtotal(&self) -> Decimal {
        self.select(CollectionStore::subtotal)
    }

    pub fn view(&self, collection: CollectionKind) -> CollectionView {
        self.select(|store| store.view(collection))
    }

    // ---- operations ----

    /// Add `item`, or report that it is already present.
    #[instrument(skip(self, item), fields(item_id = %item.item_id))]
    pub async fn add(
        &self,
        collection: CollectionKind,
        mut item: CollectionItem,
    ) -> Result<MutationOutcome> {
        if item.quantity < 1 {
            return Err(rejected(
                OperationKind::Add,
                collection,
                Rejection::QuantityBelowFloor(0),
            ));
        }
        if collection == CollectionKind::Wishlist {
            if item.item_id != item.product_id {
                return Err(rejected(
                    OperationKind::Add,
                    collection,
                    Rejection::IdentityMismatch {
                        item_id: item.item_id,
                        product_id: item.product_id,
                    },
                ));
            }
            item.quantity = 1;
            item.variant = None;
        }

        self.execute(collection, Mutation::Add(item)).await
    }

    /// Set the quantity of a cart line. Quantities below 1 never leave the
    /// process; removal is [`SyncEngine::remove`].
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        collection: CollectionKind,
        item_id: &str,
        quantity: i64,
    ) -> Result<MutationOutcome> {
        let operation = OperationKind::UpdateQuantity;
        if collection != CollectionKind::Cart {
            return Err(rejected(operation, collection, Rejection::Unsupported));
        }
        if quantity < 1 {
            return Err(rejected(
                operation,
                collection,
                Rejection::QuantityBelowFloor(quantity),
            ));
        }
        let quantity = u32::try_from(quantity)
            .map_err(|_| rejected(operation, collection, Rejection::QuantityOutOfRange(quantity)))?;

        self.execute(
            collection,
            Mutation::UpdateQuantity {
                item_id: item_id.to_string(),
                quantity,
            },
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, collection: CollectionKind, item_id: &str) -> Result<MutationOutcome> {
        self.execute(
            collection,
            Mutation::Remove {
                item_id: item_id.to_string(),
            },
        )
        .await
    }

    /// Add `item` if it is not a member, remove it otherwise.
    ///
    /// Membership is read from the store, tentative state included, so a
    /// second toggle issued before the first settles undoes the first. Only a
    /// collection that was never hydrated asks the server.
    #[instrument(skip(self, item), fields(item_id = %item.item_id))]
    pub async fn toggle(
        &self,
        collection: CollectionKind,
        item: CollectionItem,
    ) -> Result<MutationOutcome> {
        let (local, revision) = self.select(|store| {
            let member = if store.is_member(collection, &item.item_id) {
                Some(true)
            } else if store.hydration(collection) == Hydration::Unknown {
                None
            } else {
                Some(false)
            };
            (member, store.revision())
        });

        let member = match local {
            Some(member) => member,
            None => {
                let remote = self
                    .shared
                    .service
                    .check_membership(collection, &item.item_id)
                    .await
                    .map_err(|source| SyncError::NetworkFailure {
                        operation: OperationKind::CheckMembership,
                        collection,
                        item_id: Some(item.item_id.clone()),
                        source,
                    })?;
                // Another operation touched the store while we waited: its
                // state is newer than the server's answer.
                self.select(|store| {
                    if store.revision() == revision {
                        remote
                    } else {
                        store.is_member(collection, &item.item_id)
                    }
                })
            }
        };

        debug!(member, "toggle resolved membership");
        if member {
            self.remove(collection, &item.item_id).await
        } else {
            self.add(collection, item).await
        }
    }

    /// Empty the collection.
    #[instrument(skip(self))]
    pub async fn clear(&self, collection: CollectionKind) -> Result<MutationOutcome> {
        self.execute(collection, Mutation::Clear).await
    }

    /// Replace the collection with the server's listing.
    ///
    /// Nothing tentative is installed, so a failure leaves the store as it
    /// was and only records the error.
    #[instrument(skip(self))]
    pub async fn refresh(&self, collection: CollectionKind) -> Result<Arc<CollectionSnapshot>> {
        let epoch = self.with_store(|store| {
            store.begin_refresh(collection);
            store.epoch(collection)
        });

        match self.fetch_all(collection).await {
            Ok(pages) => {
                let confirmed = Arc::new(Reconciler::new(collection).reconcile_pages(&pages));
                self.with_store(|store| {
                    if self.is_stale(store, collection, epoch) {
                        return;
                    }
                    store.settle_success(collection, Arc::clone(&confirmed));
                    self.persist(collection, &confirmed);
                });
                info!(items = confirmed.len(), pages = pages.len(), "refreshed from server");
                Ok(confirmed)
            }
            Err(source) => {
                let error = SyncError::NetworkFailure {
                    operation: OperationKind::Fetch,
                    collection,
                    item_id: None,
                    source,
                };
                warn!(error = %error, "refresh failed");
                self.with_store(|store| {
                    if !self.is_stale(store, collection, epoch) {
                        store.refresh_failed(collection, error.clone());
                    }
                });
                Err(error)
            }
        }
    }

    /// Drop local state of `collection` without telling the server.
    ///
    /// Operations still in flight keep running and report to their callers,
    /// but their settlements no longer reach the store or the cache.
    pub fn reset(&self, collection: CollectionKind) {
        self.with_store(|store| {
            store.reset(collection);
            if let Err(e) = self.shared.cache.evict(collection) {
                warn!(%collection, error = %e, "failed to evict cache entry");
            }
        });
        info!(%collection, "collection reset");
    }

    /// Tear down both collections.
    pub fn sign_out(&self) {
        for collection in CollectionKind::ALL {
            self.reset(collection);
        }
    }

    // ---- protocol ----

    async fn execute(&self, collection: CollectionKind, mutation: Mutation) -> Result<MutationOutcome> {
        let pending = match self.start(collection, &mutation) {
            Start::Pending(pending) => pending,
            Start::Settled(outcome) => return outcome,
        };
        debug!(
            operation = %pending.operation,
            items = pending.tentative.len(),
            "installed tentative snapshot"
        );

        let response = self.call_remote(collection, &mutation).await;

        match response {
            Ok(wire) => {
                let confirmed = Arc::new(match wire {
                    Some(wire) => Reconciler::new(collection).reconcile(&wire),
                    None => CollectionSnapshot::empty(),
                });
                self.with_store(|store| {
                    if self.is_stale(store, collection, pending.epoch) {
                        return;
                    }
                    store.settle_success(collection, Arc::clone(&confirmed));
                    self.persist(collection, &confirmed);
                });
                debug!(operation = %pending.operation, items = confirmed.len(), "confirmed by server");
                Ok(MutationOutcome::Confirmed {
                    operation: pending.operation,
                    snapshot: confirmed,
                })
            }
            Err(source) => {
                let error = SyncError::NetworkFailure {
                    operation: pending.operation,
                    collection,
                    item_id: mutation.item_id().cloned(),
                    source,
                };
                self.with_store(|store| {
                    if self.is_stale(store, collection, pending.epoch) {
                        return;
                    }
                    let restored =
                        store.settle_failure(collection, Arc::clone(&pending.prior), error.clone());
                    self.persist(collection, &restored);
                });
                warn!(error = %error, "remote call failed, rolled back");
                Err(error)
            }
        }
    }

    /// Steps 1-3 under one lock.
    fn start(&self, collection: CollectionKind, mutation: &Mutation) -> Start {
        self.with_store(|store| {
            let prior = store.snapshot(collection);

            match mutation {
                Mutation::Add(item) if prior.contains(&item.item_id) => {
                    debug!(item_id = %item.item_id, "already present, skipping add");
                    return Start::Settled(Ok(MutationOutcome::AlreadyPresent {
                        item_id: item.item_id.clone(),
                    }));
                }
                Mutation::UpdateQuantity { item_id, .. } if !prior.contains(item_id) => {
                    return Start::Settled(Err(rejected(
                        mutation.kind(),
                        collection,
                        Rejection::NotInCollection(item_id.clone()),
                    )));
                }
                _ => {}
            }

            let tentative = Arc::new(mutation.apply(collection, &prior));
            store.pending(collection, Arc::clone(&tentative));
            self.persist(collection, &tentative);

            Start::Pending(PendingMutation {
                prior,
                tentative,
                operation: mutation.kind(),
                epoch: store.epoch(collection),
            })
        })
    }

    /// Step 4. `None` means the call succeeded without a body.
    async fn call_remote(
        &self,
        collection: CollectionKind,
        mutation: &Mutation,
    ) -> std::result::Result<Option<WireSnapshot>, ServiceError> {
        let service = &self.shared.service;
        match mutation {
            Mutation::Add(item) => service.add(collection, item).await.map(Some),
            Mutation::UpdateQuantity { item_id, quantity } => service
                .update_quantity(collection, item_id, *quantity)
                .await
                .map(Some),
            Mutation::Remove { item_id } => service.remove(collection, item_id).await.map(Some),
            Mutation::Clear => service.clear(collection).await.map(|()| None),
        }
    }

    async fn fetch_all(
        &self,
        collection: CollectionKind,
    ) -> std::result::Result<Vec<WireSnapshot>, ServiceError> {
        let reconciler = Reconciler::new(collection);
        let limit = self.shared.config.page_size.max(1);
        let mut pages = Vec::new();
        let mut seen = 0usize;
        let mut total = None;

        for page in 1..=self.shared.config.max_pages.max(1) {
            let wire = self.shared.service.fetch(collection, page, limit).await?;
            let listed = reconciler.entry_count(&wire);
            total = total.or(reconciler.listed_total(&wire));
            pages.push(wire);

            // Bare arrays carry no count: only a short page ends those.
            seen += listed;
            let short = listed < limit as usize;
            if listed == 0 || short || total.is_some_and(|total| seen >= total) {
                break;
            }
        }

        Ok(pages)
    }

    /// Whether `collection` was reset since `epoch`. Stale settlements are dropped.
    fn is_stale(&self, store: &CollectionStore, collection: CollectionKind, epoch: u64) -> bool {
        let stale = store.epoch(collection) != epoch;
        if stale {
            debug!(%collection, "collection was reset meanwhile, dropping settlement");
        }
        stale
    }

    /// Cache writes never fail the operation; the next write retries them.
    fn persist(&self, collection: CollectionKind, snapshot: &CollectionSnapshot) {
        if let Err(e) = self.shared.cache.save(collection, snapshot) {
            warn!(%collection, error = %e, "cache write failed");
        }
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut CollectionStore) -> T) -> T {
        f(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, CollectionStore> {
        // Reducers only swap whole snapshots, so a poisoned store is still consistent.
        self.shared.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn rejected(operation: OperationKind, collection: CollectionKind, rejection: Rejection) -> SyncError {
    SyncError::ValidationRejected {
        operation,
        collection,
        rejection,
    }
}
