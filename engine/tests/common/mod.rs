//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use basket_engine::{
    CollectionItem, CollectionKind, CollectionService, EngineConfig, MemoryCache, MemoryService,
    OperationKind, ServiceResult, SyncEngine, WireSnapshot,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

pub type GatedEngine = SyncEngine<Arc<GatedService>, Arc<MemoryCache>>;

/// A [`MemoryService`] whose calls can be parked and released one by one.
///
/// While held, every call waits at the gate before reaching the backing
/// service, so the order of releases is the order in which the server
/// applies them.
#[derive(Default)]
pub struct GatedService {
    backend: MemoryService,
    held: AtomicBool,
    parked: Mutex<Vec<oneshot::Sender<()>>>,
}

impl GatedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(&self) -> &MemoryService {
        &self.backend
    }

    /// Start parking calls.
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Number of calls currently parked.
    pub fn parked(&self) -> usize {
        self.parked.lock().unwrap().len()
    }

    /// Yield until at least `count` calls are parked.
    pub async fn wait_parked(&self, count: usize) {
        while self.parked() < count {
            tokio::task::yield_now().await;
        }
    }

    /// Yield until the backing service has seen `count` calls of `operation`.
    pub async fn wait_calls(&self, operation: OperationKind, count: usize) {
        while self.backend.call_count(operation) < count {
            tokio::task::yield_now().await;
        }
    }

    /// Let the `index`-th parked call (arrival order) through.
    pub fn release(&self, index: usize) {
        let gate = self.parked.lock().unwrap().remove(index);
        let _ = gate.send(());
    }

    async fn gate(&self) {
        if !self.held.load(Ordering::SeqCst) {
            return;
        }
        let (tx, rx) = oneshot::channel();
        self.parked.lock().unwrap().push(tx);
        let _ = rx.await;
    }
}

#[async_trait]
impl CollectionService for GatedService {
    async fn fetch(
        &self,
        collection: CollectionKind,
        page: u32,
        limit: u32,
    ) -> ServiceResult<WireSnapshot> {
        self.gate().await;
        self.backend.fetch(collection, page, limit).await
    }

    async fn add(
        &self,
        collection: CollectionKind,
        item: &CollectionItem,
    ) -> ServiceResult<WireSnapshot> {
        self.gate().await;
        self.backend.add(collection, item).await
    }

    async fn update_quantity(
        &self,
        collection: CollectionKind,
        item_id: &str,
        quantity: u32,
    ) -> ServiceResult<WireSnapshot> {
        self.gate().await;
        self.backend.update_quantity(collection, item_id, quantity).await
    }

    async fn remove(
        &self,
        collection: CollectionKind,
        item_id: &str,
    ) -> ServiceResult<WireSnapshot> {
        self.gate().await;
        self.backend.remove(collection, item_id).await
    }

    async fn clear(&self, collection: CollectionKind) -> ServiceResult<()> {
        self.gate().await;
        self.backend.clear(collection).await
    }

    async fn check_membership(
        &self,
        collection: CollectionKind,
        item_id: &str,
    ) -> ServiceResult<bool> {
        self.gate().await;
        self.backend.check_membership(collection, item_id).await
    }
}

pub fn gated_engine() -> (GatedEngine, Arc<GatedService>, Arc<MemoryCache>) {
    let service = Arc::new(GatedService::new());
    let cache = Arc::new(MemoryCache::new());
    let engine = SyncEngine::new(
        Arc::clone(&service),
        Arc::clone(&cache),
        EngineConfig::default(),
    );
    (engine, service, cache)
}

/// A [`MemoryService`] whose listings are bare entry arrays without a count.
#[derive(Default)]
pub struct BareListingService {
    backend: MemoryService,
}

impl BareListingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(&self) -> &MemoryService {
        &self.backend
    }
}

#[async_trait]
impl CollectionService for BareListingService {
    async fn fetch(
        &self,
        collection: CollectionKind,
        page: u32,
        limit: u32,
    ) -> ServiceResult<WireSnapshot> {
        let wire = self.backend.fetch(collection, page, limit).await?;
        let entries = ["items", "data"]
            .iter()
            .find_map(|key| wire.get(*key).cloned())
            .unwrap_or_default();
        Ok(entries)
    }

    async fn add(
        &self,
        collection: CollectionKind,
        item: &CollectionItem,
    ) -> ServiceResult<WireSnapshot> {
        self.backend.add(collection, item).await
    }

    async fn update_quantity(
        &self,
        collection: CollectionKind,
        item_id: &str,
        quantity: u32,
    ) -> ServiceResult<WireSnapshot> {
        self.backend.update_quantity(collection, item_id, quantity).await
    }

    async fn remove(
        &self,
        collection: CollectionKind,
        item_id: &str,
    ) -> ServiceResult<WireSnapshot> {
        self.backend.remove(collection, item_id).await
    }

    async fn clear(&self, collection: CollectionKind) -> ServiceResult<()> {
        self.backend.clear(collection).await
    }

    async fn check_membership(
        &self,
        collection: CollectionKind,
        item_id: &str,
    ) -> ServiceResult<bool> {
        self.backend.check_membership(collection, item_id).await
    }
}
