//! Remote collection service port.
//!
//! The remote service is authoritative. Every mutating call answers with the
//! full post-mutation listing in whatever wire shape the backend uses; the
//! [`Reconciler`](crate::Reconciler) turns that into a snapshot.

use crate::{
    error::{ServiceError, ServiceResult},
    CollectionItem, CollectionKind, ItemId, OperationKind,
};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Raw response body of the remote service.
pub type WireSnapshot = Value;

/// CRUD endpoints of the remote cart and wishlist collections.
#[async_trait]
pub trait CollectionService: Send + Sync {
    /// One page of the listing, 1-based.
    async fn fetch(
        &self,
        collection: CollectionKind,
        page: u32,
        limit: u32,
    ) -> ServiceResult<WireSnapshot>;

    async fn add(
        &self,
        collection: CollectionKind,
        item: &CollectionItem,
    ) -> ServiceResult<WireSnapshot>;

    /// Cart only.
    async fn update_quantity(
        &self,
        collection: CollectionKind,
        item_id: &str,
        quantity: u32,
    ) -> ServiceResult<WireSnapshot>;

    async fn remove(&self, collection: CollectionKind, item_id: &str)
        -> ServiceResult<WireSnapshot>;

    async fn clear(&self, collection: CollectionKind) -> ServiceResult<()>;

    async fn check_membership(&self, collection: CollectionKind, item_id: &str)
        -> ServiceResult<bool>;
}

#[async_trait]
impl<T: CollectionService + ?Sized> CollectionService for Arc<T> {
    async fn fetch(
        &self,
        collection: CollectionKind,
        page: u32,
        limit: u32,
    ) -> ServiceResult<WireSnapshot> {
        (**self).fetch(collection, page, limit).await
    }

    async fn add(
        &self,
        collection: CollectionKind,
        item: &CollectionItem,
    ) -> ServiceResult<WireSnapshot> {
        (**self).add(collection, item).await
    }

    async fn update_quantity(
        &self,
        collection: CollectionKind,
        item_id: &str,
        quantity: u32,
    ) -> ServiceResult<WireSnapshot> {
        (**self).update_quantity(collection, item_id, quantity).await
    }

    async fn remove(
        &self,
        collection: CollectionKind,
        item_id: &str,
    ) -> ServiceResult<WireSnapshot> {
        (**self).remove(collection, item_id).await
    }

    async fn clear(&self, collection: CollectionKind) -> ServiceResult<()> {
        (**self).clear(collection).await
    }

    async fn check_membership(
        &self,
        collection: CollectionKind,
        item_id: &str,
    ) -> ServiceResult<bool> {
        (**self).check_membership(collection, item_id).await
    }
}

/// A call received by a [`MemoryService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCall {
    pub collection: CollectionKind,
    pub operation: OperationKind,
    pub item_id: Option<ItemId>,
}

#[derive(Debug, Default)]
struct MemoryState {
    cart: Vec<CollectionItem>,
    wishlist: Vec<CollectionItem>,
    failure: Option<ServiceError>,
    calls: Vec<ServiceCall>,
}

impl MemoryState {
    fn items_mut(&mut self, collection: CollectionKind) -> &mut Vec<CollectionItem> {
        match collection {
            CollectionKind::Cart => &mut self.cart,
            CollectionKind::Wishlist => &mut self.wishlist,
        }
    }

    fn items(&self, collection: CollectionKind) -> &[CollectionItem] {
        match collection {
            CollectionKind::Cart => &self.cart,
            CollectionKind::Wishlist => &self.wishlist,
        }
    }
}

/// In-process authoritative collection service.
///
/// Answers in the same shapes a real backend does (nested cart lines,
/// flattened wishlist products) and can be switched into a failing mode to
/// simulate an unreachable network.
#[derive(Debug, Default)]
pub struct MemoryService {
    state: Mutex<MemoryState>,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the server-side contents of `collection`.
    pub fn seed(&self, collection: CollectionKind, items: Vec<CollectionItem>) {
        *self.lock().items_mut(collection) = items;
    }

    /// Fail every following call with `error`, or stop failing with `None`.
    pub fn set_failure(&self, error: Option<ServiceError>) {
        self.lock().failure = error;
    }

    /// Server-side contents of `collection`.
    pub fn items(&self, collection: CollectionKind) -> Vec<CollectionItem> {
        self.lock().items(collection).to_vec()
    }

    /// Every call received so far, including failed ones.
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.lock().calls.clone()
    }

    /// Number of calls of `operation` received so far.
    pub fn call_count(&self, operation: OperationKind) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    /// Wire body of the current listing of `collection`.
    pub fn render(&self, collection: CollectionKind) -> WireSnapshot {
        let state = self.lock();
        render(collection, state.items(collection), 1, u32::MAX)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log the call and fail it if a failure is configured.
    fn begin(
        &self,
        collection: CollectionKind,
        operation: OperationKind,
        item_id: Option<&str>,
    ) -> ServiceResult<MutexGuard<'_, MemoryState>> {
        let mut state = self.lock();
        state.calls.push(ServiceCall {
            collection,
            operation,
            item_id: item_id.map(str::to_string),
        });
        if let Some(error) = state.failure.clone() {
            return Err(error);
        }
        Ok(state)
    }
}

#[async_trait]
impl CollectionService for MemoryService {
    async fn fetch(
        &self,
        collection: CollectionKind,
        page: u32,
        limit: u32,
    ) -> ServiceResult<WireSnapshot> {
        let state = self.begin(collection, OperationKind::Fetch, None)?;
        Ok(render(collection, state.items(collection), page, limit))
    }

    async fn add(
        &self,
        collection: CollectionKind,
        item: &CollectionItem,
    ) -> ServiceResult<WireSnapshot> {
        let mut state = self.begin(collection, OperationKind::Add, Some(&item.item_id))?;
        let items = state.items_mut(collection);
        match collection {
            CollectionKind::Cart => {
                if let Some(line) = items.iter_mut().find(|line| line.same_line(item)) {
                    line.quantity = line.quantity.saturating_add(item.quantity);
                } else {
                    items.push(item.clone());
                }
            }
            CollectionKind::Wishlist => {
                if !items.iter().any(|entry| entry.item_id == item.item_id) {
                    let mut entry = item.clone();
                    entry.added_at.get_or_insert_with(Utc::now);
                    items.push(entry);
                }
            }
        }
        Ok(render(collection, items, 1, u32::MAX))
    }

    async fn update_quantity(
        &self,
        collection: CollectionKind,
        item_id: &str,
        quantity: u32,
    ) -> ServiceResult<WireSnapshot> {
        let mut state = self.begin(collection, OperationKind::UpdateQuantity, Some(item_id))?;
        let items = state.items_mut(collection);
        match items.iter_mut().find(|item| item.item_id == item_id) {
            Some(item) => item.quantity = quantity,
            None => {
                return Err(ServiceError::Status {
                    status: 404,
                    message: format!("item {item_id} not found"),
                })
            }
        }
        Ok(render(collection, items, 1, u32::MAX))
    }

    async fn remove(
        &self,
        collection: CollectionKind,
        item_id: &str,
    ) -> ServiceResult<WireSnapshot> {
        let mut state = self.begin(collection, OperationKind::Remove, Some(item_id))?;
        let items = state.items_mut(collection);
        items.retain(|item| item.item_id != item_id);
        Ok(render(collection, items, 1, u32::MAX))
    }

    async fn clear(&self, collection: CollectionKind) -> ServiceResult<()> {
        let mut state = self.begin(collection, OperationKind::Clear, None)?;
        state.items_mut(collection).clear();
        Ok(())
    }

    async fn check_membership(
        &self,
        collection: CollectionKind,
        item_id: &str,
    ) -> ServiceResult<bool> {
        let state = self.begin(collection, OperationKind::CheckMembership, Some(item_id))?;
        Ok(state
            .items(collection)
            .iter()
            .any(|item| item.item_id == item_id))
    }
}

/// Render a page of items the way the backend does.
fn render(collection: CollectionKind, items: &[CollectionItem], page: u32, limit: u32) -> Value {
    let skip = (page.max(1) as usize - 1).saturating_mul(limit as usize);
    let entries: Vec<Value> = items
        .iter()
        .skip(skip)
        .take(limit as usize)
        .map(|item| match collection {
            CollectionKind::Cart => cart_line_json(item),
            CollectionKind::Wishlist => wishlist_entry_json(item),
        })
        .collect();

    match collection {
        CollectionKind::Cart => json!({ "items": entries, "totalCount": items.len() }),
        CollectionKind::Wishlist => json!({ "data": entries, "total": items.len() }),
    }
}

fn product_json(item: &CollectionItem) -> Value {
    let mut product = json!({ "_id": item.product_id });
    if let Value::Object(map) = &mut product {
        if let Some(name) = &item.name {
            map.insert("name".into(), json!(name));
        }
        if let Some(price) = item.price {
            map.insert("price".into(), json!(price.to_string()));
        }
        if let Some(image) = &item.image {
            map.insert("image".into(), json!(image));
        }
        if let Some(brand) = &item.brand {
            map.insert("brand".into(), json!(brand));
        }
    }
    product
}

fn cart_line_json(item: &CollectionItem) -> Value {
    let mut line = json!({
        "_id": item.item_id,
        "product": product_json(item),
        "quantity": item.quantity,
    });
    if let (Value::Object(map), Some(variant)) = (&mut line, &item.variant) {
        if let Some(size) = &variant.size {
            map.insert("size".into(), json!(size));
        }
        if let Some(color) = &variant.color {
            map.insert("color".into(), json!(color));
        }
    }
    line
}

fn wishlist_entry_json(item: &CollectionItem) -> Value {
    let mut entry = product_json(item);
    if let (Value::Object(map), Some(added_at)) = (&mut entry, item.added_at) {
        map.insert(
            "wishlistAddedAt".into(),
            json!(added_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        );
    }
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CollectionSnapshot, Reconciler, Variant};

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[test]
    fn cart_render_reconciles_back() {
        let service = MemoryService::new();
        let item = CollectionItem::cart_line("l-1", "p-1", 2)
            .with_name("Shirt")
            .with_variant(Variant::new(Some("M".into()), None));
        service.seed(CollectionKind::Cart, vec![item.clone()]);

        let snapshot = Reconciler::new(CollectionKind::Cart).reconcile(&service.render(CollectionKind::Cart));
        assert_eq!(snapshot, CollectionSnapshot::from_items(vec![item]));
    }

    #[test]
    fn wishlist_add_stamps_time_and_is_idempotent() {
        let service = MemoryService::new();
        let entry = CollectionItem::wishlist_entry("p-1");

        block_on(service.add(CollectionKind::Wishlist, &entry)).unwrap();
        let wire = block_on(service.add(CollectionKind::Wishlist, &entry)).unwrap();

        let snapshot = Reconciler::new(CollectionKind::Wishlist).reconcile(&wire);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.items()[0].added_at.is_some());
        assert_eq!(service.items(CollectionKind::Wishlist), snapshot.items());
    }

    #[test]
    fn cart_add_merges_lines() {
        let service = MemoryService::new();
        block_on(service.add(CollectionKind::Cart, &CollectionItem::cart_line("l-1", "p-1", 1))).unwrap();
        block_on(service.add(CollectionKind::Cart, &CollectionItem::cart_line("l-2", "p-1", 2))).unwrap();

        let items = service.items(CollectionKind::Cart);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 3);
    }

    #[test]
    fn failure_mode_logs_and_fails() {
        let service = MemoryService::new();
        service.set_failure(Some(ServiceError::Timeout));

        let result = block_on(service.remove(CollectionKind::Cart, "l-1"));
        assert_eq!(result, Err(ServiceError::Timeout));
        assert_eq!(service.call_count(OperationKind::Remove), 1);
    }

    #[test]
    fn fetch_pages() {
        let service = MemoryService::new();
        service.seed(
            CollectionKind::Wishlist,
            (0..5).map(|i| CollectionItem::wishlist_entry(format!("p-{i}"))).collect(),
        );

        let page = block_on(service.fetch(CollectionKind::Wishlist, 2, 2)).unwrap();
        let snapshot = Reconciler::new(CollectionKind::Wishlist).reconcile(&page);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.total_count(), 5);
        assert_eq!(snapshot.items()[0].item_id, "p-2");
    }
}
