//! End-to-end tests: engine, HTTP adapter and file cache against a local backend.

mod common;

use basket_client::{FileCache, HttpCollectionService};
use basket_engine::{
    line_key, CollectionItem, CollectionKind, CollectionService, EngineConfig, Hydration,
    OperationKind, Reconciler, ServiceError, SyncEngine, SyncError, Variant,
};
use common::{Backend, TOKEN};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

type Engine = SyncEngine<HttpCollectionService, FileCache>;

fn http(base: &str, token: Option<&str>, timeout: Duration) -> HttpCollectionService {
    HttpCollectionService::new(base, token.map(str::to_string), timeout).unwrap()
}

fn engine(base: &str, dir: &Path, config: EngineConfig) -> Engine {
    SyncEngine::new(
        http(base, Some(TOKEN), Duration::from_secs(5)),
        FileCache::new(dir),
        config,
    )
}

fn server_snapshot(backend: &Backend, collection: CollectionKind) -> basket_engine::CollectionSnapshot {
    Reconciler::new(collection).reconcile(&backend.service.render(collection))
}

fn cart_line(product: &str, quantity: u32) -> CollectionItem {
    CollectionItem::cart_line(line_key(product, None), product, quantity)
}

// ============================================================================
// Round Trips
// ============================================================================

#[tokio::test]
async fn cart_lifecycle() {
    let backend = Backend::new();
    let base = common::spawn(backend.clone()).await;
    let dir = TempDir::new().unwrap();
    let engine = engine(&base, dir.path(), EngineConfig::default());

    engine
        .add(CollectionKind::Cart, cart_line("p-1", 1))
        .await
        .unwrap();
    let medium = Variant::new(Some("M".into()), None);
    engine
        .add(
            CollectionKind::Cart,
            CollectionItem::cart_line(line_key("p-2", Some(&medium)), "p-2", 2)
                .with_variant(medium),
        )
        .await
        .unwrap();
    engine
        .update_quantity(CollectionKind::Cart, "p-1", 4)
        .await
        .unwrap();
    engine.remove(CollectionKind::Cart, "p-2:M").await.unwrap();

    assert_eq!(
        *engine.snapshot(CollectionKind::Cart),
        server_snapshot(&backend, CollectionKind::Cart)
    );
    assert_eq!(engine.total_quantity(), 4);
    assert_eq!(
        backend.requests(),
        vec![
            "POST /cart",
            "POST /cart",
            "PATCH /cart/p-1",
            "DELETE /cart/p-2:M",
        ]
    );

    engine.clear(CollectionKind::Cart).await.unwrap();
    assert!(engine.snapshot(CollectionKind::Cart).is_empty());
    assert!(backend.service.items(CollectionKind::Cart).is_empty());
}

#[tokio::test]
async fn refresh_walks_pages_over_http() {
    let backend = Backend::new();
    backend.service.seed(
        CollectionKind::Wishlist,
        (0..7)
            .map(|i| CollectionItem::wishlist_entry(format!("p-{i}")))
            .collect(),
    );
    let base = common::spawn(backend.clone()).await;
    let dir = TempDir::new().unwrap();
    let engine = engine(
        &base,
        dir.path(),
        EngineConfig {
            page_size: 3,
            ..EngineConfig::default()
        },
    );

    let snapshot = engine.refresh(CollectionKind::Wishlist).await.unwrap();

    assert_eq!(snapshot.len(), 7);
    assert_eq!(
        backend.requests(),
        vec![
            "GET /wishlist?page=1&limit=3",
            "GET /wishlist?page=2&limit=3",
            "GET /wishlist?page=3&limit=3",
        ]
    );
}

#[tokio::test]
async fn wishlist_toggle_on_fresh_install_checks_membership() {
    let backend = Backend::new();
    let base = common::spawn(backend.clone()).await;
    let dir = TempDir::new().unwrap();
    let engine = engine(&base, dir.path(), EngineConfig::default());

    let outcome = engine
        .toggle(CollectionKind::Wishlist, CollectionItem::wishlist_entry("p-9"))
        .await
        .unwrap();

    assert_eq!(outcome.operation(), OperationKind::Add);
    assert_eq!(
        backend.requests(),
        vec!["GET /wishlist/check/p-9", "POST /wishlist"]
    );
    assert!(engine.is_member(CollectionKind::Wishlist, "p-9"));
}

#[tokio::test]
async fn membership_check_reads_both_shapes() {
    let backend = Backend::new();
    backend
        .service
        .seed(CollectionKind::Cart, vec![cart_line("p-1", 1)]);
    backend
        .service
        .seed(CollectionKind::Wishlist, vec![CollectionItem::wishlist_entry("p-2")]);
    let base = common::spawn(backend).await;
    let service = http(&base, Some(TOKEN), Duration::from_secs(5));

    assert!(service.check_membership(CollectionKind::Cart, "p-1").await.unwrap());
    assert!(service.check_membership(CollectionKind::Wishlist, "p-2").await.unwrap());
    assert!(!service.check_membership(CollectionKind::Wishlist, "p-1").await.unwrap());
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn server_error_rolls_back() {
    let backend = Backend::new();
    let base = common::spawn(backend.clone()).await;
    let dir = TempDir::new().unwrap();
    let engine = engine(&base, dir.path(), EngineConfig::default());
    engine
        .add(CollectionKind::Cart, cart_line("p-1", 2))
        .await
        .unwrap();
    let prior = engine.snapshot(CollectionKind::Cart);

    backend.service.set_failure(Some(ServiceError::Status {
        status: 503,
        message: "maintenance".into(),
    }));
    let err = engine
        .update_quantity(CollectionKind::Cart, "p-1", 3)
        .await
        .unwrap_err();

    match &err {
        SyncError::NetworkFailure {
            source: ServiceError::Status { status, message },
            item_id,
            ..
        } => {
            assert_eq!(*status, 503);
            assert_eq!(message, "maintenance");
            assert_eq!(item_id.as_deref(), Some("p-1"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(engine.snapshot(CollectionKind::Cart), prior);
}

#[tokio::test]
async fn missing_token_is_a_status_error() {
    let backend = Backend::new();
    let base = common::spawn(backend.clone()).await;
    let service = http(&base, None, Duration::from_secs(5));

    let err = service.fetch(CollectionKind::Cart, 1, 10).await.unwrap_err();

    assert!(matches!(err, ServiceError::Status { status: 401, .. }));
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn slow_server_times_out_and_rolls_back() {
    let backend = Backend::new();
    let base = common::spawn(backend.clone()).await;
    let dir = TempDir::new().unwrap();
    let engine = SyncEngine::new(
        http(&base, Some(TOKEN), Duration::from_millis(200)),
        FileCache::new(dir.path()),
        EngineConfig::default(),
    );

    backend.set_delay(Some(Duration::from_secs(2)));
    let err = engine
        .add(CollectionKind::Cart, cart_line("p-1", 1))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::NetworkFailure {
            source: ServiceError::Timeout,
            ..
        }
    ));
    assert!(err.is_retryable());
    assert!(engine.snapshot(CollectionKind::Cart).is_empty());
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    // nothing listens on the discard port
    let service = http("http://127.0.0.1:9", Some(TOKEN), Duration::from_secs(2));

    let err = service.remove(CollectionKind::Cart, "p-1").await.unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Transport(_) | ServiceError::Timeout
    ));
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn restart_hydrates_from_file_cache() {
    let backend = Backend::new();
    let base = common::spawn(backend.clone()).await;
    let dir = TempDir::new().unwrap();
    {
        let engine = engine(&base, dir.path(), EngineConfig::default());
        engine
            .add(CollectionKind::Cart, cart_line("p-1", 3))
            .await
            .unwrap();
    }

    let restarted = engine(&base, dir.path(), EngineConfig::default());

    assert_eq!(
        restarted.select(|store| store.hydration(CollectionKind::Cart)),
        Hydration::Cache
    );
    assert_eq!(
        *restarted.snapshot(CollectionKind::Cart),
        server_snapshot(&backend, CollectionKind::Cart)
    );
}

#[tokio::test]
async fn sign_out_deletes_cache_files() {
    let backend = Backend::new();
    let base = common::spawn(backend.clone()).await;
    let dir = TempDir::new().unwrap();
    let engine = engine(&base, dir.path(), EngineConfig::default());
    engine
        .add(CollectionKind::Wishlist, CollectionItem::wishlist_entry("p-1"))
        .await
        .unwrap();
    let file = engine.cache().inner().path("basket:wishlist");
    assert!(file.exists());

    engine.sign_out();

    assert!(!file.exists());
    assert!(engine.snapshot(CollectionKind::Wishlist).is_empty());
    // the server keeps its state
    assert_eq!(backend.service.items(CollectionKind::Wishlist).len(), 1);
}

#[tokio::test]
async fn corrupted_cache_file_is_ignored() {
    let dir = TempDir::new().unwrap();
    let cache = FileCache::new(dir.path());
    std::fs::write(cache.path("basket:cart"), b"{\"formatVersion\":1,").unwrap();
    let backend = Backend::new();
    let base = common::spawn(backend).await;

    let engine = engine(&base, dir.path(), EngineConfig::default());

    assert!(engine.snapshot(CollectionKind::Cart).is_empty());
    assert!(!cache.path("basket:cart").exists());
}
