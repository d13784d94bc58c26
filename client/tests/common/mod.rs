//! In-process REST backend for client integration tests.

#![allow(dead_code)]

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use basket_engine::{
    line_key, CollectionItem, CollectionKind, CollectionService, MemoryService, ServiceError,
    ServiceResult, Variant,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TOKEN: &str = "test-token";

/// Shared state of the fake backend.
#[derive(Clone, Default)]
pub struct Backend {
    pub service: Arc<MemoryService>,
    delay: Arc<Mutex<Option<Duration>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl Backend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    /// `METHOD path` of every authorized request, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    async fn admit(&self, headers: &HeaderMap, request: String) -> Result<(), Response> {
        let authorized = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == format!("Bearer {TOKEN}"));
        if !authorized {
            return Err((StatusCode::UNAUTHORIZED, "missing token").into_response());
        }

        self.requests.lock().unwrap().push(request);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct PageQuery {
    page: u32,
    limit: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddBody {
    product_id: String,
    quantity: u32,
    size: Option<String>,
    color: Option<String>,
}

#[derive(Deserialize)]
struct QuantityBody {
    quantity: u32,
}

fn reply<T: serde::Serialize>(result: ServiceResult<T>) -> Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(ServiceError::Status { status, message }) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn list(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Path(collection): Path<CollectionKind>,
    Query(query): Query<PageQuery>,
) -> Response {
    let request = format!("GET /{collection}?page={}&limit={}", query.page, query.limit);
    if let Err(denied) = backend.admit(&headers, request).await {
        return denied;
    }
    reply(backend.service.fetch(collection, query.page, query.limit).await)
}

async fn add(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Path(collection): Path<CollectionKind>,
    Json(body): Json<AddBody>,
) -> Response {
    if let Err(denied) = backend.admit(&headers, format!("POST /{collection}")).await {
        return denied;
    }
    let item = match collection {
        CollectionKind::Cart => {
            let variant = Variant::new(body.size, body.color).normalized();
            let mut line = CollectionItem::cart_line(
                line_key(&body.product_id, variant.as_ref()),
                body.product_id,
                body.quantity,
            );
            line.variant = variant;
            line
        }
        CollectionKind::Wishlist => CollectionItem::wishlist_entry(body.product_id),
    };
    reply(backend.service.add(collection, &item).await)
}

async fn clear(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Path(collection): Path<CollectionKind>,
) -> Response {
    if let Err(denied) = backend.admit(&headers, format!("DELETE /{collection}")).await {
        return denied;
    }
    match backend.service.clear(collection).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => reply::<Value>(Err(e)),
    }
}

async fn update(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Path((collection, item_id)): Path<(CollectionKind, String)>,
    Json(body): Json<QuantityBody>,
) -> Response {
    let request = format!("PATCH /{collection}/{item_id}");
    if let Err(denied) = backend.admit(&headers, request).await {
        return denied;
    }
    reply(
        backend
            .service
            .update_quantity(collection, &item_id, body.quantity)
            .await,
    )
}

async fn remove(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Path((collection, item_id)): Path<(CollectionKind, String)>,
) -> Response {
    let request = format!("DELETE /{collection}/{item_id}");
    if let Err(denied) = backend.admit(&headers, request).await {
        return denied;
    }
    reply(backend.service.remove(collection, &item_id).await)
}

async fn check(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Path((collection, item_id)): Path<(CollectionKind, String)>,
) -> Response {
    let request = format!("GET /{collection}/check/{item_id}");
    if let Err(denied) = backend.admit(&headers, request).await {
        return denied;
    }
    let result = backend
        .service
        .check_membership(collection, &item_id)
        .await
        .map(|member| match collection {
            CollectionKind::Wishlist => json!({ "inWishlist": member }),
            CollectionKind::Cart => json!(member),
        });
    reply(result)
}

/// Serve `backend` on an ephemeral port and return the API base URL.
pub async fn spawn(backend: Backend) -> String {
    let routes = Router::new()
        .route("/{collection}", get(list).post(add).delete(clear))
        .route("/{collection}/{item_id}", patch(update).delete(remove))
        .route("/{collection}/check/{item_id}", get(check));
    let app = Router::new().nest("/api", routes).with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}/api")
}
