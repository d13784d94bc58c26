//! Remote collection service over HTTP.
//!
//! Every collection is a REST resource under the base URL:
//!
//! | Call               | Request                                  |
//! |--------------------|------------------------------------------|
//! | `fetch`            | `GET {base}/{collection}?page=&limit=`   |
//! | `add`              | `POST {base}/{collection}`               |
//! | `update_quantity`  | `PATCH {base}/{collection}/{item}`       |
//! | `remove`           | `DELETE {base}/{collection}/{item}`      |
//! | `clear`            | `DELETE {base}/{collection}`             |
//! | `check_membership` | `GET {base}/{collection}/check/{item}`   |

use crate::{config::Config, error::AppError};
use async_trait::async_trait;
use basket_engine::{
    CollectionItem, CollectionKind, CollectionService, ServiceError, ServiceResult, WireSnapshot,
};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Keys a membership response may carry its answer under.
const MEMBERSHIP_KEYS: [&str; 4] = ["inWishlist", "inCart", "isMember", "exists"];

/// [`CollectionService`] backed by a REST API.
#[derive(Clone)]
pub struct HttpCollectionService {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl std::fmt::Debug for HttpCollectionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCollectionService")
            .field("base_url", &self.base_url.as_str())
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddRequest<'a> {
    product_id: &'a str,
    quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<&'a str>,
}

#[derive(Serialize)]
struct QuantityRequest {
    quantity: u32,
}

impl HttpCollectionService {
    /// Create a client for the service at `base_url`.
    pub fn new(
        base_url: &str,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url).map_err(|e| AppError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(&config.api_url, config.auth_token.clone(), config.timeout)
    }

    /// `{base}/{collection}/{segments...}`, each segment percent-encoded.
    pub fn endpoint(&self, collection: CollectionKind, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .push(collection.as_str())
                .extend(segments);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> ServiceResult<Response> {
        let request = match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), %message, "service answered with an error");
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn send_json(&self, request: RequestBuilder) -> ServiceResult<Value> {
        let response = self.send(request).await?;
        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::Timeout
            } else {
                ServiceError::Decode(e.to_string())
            }
        })
    }
}

#[async_trait]
impl CollectionService for HttpCollectionService {
    async fn fetch(
        &self,
        collection: CollectionKind,
        page: u32,
        limit: u32,
    ) -> ServiceResult<WireSnapshot> {
        let request = self
            .client
            .get(self.endpoint(collection, &[]))
            .query(&[("page", page), ("limit", limit)]);
        self.send_json(request).await
    }

    async fn add(
        &self,
        collection: CollectionKind,
        item: &CollectionItem,
    ) -> ServiceResult<WireSnapshot> {
        let variant = item.variant.as_ref();
        let body = AddRequest {
            product_id: &item.product_id,
            quantity: item.quantity,
            size: variant.and_then(|v| v.size.as_deref()),
            color: variant.and_then(|v| v.color.as_deref()),
        };
        let request = self.client.post(self.endpoint(collection, &[])).json(&body);
        self.send_json(request).await
    }

    async fn update_quantity(
        &self,
        collection: CollectionKind,
        item_id: &str,
        quantity: u32,
    ) -> ServiceResult<WireSnapshot> {
        let request = self
            .client
            .patch(self.endpoint(collection, &[item_id]))
            .json(&QuantityRequest { quantity });
        self.send_json(request).await
    }

    async fn remove(
        &self,
        collection: CollectionKind,
        item_id: &str,
    ) -> ServiceResult<WireSnapshot> {
        let request = self.client.delete(self.endpoint(collection, &[item_id]));
        self.send_json(request).await
    }

    async fn clear(&self, collection: CollectionKind) -> ServiceResult<()> {
        let request = self.client.delete(self.endpoint(collection, &[]));
        self.send(request).await?;
        Ok(())
    }

    async fn check_membership(
        &self,
        collection: CollectionKind,
        item_id: &str,
    ) -> ServiceResult<bool> {
        let request = self
            .client
            .get(self.endpoint(collection, &["check", item_id]));
        let body = self.send_json(request).await?;
        membership_of(&body)
            .ok_or_else(|| ServiceError::Decode(format!("unrecognized membership response: {body}")))
    }
}

fn transport_error(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout
    } else {
        ServiceError::Transport(e.to_string())
    }
}

fn membership_of(body: &Value) -> Option<bool> {
    match body {
        Value::Bool(member) => Some(*member),
        Value::Object(map) => MEMBERSHIP_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_bool))
            .or_else(|| map.get("data").and_then(membership_of)),
        _ => None,
    }
}
