//! Normalization of server responses into canonical snapshots.
//!
//! The remote service answers in more than one shape: cart lines nest the
//! product under `product`, wishlist entries come back as flattened product
//! objects with wishlist metadata merged in, and the list itself may be a bare
//! array or sit inside an envelope. Everything that reaches the store passes
//! through [`Reconciler::reconcile`], which is total: malformed entries are
//! dropped, never reported.
//!
//! # Algorithm
//!
//! 1. Locate the entry array and the optional total count in the envelope
//! 2. Normalize each entry, dropping the ones without a product identity
//! 3. Deduplicate by item id (first wins); fold repeated cart lines
//! 4. Build the snapshot with `max(total, len)` as count

use crate::{item::line_key, CollectionItem, CollectionKind, CollectionSnapshot, Timestamp, Variant};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::str::FromStr;

/// Envelope keys that may hold the entry array.
const LIST_KEYS: [&str; 6] = ["items", "data", "products", "lines", "cart", "wishlist"];

/// Envelope keys that may hold the total count.
const COUNT_KEYS: [&str; 4] = ["totalCount", "total_count", "total", "count"];

/// Normalizes wire snapshots for one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciler {
    collection: CollectionKind,
}

/// Entries and count extracted from one envelope.
#[derive(Debug, Default)]
struct Envelope<'a> {
    entries: Vec<&'a Value>,
    total: Option<usize>,
}

impl Reconciler {
    pub fn new(collection: CollectionKind) -> Self {
        Self { collection }
    }

    pub fn collection(&self) -> CollectionKind {
        self.collection
    }

    /// Normalize one server response.
    pub fn reconcile(&self, wire: &Value) -> CollectionSnapshot {
        self.reconcile_pages(std::slice::from_ref(wire))
    }

    /// Number of raw entries in one response, malformed ones included.
    pub fn entry_count(&self, wire: &Value) -> usize {
        envelope(wire).entries.len()
    }

    /// Total count the server announced for the listing, if any.
    pub fn listed_total(&self, wire: &Value) -> Option<usize> {
        envelope(wire).total
    }

    /// Normalize several pages of one listing in a single pass.
    ///
    /// The total count is taken from the first page that carries one.
    pub fn reconcile_pages(&self, pages: &[Value]) -> CollectionSnapshot {
        let mut entries = Vec::new();
        let mut total = None;
        for page in pages {
            let envelope = envelope(page);
            entries.extend(envelope.entries);
            total = total.or(envelope.total);
        }

        let mut items: Vec<CollectionItem> = Vec::with_capacity(entries.len());
        let mut by_id: HashMap<String, usize> = HashMap::new();
        let mut by_line: HashMap<String, usize> = HashMap::new();
        let mut dropped = 0usize;

        for entry in entries {
            let Some(item) = self.normalize_entry(entry) else {
                dropped += 1;
                continue;
            };

            if by_id.contains_key(&item.item_id) {
                dropped += 1;
                continue;
            }

            if self.collection == CollectionKind::Cart {
                if let Some(&index) = by_line.get(&item.line_key()) {
                    if let Some(existing) = items.get_mut(index) {
                        existing.quantity = existing.quantity.saturating_add(item.quantity);
                    }
                    continue;
                }
                by_line.insert(item.line_key(), items.len());
            }

            by_id.insert(item.item_id.clone(), items.len());
            items.push(item);
        }

        if dropped > 0 {
            tracing::debug!(
                collection = %self.collection,
                dropped,
                kept = items.len(),
                "dropped malformed entries from server response"
            );
        }

        CollectionSnapshot::new(items, total.unwrap_or(0))
    }

    /// Normalize a single entry into the canonical shape.
    pub fn normalize_entry(&self, entry: &Value) -> Option<CollectionItem> {
        let outer = entry.as_object()?;
        let nested = match outer.get("product") {
            Some(Value::Object(product)) => Some(product),
            _ => None,
        };
        let product = nested.unwrap_or(outer);

        let product_id = match nested {
            Some(product) => id_of(product, &["_id", "id", "productId"])
                .or_else(|| id_of(outer, &["productId"])),
            None => id_of(outer, &["productId", "_id", "id"]),
        }?;

        let name = string_of(product, &["name", "title"]);
        let price = product.get("price").and_then(decimal_of);
        let image = image_of(product);
        let brand = brand_of(product);

        match self.collection {
            CollectionKind::Wishlist => {
                let added_at = ["addedAt", "wishlistAddedAt"]
                    .iter()
                    .find_map(|key| outer.get(*key).and_then(timestamp_of))
                    .or_else(|| product.get("wishlistAddedAt").and_then(timestamp_of));

                Some(CollectionItem {
                    item_id: product_id.clone(),
                    product_id,
                    name,
                    price,
                    image,
                    brand,
                    quantity: 1,
                    variant: None,
                    added_at,
                })
            }
            CollectionKind::Cart => {
                let quantity = match ["quantity", "qty"].iter().find_map(|key| outer.get(*key)) {
                    None | Some(Value::Null) => 1,
                    Some(value) => quantity_of(value)?,
                };
                let variant = variant_of(outer);

                let line_id = match nested {
                    Some(_) => id_of(outer, &["_id", "id", "lineId", "itemId"]),
                    None => id_of(outer, &["lineId", "itemId", "cartItemId"]).or_else(|| {
                        // A flattened line carries its own `_id` only when the
                        // product id sits in `productId`.
                        outer
                            .contains_key("productId")
                            .then(|| id_of(outer, &["_id", "id"]))
                            .flatten()
                            .filter(|id| *id != product_id)
                    }),
                };
                let item_id = line_id.unwrap_or_else(|| line_key(&product_id, variant.as_ref()));

                Some(CollectionItem {
                    item_id,
                    product_id,
                    name,
                    price,
                    image,
                    brand,
                    quantity,
                    variant,
                    added_at: None,
                })
            }
        }
    }
}

fn envelope(wire: &Value) -> Envelope<'_> {
    match wire {
        Value::Array(entries) => Envelope {
            entries: entries.iter().collect(),
            total: None,
        },
        Value::Object(map) => {
            let total = COUNT_KEYS.iter().find_map(|key| map.get(*key).and_then(count_of));
            for key in LIST_KEYS {
                match map.get(key) {
                    Some(Value::Array(entries)) => {
                        return Envelope {
                            entries: entries.iter().collect(),
                            total,
                        };
                    }
                    Some(inner @ Value::Object(_)) if key == "data" => {
                        let mut inner = envelope(inner);
                        inner.total = inner.total.or(total);
                        return inner;
                    }
                    _ => {}
                }
            }
            Envelope {
                entries: Vec::new(),
                total,
            }
        }
        _ => Envelope::default(),
    }
}

fn id_of(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.is_u64() || n.is_i64() => Some(n.to_string()),
        _ => None,
    })
}

fn string_of(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    })
}

fn decimal_of(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                Decimal::from_str(&n.to_string()).ok()
            }
        }
        _ => None,
    }
}

fn image_of(product: &Map<String, Value>) -> Option<String> {
    if let Some(image) = string_of(product, &["image"]) {
        return Some(image);
    }
    let first = product.get("images").and_then(Value::as_array).and_then(|images| images.first());
    match first {
        Some(Value::String(url)) if !url.is_empty() => return Some(url.clone()),
        Some(Value::Object(image)) => {
            if let Some(url) = string_of(image, &["url", "src"]) {
                return Some(url);
            }
        }
        _ => {}
    }
    string_of(product, &["thumbnail"])
}

fn brand_of(product: &Map<String, Value>) -> Option<String> {
    match product.get("brand")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(brand) => string_of(brand, &["name"]),
        _ => None,
    }
}

fn quantity_of(value: &Value) -> Option<u32> {
    let quantity = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    u32::try_from(quantity).ok().filter(|q| *q >= 1)
}

fn count_of(value: &Value) -> Option<usize> {
    value.as_u64().and_then(|n| usize::try_from(n).ok())
}

fn variant_of(outer: &Map<String, Value>) -> Option<Variant> {
    let source = match outer.get("variant") {
        Some(Value::Object(variant)) => variant,
        _ => outer,
    };
    Variant::new(
        string_of(source, &["size", "selectedSize"]),
        string_of(source, &["color", "selectedColor"]),
    )
    .normalized()
}

fn timestamp_of(value: &Value) -> Option<Timestamp> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        _ => None,
    }
}
