//! Canonical item types stored in the cart and wishlist.

use crate::{ItemId, ProductId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two collections the engine keeps in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Cart,
    Wishlist,
}

impl CollectionKind {
    /// Both collections, in a fixed order.
    pub const ALL: [CollectionKind; 2] = [CollectionKind::Cart, CollectionKind::Wishlist];

    /// Lowercase name, used as URL segment and cache key suffix.
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Cart => "cart",
            CollectionKind::Wishlist => "wishlist",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant attributes of a cart line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Variant {
    pub fn new(size: Option<String>, color: Option<String>) -> Self {
        Self { size, color }
    }

    /// True when neither size nor color is set.
    pub fn is_empty(&self) -> bool {
        self.size.is_none() && self.color.is_none()
    }

    /// `None` for an empty variant, so that "no variant" has one representation.
    pub fn normalized(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

/// A single cart line or wishlist entry.
///
/// Product fields are denormalized copies taken from the server response,
/// not live joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionItem {
    /// Identity within the collection (line id for cart, product id for wishlist)
    pub item_id: ItemId,
    /// Product this item references
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    /// Always at least 1; always exactly 1 for wishlist entries
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Cart only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    /// Wishlist only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<Timestamp>,
}

fn default_quantity() -> u32 {
    1
}

impl CollectionItem {
    /// Create a cart line.
    pub fn cart_line(
        item_id: impl Into<ItemId>,
        product_id: impl Into<ProductId>,
        quantity: u32,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            product_id: product_id.into(),
            name: None,
            price: None,
            image: None,
            brand: None,
            quantity,
            variant: None,
            added_at: None,
        }
    }

    /// Create a wishlist entry. The product id doubles as item id.
    pub fn wishlist_entry(product_id: impl Into<ProductId>) -> Self {
        let product_id = product_id.into();
        Self {
            item_id: product_id.clone(),
            product_id,
            name: None,
            price: None,
            image: None,
            brand: None,
            quantity: 1,
            variant: None,
            added_at: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant.normalized();
        self
    }

    pub fn with_added_at(mut self, added_at: Timestamp) -> Self {
        self.added_at = Some(added_at);
        self
    }

    /// Whether two items are the same cart line: same product, same variant.
    pub fn same_line(&self, other: &CollectionItem) -> bool {
        self.product_id == other.product_id && self.variant == other.variant
    }

    /// Stable textual key of the `(product, variant)` pair, e.g. `p1:M:red`.
    pub fn line_key(&self) -> String {
        line_key(&self.product_id, self.variant.as_ref())
    }

    /// Price times quantity, if the price is known.
    pub fn line_total(&self) -> Option<Decimal> {
        self.price.map(|price| price * Decimal::from(self.quantity))
    }
}

/// Key of a `(product, variant)` pair.
pub fn line_key(product_id: &str, variant: Option<&Variant>) -> String {
    let mut key = product_id.to_string();
    if let Some(variant) = variant {
        for part in [&variant.size, &variant.color].into_iter().flatten() {
            key.push(':');
            key.push_str(part);
        }
    }
    key
}
