//! Typed shapes for ManaPool order payloads
//!
//! Every field is optional at the boundary; absent fields default rather
//! than failing deserialization of an otherwise usable order.

use serde::Deserialize;

/// One entry from the paged /seller/orders listing
#[derive(Debug, Clone, Deserialize)]
pub struct OrderSummary {
    #[serde(default)]
    pub id: Option<String>,
}

/// Paged listing response
#[derive(Debug, Default, Deserialize)]
pub struct OrderList {
    #[serde(default)]
    pub orders: Vec<OrderSummary>,
}

/// Envelope around a single order detail response
#[derive(Debug, Default, Deserialize)]
pub struct OrderEnvelope {
    #[serde(default)]
    pub order: Option<Order>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub id: Option<String>,
    /// Human-facing order number, e.g. "100"
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShippingAddress {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderItem {
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub product: Option<Product>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub single: Option<Single>,
}

/// The card identity and grading a marketplace line item carries
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Single {
    #[serde(default)]
    pub scryfall_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub set: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub language_id: Option<String>,
    #[serde(default)]
    pub finish_id: Option<String>,
}
