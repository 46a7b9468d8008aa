use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::{Product, ProductId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn generate() -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("ORD-{}", &suffix[..8]).to_uppercase())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(alias = "productId")]
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub items: Vec<OrderItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub items: Vec<OrderItem>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Builds an order locally, without a backend round trip.
    pub fn local(request: OrderRequest, status: OrderStatus) -> Self {
        Self {
            id: OrderId::generate(),
            items: request.items,
            total: request.total,
            customer_email: request.customer_email,
            status,
            created_at: Utc::now(),
        }
    }
}

/// Sums `price * quantity` over items found in `catalog`; unknown products contribute zero.
pub fn order_total(items: &[OrderItem], catalog: &[Product]) -> Decimal {
    items
        .iter()
        .filter_map(|item| {
            catalog
                .iter()
                .find(|product| product.id == item.product_id)
                .map(|product| product.price * Decimal::from(item.quantity))
        })
        .sum()
}
