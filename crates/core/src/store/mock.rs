use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::order::{order_total, Order, OrderRequest, OrderStatus};
use crate::domain::product::{Product, ProductId};
use crate::errors::StoreError;
use crate::store::CommerceBackend;

/// Fixed catalog served when the product backend is unreachable.
pub fn fallback_catalog() -> Vec<Product> {
    vec![
        catalog_entry(1, "Wireless Mouse", 2999, "Ergonomic 2.4GHz mouse", "Electronics"),
        catalog_entry(2, "Mechanical Keyboard", 4999, "Tenkeyless, brown switches", "Electronics"),
        catalog_entry(3, "Running Shoes", 8999, "Lightweight road running shoes", "Sports"),
        catalog_entry(4, "Coffee Maker", 7999, "12-cup programmable drip brewer", "Home"),
        catalog_entry(5, "Yoga Mat", 2499, "6mm non-slip exercise mat", "Sports"),
    ]
}

fn catalog_entry(
    id: u64,
    name: &str,
    price_cents: i64,
    description: &str,
    category: &str,
) -> Product {
    Product {
        id: ProductId(id),
        name: name.to_string(),
        price: Decimal::new(price_cents, 2),
        description: Some(description.to_string()),
        category: Some(category.to_string()),
    }
}

/// In-process backend over a fixed catalog. Placed orders are kept in memory;
/// clones share the same order book.
#[derive(Clone, Debug)]
pub struct MockCommerceBackend {
    catalog: Vec<Product>,
    orders: Arc<Mutex<Vec<Order>>>,
}

impl Default for MockCommerceBackend {
    fn default() -> Self {
        Self::with_catalog(fallback_catalog())
    }
}

impl MockCommerceBackend {
    pub fn with_catalog(catalog: Vec<Product>) -> Self {
        Self { catalog, orders: Arc::default() }
    }

    pub fn orders(&self) -> Vec<Order> {
        self.orders.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl CommerceBackend for MockCommerceBackend {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        Ok(self.catalog.clone())
    }

    async fn search_products(&self, query: &str) -> Result<Vec<Product>, StoreError> {
        Ok(self.catalog.iter().filter(|product| product.matches_query(query)).cloned().collect())
    }

    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.catalog.iter().find(|product| product.id == id).cloned())
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<Order, StoreError> {
        let mut request = request.clone();
        request.total = order_total(&request.items, &self.catalog);
        let order = Order::local(request, OrderStatus::Confirmed);
        self.orders.lock().unwrap_or_else(PoisonError::into_inner).push(order.clone());
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{fallback_catalog, MockCommerceBackend};
    use crate::domain::order::{OrderItem, OrderRequest, OrderStatus};
    use crate::domain::product::ProductId;
    use crate::store::CommerceBackend;

    #[test]
    fn fallback_catalog_has_five_distinct_products() {
        let catalog = fallback_catalog();

        assert_eq!(catalog.len(), 5);
        let mut ids = catalog.iter().map(|product| product.id).collect::<Vec<_>>();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }

    #[tokio::test]
    async fn search_filters_by_name_or_category() {
        let backend = MockCommerceBackend::default();

        let sports = backend.search_products("SPORTS").await.expect("search");
        let names = sports.iter().map(|product| product.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Running Shoes", "Yoga Mat"]);

        let keyboard = backend.search_products("keyb").await.expect("search");
        assert_eq!(keyboard.len(), 1);
        assert_eq!(keyboard[0].id, ProductId(2));
    }

    #[tokio::test]
    async fn lookup_returns_none_for_unknown_id() {
        let backend = MockCommerceBackend::default();

        assert!(backend.product_by_id(ProductId(3)).await.expect("lookup").is_some());
        assert!(backend.product_by_id(ProductId(99)).await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn created_orders_are_confirmed_and_priced_from_catalog() {
        let backend = MockCommerceBackend::default();
        let order = backend
            .create_order(&OrderRequest {
                items: vec![OrderItem { product_id: ProductId(5), quantity: 2 }],
                customer_email: None,
                total: Decimal::ZERO,
            })
            .await
            .expect("order");

        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.total, Decimal::new(4998, 2));
    }

    #[tokio::test]
    async fn clones_share_the_order_book() {
        let backend = MockCommerceBackend::default();
        let handle = backend.clone();

        backend
            .create_order(&OrderRequest {
                items: vec![OrderItem { product_id: ProductId(1), quantity: 1 }],
                customer_email: Some("x@y.com".to_owned()),
                total: Decimal::ZERO,
            })
            .await
            .expect("order");

        let orders = handle.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].customer_email.as_deref(), Some("x@y.com"));
    }
}
