//! Ecommerce backend boundary.
//!
//! `CommerceBackend` is the raw product/order service. `StoreClient` layers the
//! degrade policy on top of it: product listing falls back to a fixed catalog
//! and order creation falls back to a locally priced pending order, while
//! search and lookup failures reach the caller.

pub mod http;
pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::domain::order::{order_total, Order, OrderItem, OrderRequest, OrderStatus};
use crate::domain::product::{Product, ProductId};
use crate::errors::StoreError;

pub use http::HttpCommerceBackend;
pub use mock::{fallback_catalog, MockCommerceBackend};

#[async_trait]
pub trait CommerceBackend: Send + Sync {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;
    async fn search_products(&self, query: &str) -> Result<Vec<Product>, StoreError>;
    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, StoreError>;
    async fn create_order(&self, request: &OrderRequest) -> Result<Order, StoreError>;
}

#[derive(Clone)]
pub struct StoreClient {
    backend: Arc<dyn CommerceBackend>,
}

impl Default for StoreClient {
    fn default() -> Self {
        Self::new(Arc::new(MockCommerceBackend::default()))
    }
}

impl StoreClient {
    pub fn new(backend: Arc<dyn CommerceBackend>) -> Self {
        Self { backend }
    }

    /// Uses the REST backend when `store.base_url` is set, the in-process mock otherwise.
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        match config.base_url.as_deref() {
            Some(base_url) => {
                info!(event_name = "store.client.http", base_url, "using http store backend");
                Ok(Self::new(Arc::new(HttpCommerceBackend::from_config(base_url, config)?)))
            }
            None => {
                info!(event_name = "store.client.mock", "using in-process mock store backend");
                Ok(Self::default())
            }
        }
    }

    pub async fn get_products(&self) -> Vec<Product> {
        match self.backend.list_products().await {
            Ok(products) => products,
            Err(error) => {
                warn!(
                    event_name = "store.products.fallback",
                    error = %error,
                    "product listing failed; serving fallback catalog"
                );
                fallback_catalog()
            }
        }
    }

    pub async fn search_products(&self, query: &str) -> Result<Vec<Product>, StoreError> {
        self.backend.search_products(query).await
    }

    pub async fn get_product_by_id(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.backend.product_by_id(id).await
    }

    pub async fn create_order(
        &self,
        items: Vec<OrderItem>,
        customer_email: Option<String>,
    ) -> Order {
        let catalog = self.get_products().await;
        let total = order_total(&items, &catalog);
        let request = OrderRequest { items, customer_email, total };

        match self.backend.create_order(&request).await {
            Ok(order) => {
                info!(
                    event_name = "store.order.created",
                    order_id = %order.id.0,
                    total = %order.total,
                    "order created"
                );
                order
            }
            Err(error) => {
                let order = Order::local(request, OrderStatus::Pending);
                warn!(
                    event_name = "store.order.fallback",
                    order_id = %order.id.0,
                    error = %error,
                    "order backend failed; returning locally computed pending order"
                );
                order
            }
        }
    }
}
