pub mod config;
pub mod domain;
pub mod errors;
pub mod store;

pub use domain::order::{Order, OrderId, OrderItem, OrderRequest, OrderStatus};
pub use domain::product::{Product, ProductId};
pub use errors::StoreError;
pub use store::{CommerceBackend, HttpCommerceBackend, MockCommerceBackend, StoreClient};
