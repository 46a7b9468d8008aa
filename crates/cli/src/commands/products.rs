use shopkeep_core::config::AppConfig;
use shopkeep_core::{Product, StoreClient};

use super::CommandResult;

pub async fn run(config: &AppConfig, search: Option<&str>, json: bool) -> CommandResult {
    match StoreClient::from_config(&config.store) {
        Ok(store) => list(&store, search, json).await,
        Err(error) => CommandResult::failure("products", error.error_class(), error.to_string(), 4),
    }
}

/// Without a query this uses the degrading listing, so it always prints a catalog.
pub async fn list(store: &StoreClient, search: Option<&str>, json: bool) -> CommandResult {
    let products = match search {
        Some(query) => match store.search_products(query).await {
            Ok(products) => products,
            Err(error) => {
                return CommandResult::failure(
                    "products",
                    error.error_class(),
                    error.to_string(),
                    4,
                );
            }
        },
        None => store.get_products().await,
    };

    if json {
        return match serde_json::to_string(&products) {
            Ok(output) => CommandResult::text(output),
            Err(error) => CommandResult::failure("products", "serialization", error.to_string(), 1),
        };
    }

    if products.is_empty() {
        return CommandResult::text("no products found");
    }
    CommandResult::text(products.iter().map(render_product).collect::<Vec<_>>().join("\n"))
}

fn render_product(product: &Product) -> String {
    let category = product.category.as_deref().unwrap_or("uncategorized");
    let id = product.id.to_string();
    let price = product.price.to_string();
    format!("#{id:<3} {:<24} ${price:>8}  [{category}]", product.name)
}
