use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::StoreConfig;
use crate::domain::order::{Order, OrderRequest};
use crate::domain::product::{Product, ProductId};
use crate::errors::StoreError;
use crate::store::CommerceBackend;

/// REST client for the product/order service.
#[derive(Clone)]
pub struct HttpCommerceBackend {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HttpCommerceBackend {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        api_key: Option<SecretString>,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| StoreError::Configuration(error.to_string()))?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), api_key })
    }

    pub fn from_config(base_url: &str, config: &StoreConfig) -> Result<Self, StoreError> {
        Self::new(base_url, Duration::from_secs(config.timeout_secs), config.api_key.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response, StoreError> {
        debug!(event_name = "store.http.request", endpoint, "sending store request");
        self.authorize(request).send().await.map_err(|error| StoreError::Transport {
            endpoint: endpoint.to_string(),
            message: error.to_string(),
        })
    }

    async fn decode<T: DeserializeOwned>(
        endpoint: &str,
        response: Response,
    ) -> Result<T, StoreError> {
        if !response.status().is_success() {
            return Err(StoreError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.json::<T>().await.map_err(|error| StoreError::Decode {
            endpoint: endpoint.to_string(),
            message: error.to_string(),
        })
    }
}

#[async_trait]
impl CommerceBackend for HttpCommerceBackend {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let endpoint = "/products";
        let response = self.send(endpoint, self.client.get(self.url(endpoint))).await?;
        Self::decode(endpoint, response).await
    }

    async fn search_products(&self, query: &str) -> Result<Vec<Product>, StoreError> {
        let endpoint = "/products/search";
        let request = self.client.get(self.url(endpoint)).query(&[("q", query)]);
        let response = self.send(endpoint, request).await?;
        Self::decode(endpoint, response).await
    }

    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let endpoint = format!("/products/{id}");
        let response = self.send(&endpoint, self.client.get(self.url(&endpoint))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(&endpoint, response).await.map(Some)
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<Order, StoreError> {
        let endpoint = "/orders";
        let request = self.client.post(self.url(endpoint)).json(request);
        let response = self.send(endpoint, request).await?;
        Self::decode(endpoint, response).await
    }
}
