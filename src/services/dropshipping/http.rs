//! Supplier REST adapter.
//!
//! Paths are relative to the supplier's `apiEndpoint`:
//! `GET /products`, `GET /products/:id`, `POST /orders`, `GET /orders/:id`.
//! The supplier's API key, when set, is sent as a bearer token. Responses
//! may be bare or wrapped (`{"products": [...]}`, `{"product": {...}}`,
//! `{"order": {...}}`).

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{CatalogQuery, SupplierApi, SupplierError, SupplierOrder, SupplierOrderRequest, SupplierProduct};
use crate::domain::aggregates::SupplierLink;

pub struct HttpSupplierApi {
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Wrapped<T> {
    Products { products: T },
    Product { product: T },
    Order { order: T },
    Bare(T),
}

impl<T> Wrapped<T> {
    fn into_inner(self) -> T {
        match self {
            Self::Products { products } => products,
            Self::Product { product } => product,
            Self::Order { order } => order,
            Self::Bare(inner) => inner,
        }
    }
}

impl HttpSupplierApi {
    pub fn new(timeout: Duration) -> Result<Self, SupplierError> {
        let client = reqwest::Client::builder().timeout(timeout).connect_timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client })
    }

    fn request(&self, supplier: &SupplierLink, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder, SupplierError> {
        let url = url(supplier, path)?;
        let builder = self.client.request(method, url);
        Ok(match &supplier.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        })
    }
}

pub(crate) fn url(supplier: &SupplierLink, path: &str) -> Result<String, SupplierError> {
    let base = supplier
        .api_endpoint
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| SupplierError::NotConnected(supplier.name.clone()))?;
    Ok(format!("{}{path}", base.trim_end_matches('/')))
}

async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SupplierError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        tracing::warn!(status, "Supplier rejected request");
        return Err(SupplierError::Api { status, message });
    }
    let bytes = response.bytes().await?;
    parse(&bytes)
}

pub(crate) fn parse<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SupplierError> {
    serde_json::from_slice::<Wrapped<T>>(bytes)
        .map(Wrapped::into_inner)
        .map_err(|e| SupplierError::Parse(e.to_string()))
}

#[async_trait]
impl SupplierApi for HttpSupplierApi {
    async fn list_products(
        &self,
        supplier: &SupplierLink,
        query: &CatalogQuery,
    ) -> Result<Vec<SupplierProduct>, SupplierError> {
        let response = self.request(supplier, reqwest::Method::GET, "/products")?.query(query).send().await?;
        read(response).await
    }

    async fn product(&self, supplier: &SupplierLink, product_id: &str) -> Result<SupplierProduct, SupplierError> {
        let path = format!("/products/{product_id}");
        let response = self.request(supplier, reqwest::Method::GET, &path)?.send().await?;
        read(response).await
    }

    async fn place_order(
        &self,
        supplier: &SupplierLink,
        order: &SupplierOrderRequest,
    ) -> Result<SupplierOrder, SupplierError> {
        let response = self.request(supplier, reqwest::Method::POST, "/orders")?.json(order).send().await?;
        read(response).await
    }

    async fn order_status(&self, supplier: &SupplierLink, order_id: &str) -> Result<SupplierOrder, SupplierError> {
        let path = format!("/orders/{order_id}");
        let response = self.request(supplier, reqwest::Method::GET, &path)?.send().await?;
        read(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn link(endpoint: Option<&str>) -> SupplierLink {
        serde_json::from_value(json!({"id": "s1", "name": "Trailhead", "apiEndpoint": endpoint, "isActive": true})).unwrap()
    }

    #[test]
    fn test_url_joins_the_endpoint() {
        assert_eq!(url(&link(Some("https://trailhead.test/api/")), "/products").unwrap(), "https://trailhead.test/api/products");
        assert!(matches!(url(&link(None), "/products"), Err(SupplierError::NotConnected(_))));
        assert!(matches!(url(&link(Some("  ")), "/products"), Err(SupplierError::NotConnected(_))));
    }

    #[test]
    fn test_parses_bare_and_wrapped_bodies() {
        let tent = json!({"id": "SUP-001", "name": "Camping Tent", "price": 89.99, "inventory": 45});
        let bare: Vec<SupplierProduct> = parse(json!([tent]).to_string().as_bytes()).unwrap();
        let wrapped: Vec<SupplierProduct> = parse(json!({"products": [tent]}).to_string().as_bytes()).unwrap();
        assert_eq!(bare, wrapped);
        assert_eq!(bare[0].price, Decimal::new(8999, 2));

        let single: SupplierProduct = parse(json!({"product": tent}).to_string().as_bytes()).unwrap();
        assert_eq!(single.inventory, 45);

        let order: SupplierOrder =
            parse(json!({"order": {"id": "SUP-ORDER-1", "status": "shipped", "trackingNumber": "T1"}}).to_string().as_bytes())
                .unwrap();
        assert_eq!(order.order_id, "SUP-ORDER-1");
        assert_eq!(order.tracking_number.as_deref(), Some("T1"));
    }

    #[test]
    fn test_unexpected_body_is_a_parse_error() {
        let result: Result<SupplierProduct, _> = parse(br#"{"error": "nope"}"#);
        assert!(matches!(result, Err(SupplierError::Parse(_))));
    }
}
