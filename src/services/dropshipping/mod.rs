//! Dropshipping: supplier catalogs, product import, inventory sync and
//! orders placed with the supplier.
//!
//! Suppliers are reached through [`SupplierApi`], configured per supplier
//! by its `apiEndpoint` and `apiKey`. Imported products keep
//! `supplierId`/`supplierProductId` so their stock can be refreshed later.

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::aggregates::{Address, Order, Product, ProductPatch, RatingSummary, Supplier, SupplierLink};
use crate::domain::events::DomainEvent;
use crate::error::{ApiError, Result};
use crate::services::events::EventPublisher;
use crate::store::{Collection, DocumentStore, Query, StoreError};

pub use http::HttpSupplierApi;

/// A product as listed by a supplier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierProduct {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(default)]
    pub inventory: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Paging for a supplier catalog listing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierOrderLine {
    pub supplier_product_id: String,
    pub quantity: u32,
}

/// Order sent to a supplier for the lines it fulfils.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierOrderRequest {
    /// Our order id, echoed back by the supplier.
    pub reference: String,
    pub items: Vec<SupplierOrderLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<Address>,
}

/// A supplier's view of an order it received.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierOrder {
    #[serde(alias = "id")]
    pub order_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum SupplierError {
    #[error("Supplier {0} has no API endpoint configured")]
    NotConnected(String),

    #[error("Supplier {0} is inactive")]
    Inactive(String),

    #[error("Product is not linked to a supplier")]
    NotLinked,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Supplier API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected supplier response: {0}")]
    Parse(String),
}

impl SupplierError {
    /// Errors caused by our own records rather than by the supplier.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NotConnected(_) | Self::Inactive(_) | Self::NotLinked)
    }
}

#[async_trait]
pub trait SupplierApi: Send + Sync {
    async fn list_products(
        &self,
        supplier: &SupplierLink,
        query: &CatalogQuery,
    ) -> std::result::Result<Vec<SupplierProduct>, SupplierError>;

    async fn product(&self, supplier: &SupplierLink, product_id: &str)
        -> std::result::Result<SupplierProduct, SupplierError>;

    async fn place_order(
        &self,
        supplier: &SupplierLink,
        order: &SupplierOrderRequest,
    ) -> std::result::Result<SupplierOrder, SupplierError>;

    async fn order_status(&self, supplier: &SupplierLink, order_id: &str)
        -> std::result::Result<SupplierOrder, SupplierError>;
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub supplier_id: String,
    pub connected: bool,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySync {
    pub product_id: String,
    pub previous: i64,
    pub inventory: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub product_id: String,
    pub error: String,
}

/// Outcome of refreshing every product linked to one supplier.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub updated: Vec<InventorySync>,
    pub failed: Vec<SyncFailure>,
}

#[derive(Clone)]
pub struct DropshippingService {
    links: Collection<SupplierLink>,
    suppliers: Collection<Supplier>,
    products: Collection<Product>,
    orders: Collection<Order>,
    api: Arc<dyn SupplierApi>,
    events: EventPublisher,
}

impl DropshippingService {
    pub fn new(store: Arc<dyn DocumentStore>, api: Arc<dyn SupplierApi>, events: EventPublisher) -> Self {
        Self {
            links: Collection::new(store.clone()),
            suppliers: Collection::new(store.clone()),
            products: Collection::new(store.clone()),
            orders: Collection::new(store),
            api,
            events,
        }
    }

    /// A supplier that can be called: active, with an endpoint.
    async fn link(&self, supplier_id: &str) -> Result<SupplierLink> {
        let link = self.links.get(supplier_id).await?;
        if !link.is_active {
            return Err(SupplierError::Inactive(link.name).into());
        }
        if link.api_endpoint.as_deref().map_or(true, |e| e.trim().is_empty()) {
            return Err(SupplierError::NotConnected(link.name).into());
        }
        Ok(link)
    }

    /// Reachability check. A supplier that answers with an error reports
    /// `connected: false` rather than failing the request.
    pub async fn check_connection(&self, supplier_id: &str) -> Result<ConnectionStatus> {
        let link = self.link(supplier_id).await?;
        let first_page = CatalogQuery { page: None, limit: Some(1) };
        let (connected, message) = match self.api.list_products(&link, &first_page).await {
            Ok(_) => (true, format!("Connected to {} successfully", link.name)),
            Err(e) => {
                tracing::warn!(supplier_id, error = %e, "Supplier connection check failed");
                (false, e.to_string())
            }
        };
        Ok(ConnectionStatus { supplier_id: link.id, connected, message })
    }

    pub async fn catalog(&self, supplier_id: &str, query: &CatalogQuery) -> Result<Vec<SupplierProduct>> {
        let link = self.link(supplier_id).await?;
        Ok(self.api.list_products(&link, query).await?)
    }

    /// Copy a supplier product into the catalog, linked back to its source.
    /// Each supplier product is imported at most once.
    pub async fn import_product(&self, supplier_id: &str, supplier_product_id: &str) -> Result<Product> {
        let link = self.link(supplier_id).await?;
        let existing = self
            .products
            .query(&Query::new().eq("supplierId", supplier_id).eq("supplierProductId", supplier_product_id))
            .await?;
        if let Some(product) = existing.first() {
            return Err(ApiError::InvalidInput(format!(
                "Supplier product {supplier_product_id} is already imported as product {}",
                product.id
            )));
        }

        let source = self.api.product(&link, supplier_product_id).await?;
        let product = self.products.create(&imported(source, supplier_id)).await?;
        tracing::info!(product_id = %product.id, supplier_id, supplier_product_id, "Product imported from supplier");
        self.events
            .publish(DomainEvent::ProductImported {
                product_id: product.id.clone(),
                supplier_id: supplier_id.to_string(),
                supplier_product_id: supplier_product_id.to_string(),
            })
            .await;
        Ok(product)
    }

    /// Refresh one linked product's inventory from its supplier.
    pub async fn sync_inventory(&self, product_id: &str) -> Result<InventorySync> {
        let product = self.products.get(product_id).await?;
        let (Some(supplier_id), Some(supplier_product_id)) = (&product.supplier_id, &product.supplier_product_id) else {
            return Err(SupplierError::NotLinked.into());
        };
        let link = self.link(supplier_id).await?;
        self.refresh(&link, &product, supplier_product_id).await
    }

    /// Refresh every product linked to a supplier. One product failing does
    /// not stop the others.
    pub async fn sync_supplier(&self, supplier_id: &str) -> Result<SyncReport> {
        let link = self.link(supplier_id).await?;
        let linked = self.products.query(&Query::new().eq("supplierId", supplier_id)).await?;
        let mut report = SyncReport::default();
        for product in linked {
            let Some(supplier_product_id) = product.supplier_product_id.as_deref() else {
                continue;
            };
            match self.refresh(&link, &product, supplier_product_id).await {
                Ok(sync) => report.updated.push(sync),
                Err(e) => {
                    tracing::warn!(product_id = %product.id, supplier_id, error = %e, "Inventory sync failed");
                    report.failed.push(SyncFailure { product_id: product.id.clone(), error: e.to_string() });
                }
            }
        }
        tracing::info!(supplier_id, updated = report.updated.len(), failed = report.failed.len(), "Supplier inventory synced");
        Ok(report)
    }

    async fn refresh(&self, link: &SupplierLink, product: &Product, supplier_product_id: &str) -> Result<InventorySync> {
        let source = self.api.product(link, supplier_product_id).await?;
        let inventory = source.inventory.max(0);
        let patch = ProductPatch { inventory: Some(inventory), ..ProductPatch::default() };
        self.products.update(&product.id, &patch).await?;
        self.events
            .publish(DomainEvent::InventorySynced {
                product_id: product.id.clone(),
                supplier_id: link.id.clone(),
                inventory,
            })
            .await;
        Ok(InventorySync { product_id: product.id.clone(), previous: product.inventory, inventory })
    }

    /// Forward the lines of `order_id` this supplier fulfils.
    pub async fn place_order(&self, supplier_id: &str, order_id: &str) -> Result<SupplierOrder> {
        let link = self.link(supplier_id).await?;
        let order = self.orders.get(order_id).await?;

        let mut items = Vec::new();
        for item in &order.items {
            let product = match self.products.get(&item.product_id).await {
                Ok(product) => product,
                Err(StoreError::NotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            };
            if product.supplier_id.as_deref() != Some(supplier_id) {
                continue;
            }
            if let Some(supplier_product_id) = product.supplier_product_id {
                items.push(SupplierOrderLine { supplier_product_id, quantity: item.quantity });
            }
        }
        if items.is_empty() {
            return Err(ApiError::InvalidInput(format!("Order {order_id} has no items from supplier {}", link.name)));
        }

        let request = SupplierOrderRequest { reference: order.id.clone(), items, shipping_address: order.shipping_address };
        let placed = self.api.place_order(&link, &request).await?;
        tracing::info!(supplier_id, order_id, supplier_order_id = %placed.order_id, "Order placed with supplier");
        self.events
            .publish(DomainEvent::SupplierOrderPlaced {
                supplier_id: supplier_id.to_string(),
                order_id: order_id.to_string(),
                supplier_order_id: placed.order_id.clone(),
            })
            .await;
        Ok(placed)
    }

    pub async fn order_status(&self, supplier_id: &str, supplier_order_id: &str) -> Result<SupplierOrder> {
        let link = self.link(supplier_id).await?;
        Ok(self.api.order_status(&link, supplier_order_id).await?)
    }

    /// Replace the supplier's settings object.
    pub async fn configure(&self, supplier_id: &str, settings: Map<String, Value>) -> Result<Supplier> {
        self.suppliers.get(supplier_id).await?;
        let patch = serde_json::json!({ "settings": settings });
        let supplier = self.suppliers.update(supplier_id, &patch).await?;
        tracing::info!(supplier_id, "Supplier settings updated");
        Ok(supplier)
    }
}

fn imported(source: SupplierProduct, supplier_id: &str) -> Product {
    Product {
        id: String::new(),
        name: source.name,
        description: source.description,
        price: source.price,
        sale_price: None,
        category: source.category,
        subcategory: None,
        images: source.images,
        inventory: source.inventory.max(0),
        sku: None,
        brand: None,
        tags: vec![],
        is_active: true,
        is_featured: false,
        ratings: RatingSummary::default(),
        sales: 0,
        supplier_id: Some(supplier_id.to_string()),
        supplier_product_id: Some(source.id),
        created_at: None,
        updated_at: None,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeSupplierApi;
    use super::*;
    use crate::domain::aggregates::OrderItem;
    use crate::store::MemoryStore;
    use serde_json::json;

    struct Fixture {
        store: Arc<dyn DocumentStore>,
        api: Arc<FakeSupplierApi>,
        service: DropshippingService,
        supplier_id: String,
    }

    async fn fixture(api: FakeSupplierApi) -> Fixture {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let api = Arc::new(api);
        let supplier_id = store
            .create(
                "suppliers",
                json!({"name": "Trailhead", "apiEndpoint": "https://trailhead.test/api", "apiKey": "k", "isActive": true}),
            )
            .await
            .unwrap()
            .id;
        let service = DropshippingService::new(store.clone(), api.clone(), EventPublisher::disabled());
        Fixture { store, api, service, supplier_id }
    }

    fn tent_and_pack() -> FakeSupplierApi {
        FakeSupplierApi::new().with_product("SUP-001", "Camping Tent", 90, 45).with_product("SUP-002", "Hiking Backpack", 60, 32)
    }

    #[tokio::test]
    async fn test_import_links_the_product() {
        let f = fixture(tent_and_pack()).await;
        let product = f.service.import_product(&f.supplier_id, "SUP-001").await.unwrap();
        assert_eq!(product.name, "Camping Tent");
        assert_eq!(product.inventory, 45);
        assert!(product.is_active);
        assert_eq!(product.supplier_id.as_deref(), Some(f.supplier_id.as_str()));
        assert_eq!(product.supplier_product_id.as_deref(), Some("SUP-001"));

        let stored = f.store.get("products", &product.id).await.unwrap();
        assert_eq!(stored.data["supplierProductId"], json!("SUP-001"));

        let again = f.service.import_product(&f.supplier_id, "SUP-001").await;
        assert!(matches!(again, Err(ApiError::InvalidInput(m)) if m.contains("already imported")));
    }

    #[tokio::test]
    async fn test_sync_inventory_follows_the_supplier() {
        let f = fixture(tent_and_pack()).await;
        let product = f.service.import_product(&f.supplier_id, "SUP-002").await.unwrap();
        f.api.set_inventory("SUP-002", 7);

        let sync = f.service.sync_inventory(&product.id).await.unwrap();
        assert_eq!(sync, InventorySync { product_id: product.id.clone(), previous: 32, inventory: 7 });
        assert_eq!(f.store.get("products", &product.id).await.unwrap().data["inventory"], json!(7));

        // Negative stock from a supplier is read as sold out.
        f.api.set_inventory("SUP-002", -3);
        assert_eq!(f.service.sync_inventory(&product.id).await.unwrap().inventory, 0);
    }

    #[tokio::test]
    async fn test_sync_rejects_unlinked_products() {
        let f = fixture(tent_and_pack()).await;
        let id = f.store.create("products", json!({"name": "Mug", "price": 5, "inventory": 3})).await.unwrap().id;
        let err = f.service.sync_inventory(&id).await.unwrap_err();
        assert!(matches!(err, ApiError::Supplier(SupplierError::NotLinked)));
    }

    #[tokio::test]
    async fn test_sync_supplier_reports_each_product() {
        let f = fixture(tent_and_pack()).await;
        let tent = f.service.import_product(&f.supplier_id, "SUP-001").await.unwrap();
        let pack = f.service.import_product(&f.supplier_id, "SUP-002").await.unwrap();
        f.api.set_inventory("SUP-001", 2);
        f.api.catalog.lock().unwrap().remove("SUP-002");

        let report = f.service.sync_supplier(&f.supplier_id).await.unwrap();
        assert_eq!(report.updated, vec![InventorySync { product_id: tent.id, previous: 45, inventory: 2 }]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].product_id, pack.id);
    }

    #[tokio::test]
    async fn test_place_order_forwards_only_this_suppliers_lines() {
        let f = fixture(tent_and_pack()).await;
        let tent = f.service.import_product(&f.supplier_id, "SUP-001").await.unwrap();
        let mug = f.store.create("products", json!({"name": "Mug", "price": 5})).await.unwrap().id;
        let line = |product_id: &str, quantity| OrderItem {
            product_id: product_id.to_string(),
            name: "x".into(),
            price: Decimal::ONE,
            quantity,
            category: None,
        };
        let mut order = Order::create("u1", vec![line(&tent.id, 2), line(&mug, 1)], Decimal::ZERO, Decimal::ZERO).unwrap();
        order.shipping_address = Some(Address { city: Some("Boulder".into()), ..Address::default() });
        let order = Collection::<Order>::new(f.store.clone()).create(&order).await.unwrap();

        let placed = f.service.place_order(&f.supplier_id, &order.id).await.unwrap();
        assert_eq!(placed.status, "processing");
        let sent = f.api.orders.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].reference, order.id);
        assert_eq!(sent[0].items, vec![SupplierOrderLine { supplier_product_id: "SUP-001".into(), quantity: 2 }]);
        assert_eq!(sent[0].shipping_address.as_ref().and_then(|a| a.city.as_deref()), Some("Boulder"));
    }

    #[tokio::test]
    async fn test_place_order_without_supplier_lines_is_rejected() {
        let f = fixture(tent_and_pack()).await;
        let mug = f.store.create("products", json!({"name": "Mug", "price": 5})).await.unwrap().id;
        let item = OrderItem { product_id: mug, name: "Mug".into(), price: Decimal::ONE, quantity: 1, category: None };
        let order = Order::create("u1", vec![item], Decimal::ZERO, Decimal::ZERO).unwrap();
        let order = Collection::<Order>::new(f.store.clone()).create(&order).await.unwrap();
        assert!(matches!(f.service.place_order(&f.supplier_id, &order.id).await, Err(ApiError::InvalidInput(_))));
        assert!(f.api.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connection_needs_an_active_endpoint() {
        let f = fixture(tent_and_pack()).await;
        assert!(f.service.check_connection(&f.supplier_id).await.unwrap().connected);

        let bare = f.store.create("suppliers", json!({"name": "Paper Co", "isActive": true})).await.unwrap().id;
        assert!(matches!(
            f.service.check_connection(&bare).await,
            Err(ApiError::Supplier(SupplierError::NotConnected(_)))
        ));

        f.store.update("suppliers", &f.supplier_id, json!({"isActive": false})).await.unwrap();
        assert!(matches!(
            f.service.import_product(&f.supplier_id, "SUP-001").await,
            Err(ApiError::Supplier(SupplierError::Inactive(_)))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_supplier_reports_disconnected() {
        let f = fixture(FakeSupplierApi { offline: true, ..FakeSupplierApi::new() }).await;
        let status = f.service.check_connection(&f.supplier_id).await.unwrap();
        assert!(!status.connected);
        assert!(status.message.contains("503"));
    }

    #[tokio::test]
    async fn test_configure_replaces_settings() {
        let f = fixture(FakeSupplierApi::new()).await;
        let first = serde_json::from_value(json!({"autoSync": true, "markup": 20})).unwrap();
        f.service.configure(&f.supplier_id, first).await.unwrap();
        let second = serde_json::from_value(json!({"autoSync": false})).unwrap();
        let supplier = f.service.configure(&f.supplier_id, second).await.unwrap();
        assert_eq!(serde_json::to_value(&supplier.settings).unwrap(), json!({"autoSync": false}));
        assert_eq!(f.store.get("suppliers", &f.supplier_id).await.unwrap().data["apiKey"], json!("k"));
    }
}
