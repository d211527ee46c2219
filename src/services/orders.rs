//! Order pricing and placement.
//!
//! Items are priced from the catalog, never from the request body. A
//! coupon is validated while pricing and redeemed only after the order
//! exists, so the redemption can name the order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::domain::aggregates::product::SALES;
use crate::domain::aggregates::order::{FulfillmentPatch, StatusPatch};
use crate::domain::aggregates::{CreateOrder, Fulfillment, Order, OrderItem, OrderPatch, OrderStatus, Product};
use crate::domain::events::DomainEvent;
use crate::error::{ApiError, Result};
use crate::services::coupons::CouponService;
use crate::services::events::EventPublisher;
use crate::store::{Collection, Direction, DocumentStore, Query, StoreError, CREATED_AT};

const USER_ID: &str = "userId";

#[derive(Clone)]
pub struct OrderService {
    orders: Collection<Order>,
    products: Collection<Product>,
    coupons: CouponService,
    events: EventPublisher,
}

impl OrderService {
    pub fn new(store: Arc<dyn DocumentStore>, events: EventPublisher) -> Self {
        Self {
            orders: Collection::new(store.clone()),
            products: Collection::new(store.clone()),
            coupons: CouponService::new(store, events.clone()),
            events,
        }
    }

    /// Build a priced, unsaved order for `user_id`.
    pub async fn prepare(&self, user_id: &str, request: &CreateOrder, now: DateTime<Utc>) -> Result<Order> {
        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let product = match self.products.get(&line.product_id).await {
                Ok(product) => product,
                Err(StoreError::NotFound { .. }) => {
                    return Err(ApiError::InvalidInput(format!("Product {} not found", line.product_id)))
                }
                Err(e) => return Err(e.into()),
            };
            if !product.is_active {
                return Err(ApiError::InvalidInput(format!("Product {} is not available", product.name)));
            }
            items.push(OrderItem {
                price: product.effective_price(),
                product_id: product.id,
                name: product.name,
                quantity: line.quantity,
                category: product.category,
            });
        }

        let mut order = Order::create(user_id, items, request.tax, request.shipping)?;
        order.payment_method = request.payment_method.clone();
        order.shipping_address = request.shipping_address.clone();
        order.billing_address = request.billing_address.clone();
        order.notes = request.notes.clone();

        if let Some(code) = request.coupon_code.as_deref().filter(|c| !c.trim().is_empty()) {
            let (_, discount) = self.coupons.validate(code, order.subtotal, now).await?;
            order.apply_discount(code, discount.discount)?;
        }
        Ok(order)
    }

    /// Persist a prepared order and redeem its coupon.
    ///
    /// If the coupon ran out between pricing and redemption the order is
    /// removed again and the rejection is returned.
    pub async fn place(&self, order: &Order) -> Result<Order> {
        let created = self.orders.create(order).await?;

        if let Some(code) = created.coupon_code.as_deref() {
            if let Err(e) = self.coupons.apply(code, &created.id).await {
                if let Err(cleanup) = self.orders.delete(&created.id).await {
                    tracing::error!(order_id = %created.id, error = %cleanup, "Failed to remove unredeemed order");
                }
                return Err(e);
            }
        }

        for item in &created.items {
            if let Err(e) = self.products.increment(&item.product_id, SALES, i64::from(item.quantity)).await {
                tracing::warn!(product_id = %item.product_id, error = %e, "Failed to record product sales");
            }
        }

        tracing::info!(order_id = %created.id, user_id = %created.user_id, total = %created.total, "Order placed");
        self.events
            .publish(DomainEvent::OrderCreated {
                order_id: created.id.clone(),
                user_id: created.user_id.clone(),
                total: created.total,
            })
            .await;
        Ok(created)
    }

    pub async fn get(&self, id: &str) -> Result<Order> {
        Ok(self.orders.get(id).await?)
    }

    /// Newest first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>> {
        let query = Query::new().eq(USER_ID, user_id).order_by(CREATED_AT, Direction::Desc);
        Ok(self.orders.query(&query).await?)
    }

    pub async fn list_all(&self) -> Result<Vec<Order>> {
        Ok(self.orders.query(&Query::new().order_by(CREATED_AT, Direction::Desc)).await?)
    }

    pub async fn update(&self, id: &str, patch: &OrderPatch) -> Result<Order> {
        self.orders.get(id).await?;
        let order = self.orders.update(id, patch).await?;
        if let Some(status) = patch.status {
            self.status_changed(&order.id, status).await;
        }
        Ok(order)
    }

    pub async fn set_status(&self, id: &str, status: OrderStatus) -> Result<Order> {
        self.orders.get(id).await?;
        let order = self.orders.update(id, &StatusPatch { status }).await?;
        self.status_changed(&order.id, status).await;
        Ok(order)
    }

    pub async fn fulfill(&self, id: &str, details: Map<String, Value>, now: DateTime<Utc>) -> Result<Order> {
        self.orders.get(id).await?;
        let patch = FulfillmentPatch {
            status: OrderStatus::Fulfilled,
            fulfillment: Fulfillment { processed_at: now, details },
        };
        let order = self.orders.update(id, &patch).await?;
        self.status_changed(&order.id, OrderStatus::Fulfilled).await;
        Ok(order)
    }

    /// Whether `user_id` has a settled order containing `product_id`.
    pub async fn has_purchased(&self, user_id: &str, product_id: &str) -> Result<bool> {
        let orders = self.orders.query(&Query::new().eq(USER_ID, user_id)).await?;
        Ok(orders.iter().any(|o| o.status.is_settled() && o.contains_product(product_id)))
    }

    async fn status_changed(&self, order_id: &str, status: OrderStatus) {
        tracing::info!(order_id, status = status.as_str(), "Order status changed");
        self.events
            .publish(DomainEvent::OrderStatusChanged { order_id: order_id.to_string(), status })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::OrderLineRequest;
    use crate::domain::aggregates::CouponRejection;
    use crate::store::{Entity, MemoryStore};
    use rust_decimal::Decimal;
    use serde_json::json;

    struct Fixture {
        store: Arc<dyn DocumentStore>,
        orders: OrderService,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        Fixture { orders: OrderService::new(store.clone(), EventPublisher::disabled()), store }
    }

    impl Fixture {
        async fn product(&self, data: Value) -> String {
            self.store.create(Product::COLLECTION, data).await.unwrap().id
        }

        async fn coupon(&self, data: Value) {
            self.store.create("coupons", data).await.unwrap();
        }
    }

    fn request(lines: &[(&str, u32)], coupon: Option<&str>) -> CreateOrder {
        CreateOrder {
            items: lines
                .iter()
                .map(|(id, qty)| OrderLineRequest { product_id: id.to_string(), quantity: *qty })
                .collect(),
            tax: Decimal::ZERO,
            shipping: Decimal::from(5),
            coupon_code: coupon.map(str::to_string),
            payment_method: None,
            shipping_address: None,
            billing_address: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_prepare_prices_from_catalog() {
        let fx = fixture();
        let mug = fx.product(json!({"name": "Mug", "price": 10, "salePrice": 8, "category": "kitchen"})).await;
        let tea = fx.product(json!({"name": "Tea", "price": 4.5})).await;

        let order = fx.orders.prepare("u1", &request(&[(&mug, 2), (&tea, 1)], None), Utc::now()).await.unwrap();
        assert_eq!(order.subtotal, Decimal::new(205, 1));
        assert_eq!(order.total, Decimal::new(255, 1));
        assert_eq!(order.items[0].category.as_deref(), Some("kitchen"));
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_prepare_rejects_unknown_product() {
        let fx = fixture();
        let err = fx.orders.prepare("u1", &request(&[("missing", 1)], None), Utc::now()).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_place_redeems_coupon_and_counts_sales() {
        let fx = fixture();
        let mug = fx.product(json!({"name": "Mug", "price": 100})).await;
        fx.coupon(json!({"code": "SAVE10", "type": "percentage", "value": 10, "isActive": true})).await;

        let order = fx.orders.prepare("u1", &request(&[(&mug, 2)], Some("SAVE10")), Utc::now()).await.unwrap();
        assert_eq!(order.discount, Decimal::from(20));
        assert_eq!(order.total, Decimal::from(185));

        let placed = fx.orders.place(&order).await.unwrap();
        assert!(!placed.id.is_empty());
        let coupon = fx.store.query("coupons", &Query::new().eq("code", "SAVE10")).await.unwrap();
        assert_eq!(coupon[0].data["usageCount"], json!(1));
        let product: Product = Collection::new(fx.store.clone()).get(&mug).await.unwrap();
        assert_eq!(product.sales, 2);
    }

    #[tokio::test]
    async fn test_place_rolls_back_when_coupon_runs_out() {
        let fx = fixture();
        let mug = fx.product(json!({"name": "Mug", "price": 100})).await;
        fx.coupon(json!({"code": "LAST", "type": "fixed", "value": 5, "isActive": true, "usageLimit": 1})).await;

        let first = fx.orders.prepare("u1", &request(&[(&mug, 1)], Some("LAST")), Utc::now()).await.unwrap();
        let second = first.clone();
        fx.orders.place(&first).await.unwrap();

        let err = fx.orders.place(&second).await.unwrap_err();
        assert!(matches!(err, ApiError::CouponRejected(CouponRejection::UsageLimitReached)));
        assert_eq!(fx.orders.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_verified_purchase_requires_settled_order() {
        let fx = fixture();
        let mug = fx.product(json!({"name": "Mug", "price": 10})).await;
        let order = fx.orders.prepare("u1", &request(&[(&mug, 1)], None), Utc::now()).await.unwrap();
        let placed = fx.orders.place(&order).await.unwrap();
        assert!(!fx.orders.has_purchased("u1", &mug).await.unwrap());

        fx.orders.set_status(&placed.id, OrderStatus::Completed).await.unwrap();
        assert!(fx.orders.has_purchased("u1", &mug).await.unwrap());
        assert!(!fx.orders.has_purchased("u2", &mug).await.unwrap());
    }

    #[tokio::test]
    async fn test_fulfill_records_details() {
        let fx = fixture();
        let mug = fx.product(json!({"name": "Mug", "price": 10})).await;
        let order = fx.orders.prepare("u1", &request(&[(&mug, 1)], None), Utc::now()).await.unwrap();
        let placed = fx.orders.place(&order).await.unwrap();

        let details = json!({"carrier": "DHL"}).as_object().cloned().unwrap();
        let fulfilled = fx.orders.fulfill(&placed.id, details, Utc::now()).await.unwrap();
        assert_eq!(fulfilled.status, OrderStatus::Fulfilled);
        let fulfillment = fulfilled.fulfillment.unwrap();
        assert_eq!(fulfillment.details["carrier"], json!("DHL"));
    }
}
