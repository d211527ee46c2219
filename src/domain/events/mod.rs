//! Domain events
//!
//! Published as JSON on NATS subjects under `commerce.`; the `event` tag
//! names the variant.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::aggregates::{OrderStatus, RatingSummary};
use crate::services::payments::ProviderKind;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderCreated {
        order_id: String,
        user_id: String,
        #[serde(with = "rust_decimal::serde::str")]
        total: Decimal,
    },
    OrderStatusChanged { order_id: String, status: OrderStatus },
    CouponApplied { coupon_id: String, code: String, order_id: String, usage_count: u64 },
    ReviewCreated { review_id: String, product_id: String, rating: u8 },
    ReviewUpdated { review_id: String, product_id: String },
    ReviewDeleted { review_id: String, product_id: String },
    RatingRecomputed { product_id: String, ratings: RatingSummary },
    PaymentCharged {
        provider: ProviderKind,
        payment_id: String,
        #[serde(with = "rust_decimal::serde::str")]
        amount: Decimal,
    },
    ProductImported { product_id: String, supplier_id: String, supplier_product_id: String },
    InventorySynced { product_id: String, supplier_id: String, inventory: i64 },
    SupplierOrderPlaced { supplier_id: String, order_id: String, supplier_order_id: String },
    PaymentRefunded {
        provider: ProviderKind,
        payment_id: String,
        refund_id: String,
        #[serde(with = "rust_decimal::serde::str")]
        amount: Decimal,
    },
}

impl DomainEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::OrderCreated { .. } => "commerce.order.created",
            Self::OrderStatusChanged { .. } => "commerce.order.status_changed",
            Self::CouponApplied { .. } => "commerce.coupon.applied",
            Self::ReviewCreated { .. } => "commerce.review.created",
            Self::ReviewUpdated { .. } => "commerce.review.updated",
            Self::ReviewDeleted { .. } => "commerce.review.deleted",
            Self::RatingRecomputed { .. } => "commerce.product.rating_recomputed",
            Self::PaymentCharged { .. } => "commerce.payment.charged",
            Self::PaymentRefunded { .. } => "commerce.payment.refunded",
            Self::ProductImported { .. } => "commerce.product.imported",
            Self::InventorySynced { .. } => "commerce.product.inventory_synced",
            Self::SupplierOrderPlaced { .. } => "commerce.supplier.order_placed",
        }
    }
}
