//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use validator::Validate;

use crate::store::Entity;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Processing, Completed, Fulfilled, Cancelled, Refunded }

impl OrderStatus {
    /// Orders that count as revenue and as a verified purchase.
    pub fn is_settled(self) -> bool { matches!(self, Self::Completed | Self::Fulfilled) }
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Processing => "processing", Self::Completed => "completed",
            Self::Fulfilled => "fulfilled", Self::Cancelled => "cancelled", Self::Refunded => "refunded",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub zip_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub phone: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl OrderItem {
    /// `None` when the line total does not fit in a `Decimal`.
    pub fn line_total(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Fulfillment details recorded by staff. Free-form fields (carrier,
/// tracking, ...) ride along untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fulfillment {
    pub processed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub items: Vec<OrderItem>,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub tax: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub shipping: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub discount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub coupon_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub payment_status: Option<String>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub shipping_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub billing_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub fulfillment: Option<Fulfillment>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Order {
    const COLLECTION: &'static str = "orders";
}

impl Order {
    /// New pending order with totals computed from the priced items.
    pub fn create(user_id: impl Into<String>, items: Vec<OrderItem>, tax: Decimal, shipping: Decimal) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        if items.iter().any(|i| i.quantity == 0) { return Err(OrderError::ZeroQuantity); }
        if tax < Decimal::ZERO || shipping < Decimal::ZERO { return Err(OrderError::NegativeAmount); }
        let subtotal = items
            .iter()
            .try_fold(Decimal::ZERO, |acc, item| item.line_total().and_then(|line| acc.checked_add(line)))
            .ok_or(OrderError::AmountOutOfRange)?;
        let mut order = Self {
            id: String::new(), user_id: user_id.into(), items, subtotal, tax, shipping,
            discount: Decimal::ZERO, total: Decimal::ZERO, coupon_code: None, payment_method: None,
            payment_id: None, payment_status: None, status: OrderStatus::Pending, shipping_address: None,
            billing_address: None, tracking_number: None, notes: None, fulfillment: None,
            created_at: None, updated_at: None,
        };
        order.recalculate()?;
        Ok(order)
    }

    /// Record a coupon discount. Only the part covering the goods is taken
    /// off; tax and shipping are always paid.
    pub fn apply_discount(&mut self, code: impl Into<String>, discount: Decimal) -> Result<(), OrderError> {
        self.coupon_code = Some(code.into());
        self.discount = discount.max(Decimal::ZERO).min(self.subtotal);
        self.recalculate()
    }

    pub fn mark_paid(&mut self, method: impl Into<String>, payment_id: impl Into<String>, payment_status: impl Into<String>) {
        self.payment_method = Some(method.into());
        self.payment_id = Some(payment_id.into());
        self.payment_status = Some(payment_status.into());
        self.status = OrderStatus::Processing;
    }

    pub fn contains_product(&self, product_id: &str) -> bool {
        self.items.iter().any(|i| i.product_id == product_id)
    }

    fn recalculate(&mut self) -> Result<(), OrderError> {
        let gross = self
            .subtotal
            .checked_add(self.tax)
            .and_then(|v| v.checked_add(self.shipping))
            .ok_or(OrderError::AmountOutOfRange)?;
        self.total = (gross - self.discount).max(Decimal::ZERO);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Order must contain at least one item")]
    NoItems,
    #[error("Item quantity must be at least 1")]
    ZeroQuantity,
    #[error("Tax and shipping cannot be negative")]
    NegativeAmount,
    #[error("Order amount is too large")]
    AmountOutOfRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub product_id: String,
    pub quantity: u32,
}

/// Body of `POST /api/orders`. Prices come from the catalog, never the client.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
    #[validate(length(min = 1, max = 100))]
    pub items: Vec<OrderLineRequest>,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub tax: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub shipping: Decimal,
    pub coupon_code: Option<String>,
    pub payment_method: Option<String>,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Staff edits. Totals and ownership are not editable.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderPatch {
    #[serde(skip_serializing_if = "Option::is_none")] pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")] pub payment_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub shipping_address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")] pub billing_address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")] pub tracking_number: Option<String>,
    #[validate(length(max = 2000))]
    #[serde(skip_serializing_if = "Option::is_none")] pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusPatch { pub status: OrderStatus }

#[derive(Debug, Serialize)]
pub struct FulfillmentPatch { pub status: OrderStatus, pub fulfillment: Fulfillment }
