//! Coupon Aggregate
//!
//! Eligibility and discount computation are pure: given a coupon, a subtotal
//! and an instant they either produce a [`Discount`] or a [`CouponRejection`]
//! carrying the reason shown to the shopper.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::store::Entity;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CouponType {
    Percentage,
    Fixed,
    /// Stored value we do not know how to evaluate. Kept verbatim so that
    /// reads and writes do not lose it.
    Other(String),
}

impl From<String> for CouponType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "percentage" => Self::Percentage,
            "fixed" => Self::Fixed,
            _ => Self::Other(value),
        }
    }
}

impl From<CouponType> for String {
    fn from(kind: CouponType) -> Self {
        match kind {
            CouponType::Percentage => "percentage".to_string(),
            CouponType::Fixed => "fixed".to_string(),
            CouponType::Other(value) => value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    #[serde(default)]
    pub id: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: CouponType,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option", skip_serializing_if = "Option::is_none")]
    pub min_purchase: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option", skip_serializing_if = "Option::is_none")]
    pub max_discount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_limit: Option<u64>,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub applicable_products: Vec<String>,
    #[serde(default)]
    pub applicable_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Coupon {
    const COLLECTION: &'static str = "coupons";
}

/// Field names used by the store's conditional increment.
pub const USAGE_COUNT: &str = "usageCount";
pub const USAGE_LIMIT: &str = "usageLimit";

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CouponRejection {
    #[error("Coupon not found")]
    NotFound,
    #[error("Coupon is not active")]
    Inactive,
    #[error("Coupon is not yet valid")]
    NotYetValid,
    #[error("Coupon has expired")]
    Expired,
    #[error("Coupon usage limit reached")]
    UsageLimitReached,
    #[error("Minimum purchase of ${} required", .0.normalize())]
    MinimumPurchase(Decimal),
    #[error("Unsupported coupon type: {0}")]
    UnsupportedType(String),
    #[error("Subtotal is too large to discount")]
    AmountOutOfRange,
}

/// Outcome of a successful evaluation. `total` never drops below zero,
/// even when a fixed discount exceeds the subtotal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Discount {
    pub discount: Decimal,
    pub total: Decimal,
}

impl Coupon {
    /// Date window, active flag and usage cap. The minimum purchase is left
    /// out; it depends on the cart.
    pub fn is_redeemable_at(&self, now: DateTime<Utc>) -> bool {
        self.check_window(now).is_ok()
    }

    fn check_window(&self, now: DateTime<Utc>) -> Result<(), CouponRejection> {
        if !self.is_active {
            return Err(CouponRejection::Inactive);
        }
        if self.start_date.is_some_and(|start| start > now) {
            return Err(CouponRejection::NotYetValid);
        }
        if self.end_date.is_some_and(|end| end < now) {
            return Err(CouponRejection::Expired);
        }
        if self.usage_limit.is_some_and(|limit| self.usage_count >= limit) {
            return Err(CouponRejection::UsageLimitReached);
        }
        Ok(())
    }

    /// Checks run in a fixed order and stop at the first failure.
    pub fn check_eligibility(&self, subtotal: Decimal, now: DateTime<Utc>) -> Result<(), CouponRejection> {
        self.check_window(now)?;
        match self.min_purchase {
            Some(threshold) if subtotal < threshold => Err(CouponRejection::MinimumPurchase(threshold)),
            _ => Ok(()),
        }
    }

    pub fn evaluate(&self, subtotal: Decimal, now: DateTime<Utc>) -> Result<Discount, CouponRejection> {
        self.check_eligibility(subtotal, now)?;
        let raw = match &self.kind {
            CouponType::Percentage => subtotal
                .checked_mul(self.value)
                .and_then(|v| v.checked_div(ONE_HUNDRED))
                .ok_or(CouponRejection::AmountOutOfRange)?,
            CouponType::Fixed => self.value,
            CouponType::Other(kind) => return Err(CouponRejection::UnsupportedType(kind.clone())),
        };
        let discount = match self.max_discount {
            Some(max) => raw.min(max),
            None => raw,
        }
        .max(Decimal::ZERO);
        let total = subtotal.checked_sub(discount).ok_or(CouponRejection::AmountOutOfRange)?.max(Decimal::ZERO);
        Ok(Discount { discount, total })
    }
}

/// Body of `POST /api/coupons`. The usage counter always starts at zero.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCoupon {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: CouponType,
    #[validate(custom = "super::non_negative")]
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    #[validate(custom = "super::non_negative")]
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub min_purchase: Option<Decimal>,
    #[validate(custom = "super::non_negative")]
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub max_discount: Option<Decimal>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub usage_limit: Option<u64>,
    #[serde(default)]
    pub applicable_products: Vec<String>,
    #[serde(default)]
    pub applicable_categories: Vec<String>,
}

fn default_true() -> bool { true }

impl CreateCoupon {
    pub fn into_coupon(self) -> Coupon {
        Coupon {
            id: String::new(),
            code: self.code,
            description: self.description,
            kind: self.kind,
            value: self.value,
            min_purchase: self.min_purchase,
            max_discount: self.max_discount,
            start_date: self.start_date,
            end_date: self.end_date,
            is_active: self.is_active,
            usage_limit: self.usage_limit,
            usage_count: 0,
            applicable_products: self.applicable_products,
            applicable_categories: self.applicable_categories,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Admin edits. `usageCount` is owned by redemption and is not accepted.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CouponPatch {
    #[validate(length(min = 1, max = 64))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<CouponType>,
    #[validate(custom = "super::non_negative")]
    #[serde(default, with = "rust_decimal::serde::float_option", skip_serializing_if = "Option::is_none")]
    pub value: Option<Decimal>,
    #[validate(custom = "super::non_negative")]
    #[serde(default, with = "rust_decimal::serde::float_option", skip_serializing_if = "Option::is_none")]
    pub min_purchase: Option<Decimal>,
    #[validate(custom = "super::non_negative")]
    #[serde(default, with = "rust_decimal::serde::float_option", skip_serializing_if = "Option::is_none")]
    pub max_discount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicable_products: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicable_categories: Option<Vec<String>>,
}
