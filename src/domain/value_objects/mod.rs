//! Value objects for the catalog and promotions

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stock keeping unit, stored upper-cased.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

const SKU_MAX_LEN: usize = 50;

impl Sku {
    pub fn new(raw: impl Into<String>) -> Result<Self, SkuError> {
        let normalized = raw.into().trim().to_uppercase();
        match normalized.len() {
            0 => Err(SkuError::Empty),
            n if n > SKU_MAX_LEN => Err(SkuError::TooLong(n)),
            _ => Ok(Self(normalized)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Sku {
    type Error = SkuError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<Sku> for String {
    fn from(sku: Sku) -> Self {
        sku.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkuError {
    #[error("SKU must not be blank")]
    Empty,
    #[error("SKU is {0} characters, the limit is 50")]
    TooLong(usize),
}

/// Coupon code as typed by the shopper. Matching is exact: no trimming and
/// no case folding.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CouponCode(String);

impl CouponCode {
    pub fn new(value: impl Into<String>) -> Result<Self, CouponCodeError> {
        let value = value.into();
        if value.trim().is_empty() { return Err(CouponCodeError::Empty); }
        if value.len() > 64 { return Err(CouponCodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for CouponCode {
    type Error = CouponCodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<CouponCode> for String {
    fn from(code: CouponCode) -> Self { code.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponCodeError {
    #[error("Coupon code is required")]
    Empty,
    #[error("Coupon code too long")]
    TooLong,
}
