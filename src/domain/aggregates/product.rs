//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::value_objects::Sku;
use crate::store::Entity;

/// Field touched by order placement.
pub const SALES: &str = "sales";
pub const RATINGS: &str = "ratings";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option", skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub inventory: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub ratings: RatingSummary,
    #[serde(default)]
    pub sales: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<String>,
    /// The supplier's own id for this product, set when it was imported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Product {
    const COLLECTION: &'static str = "products";
}

fn default_true() -> bool { true }

/// Aggregate of a product's review ratings. `{0, 0}` when unreviewed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub average: f64,
    pub count: u64,
}

impl RatingSummary {
    pub fn from_ratings(ratings: impl IntoIterator<Item = u8>) -> Self {
        let (sum, count) = ratings.into_iter().fold((0u64, 0u64), |(s, c), r| (s + u64::from(r), c + 1));
        if count == 0 {
            return Self::default();
        }
        Self { average: sum as f64 / count as f64, count }
    }
}

impl Product {
    /// Price the shopper pays: the sale price when one is set.
    pub fn effective_price(&self) -> Decimal {
        self.sale_price.unwrap_or(self.price)
    }

    pub fn is_in_stock(&self) -> bool {
        self.inventory > 0
    }

    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
            || self.category.as_deref().is_some_and(|c| c.to_lowercase().contains(&needle))
    }
}

/// Body of `POST /api/products`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[validate(custom = "super::non_negative")]
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[validate(custom = "super::non_negative")]
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub sale_price: Option<Decimal>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub inventory: i64,
    pub sku: Option<Sku>,
    pub brand: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_featured: bool,
    pub supplier_id: Option<String>,
}

impl CreateProduct {
    pub fn into_product(self) -> Product {
        Product {
            id: String::new(),
            name: self.name,
            description: self.description,
            price: self.price,
            sale_price: self.sale_price,
            category: self.category,
            subcategory: self.subcategory,
            images: self.images,
            inventory: self.inventory,
            sku: self.sku,
            brand: self.brand,
            tags: self.tags,
            is_active: self.is_active.unwrap_or(true),
            is_featured: self.is_featured,
            ratings: RatingSummary::default(),
            sales: 0,
            supplier_id: self.supplier_id,
            supplier_product_id: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Partial update. Ratings and sales are derived and cannot be patched.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    #[validate(length(min = 1, max = 200))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[validate(custom = "super::non_negative")]
    #[serde(default, with = "rust_decimal::serde::float_option", skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[validate(custom = "super::non_negative")]
    #[serde(default, with = "rust_decimal::serde::float_option", skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[validate(range(min = 0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_featured: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<String>,
}
