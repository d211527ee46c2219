//! Review Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::store::Entity;

pub const HELPFUL_VOTES: &str = "helpfulVotes";
pub const PRODUCT_ID: &str = "productId";
pub const RATING: &str = "rating";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(default)]
    pub id: String,
    pub product_id: String,
    pub user_id: String,
    pub user_name: String,
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub is_verified_purchase: bool,
    #[serde(default)]
    pub helpful_votes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Review {
    const COLLECTION: &'static str = "reviews";
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReview {
    #[validate(length(min = 1))]
    pub product_id: String,
    #[validate(range(min = 1, max = 5))]
    pub rating: u8,
    #[validate(length(max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub content: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl CreateReview {
    pub fn into_review(self, user_id: &str, user_name: &str, is_verified_purchase: bool) -> Review {
        Review {
            id: String::new(),
            product_id: self.product_id,
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            rating: self.rating,
            title: self.title,
            content: self.content,
            images: self.images,
            is_verified_purchase,
            helpful_votes: 0,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Author edits. Product, author and counters stay fixed.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPatch {
    #[validate(range(min = 1, max = 5))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[validate(length(max = 200))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl ReviewPatch {
    pub fn changes_rating_of(&self, review: &Review) -> bool {
        self.rating.is_some_and(|r| r != review.rating)
    }
}
