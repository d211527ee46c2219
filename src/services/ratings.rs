//! Product rating aggregation.
//!
//! The summary is recomputed from every review of the product after each
//! review write, in one store operation, so concurrent writers cannot
//! leave a stale `{average, count}` behind.

use std::sync::Arc;

use crate::domain::aggregates::product::RATINGS;
use crate::domain::aggregates::review::{PRODUCT_ID, RATING};
use crate::domain::aggregates::{Product, RatingSummary, Review};
use crate::domain::events::DomainEvent;
use crate::error::Result;
use crate::services::events::EventPublisher;
use crate::store::{AverageSpec, Collection, DocumentStore, Entity, Query, StoreError};

const PRODUCT_RATINGS: AverageSpec<'static> =
    AverageSpec { source: Review::COLLECTION, key: PRODUCT_ID, value: RATING, field: RATINGS };

#[derive(Clone)]
pub struct RatingService {
    reviews: Collection<Review>,
    products: Collection<Product>,
    events: EventPublisher,
}

impl RatingService {
    pub fn new(store: Arc<dyn DocumentStore>, events: EventPublisher) -> Self {
        Self { reviews: Collection::new(store.clone()), products: Collection::new(store), events }
    }

    pub async fn recompute(&self, product_id: &str) -> Result<RatingSummary> {
        let ratings = match self.products.store_average(product_id, PRODUCT_RATINGS).await {
            Ok(product) => product.ratings,
            Err(StoreError::NotFound { .. }) => {
                tracing::warn!(product_id, "Reviewed product no longer exists, rating not stored");
                let reviews = self.reviews.query(&Query::new().eq(PRODUCT_ID, product_id)).await?;
                return Ok(RatingSummary::from_ratings(reviews.iter().map(|r| r.rating)));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(product_id, average = ratings.average, count = ratings.count, "Product rating updated");
        self.events
            .publish(DomainEvent::RatingRecomputed { product_id: product_id.to_string(), ratings })
            .await;
        Ok(ratings)
    }
}
