//! Coupon lookup, validation and redemption.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::aggregates::coupon::{USAGE_COUNT, USAGE_LIMIT};
use crate::domain::aggregates::{Coupon, CouponPatch, CouponRejection, CreateCoupon, Discount};
use crate::domain::events::DomainEvent;
use crate::error::{ApiError, Result};
use crate::services::events::EventPublisher;
use crate::store::{Collection, DocumentStore, Query, StoreError};

#[derive(Clone)]
pub struct CouponService {
    coupons: Collection<Coupon>,
    events: EventPublisher,
}

impl CouponService {
    pub fn new(store: Arc<dyn DocumentStore>, events: EventPublisher) -> Self {
        Self { coupons: Collection::new(store), events }
    }

    /// Exact-match lookup. Codes are expected to be unique; if they are not,
    /// the oldest coupon wins.
    pub async fn find_by_code(&self, code: &str) -> Result<Coupon> {
        let mut matches = self.coupons.query(&Query::new().eq("code", code)).await?;
        if matches.len() > 1 {
            tracing::warn!(code, count = matches.len(), "Duplicate coupon code, using the oldest");
        }
        if matches.is_empty() {
            return Err(CouponRejection::NotFound.into());
        }
        Ok(matches.swap_remove(0))
    }

    /// Check a code against a subtotal without touching the coupon.
    pub async fn validate(&self, code: &str, subtotal: Decimal, now: DateTime<Utc>) -> Result<(Coupon, Discount)> {
        if code.trim().is_empty() {
            return Err(ApiError::InvalidInput("Coupon code is required".to_string()));
        }
        if subtotal < Decimal::ZERO {
            return Err(ApiError::InvalidInput("Subtotal cannot be negative".to_string()));
        }
        let coupon = self.find_by_code(code).await?;
        let discount = coupon.evaluate(subtotal, now)?;
        Ok((coupon, discount))
    }

    /// Redeem a coupon for an order. The usage counter is bumped atomically
    /// by the store and only while it is under the limit.
    pub async fn apply(&self, code: &str, order_id: &str) -> Result<Coupon> {
        let coupon = self.find_by_code(code).await?;
        let updated = match self.coupons.increment_if_below(&coupon.id, USAGE_COUNT, USAGE_LIMIT).await {
            Ok(updated) => updated,
            Err(StoreError::ConditionFailed { .. }) => return Err(CouponRejection::UsageLimitReached.into()),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(coupon_id = %updated.id, code, order_id, usage_count = updated.usage_count, "Coupon applied");
        self.events
            .publish(DomainEvent::CouponApplied {
                coupon_id: updated.id.clone(),
                code: updated.code.clone(),
                order_id: order_id.to_string(),
                usage_count: updated.usage_count,
            })
            .await;
        Ok(updated)
    }

    pub async fn list(&self) -> Result<Vec<Coupon>> {
        Ok(self.coupons.all().await?)
    }

    /// Coupons redeemable right now, ignoring any minimum purchase.
    pub async fn active(&self, now: DateTime<Utc>) -> Result<Vec<Coupon>> {
        let coupons = self.coupons.query(&Query::new().eq("isActive", true)).await?;
        Ok(coupons.into_iter().filter(|c| c.is_redeemable_at(now)).collect())
    }

    pub async fn get(&self, id: &str) -> Result<Coupon> {
        Ok(self.coupons.get(id).await?)
    }

    pub async fn create(&self, input: CreateCoupon) -> Result<Coupon> {
        self.ensure_code_free(&input.code, None).await?;
        let code = input.code.clone();
        let coupon = self.coupons.create(&input.into_coupon()).await.map_err(|e| code_taken(&code, e))?;
        tracing::info!(coupon_id = %coupon.id, code = %coupon.code, "Coupon created");
        Ok(coupon)
    }

    pub async fn update(&self, id: &str, patch: &CouponPatch) -> Result<Coupon> {
        self.coupons.get(id).await?;
        if let Some(code) = &patch.code {
            self.ensure_code_free(code, Some(id)).await?;
        }
        let code = patch.code.as_deref().unwrap_or_default();
        self.coupons.update(id, patch).await.map_err(|e| code_taken(code, e))
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.coupons.get(id).await?;
        Ok(self.coupons.delete(id).await?)
    }

    async fn ensure_code_free(&self, code: &str, except: Option<&str>) -> Result<()> {
        let taken = self.coupons.query(&Query::new().eq("code", code)).await?;
        if taken.iter().any(|c| Some(c.id.as_str()) != except) {
            return Err(ApiError::InvalidInput(format!("Coupon code {code} already exists")));
        }
        Ok(())
    }
}

/// A concurrent writer can claim a code between the check and the write; the
/// store's unique index then reports a conflict.
fn code_taken(code: &str, err: StoreError) -> ApiError {
    match err {
        StoreError::Conflict { .. } => ApiError::InvalidInput(format!("Coupon code {code} already exists")),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::CouponType;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn service() -> CouponService {
        CouponService::new(Arc::new(MemoryStore::new()), EventPublisher::disabled())
    }

    fn input(code: &str, kind: &str, value: i64) -> CreateCoupon {
        CreateCoupon {
            code: code.to_string(),
            description: None,
            kind: CouponType::from(kind.to_string()),
            value: Decimal::from(value),
            min_purchase: None,
            max_discount: None,
            start_date: None,
            end_date: None,
            is_active: true,
            usage_limit: None,
            applicable_products: vec![],
            applicable_categories: vec![],
        }
    }

    #[tokio::test]
    async fn test_validate_and_apply() {
        let coupons = service();
        coupons.create(input("SAVE10", "percentage", 10)).await.unwrap();

        let (_, discount) = coupons.validate("SAVE10", Decimal::from(200), Utc::now()).await.unwrap();
        assert_eq!(discount.discount, Decimal::from(20));
        assert_eq!(discount.total, Decimal::from(180));

        let applied = coupons.apply("SAVE10", "order-1").await.unwrap();
        assert_eq!(applied.usage_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_code() {
        let err = service().validate("NOPE", Decimal::ONE, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ApiError::CouponRejected(CouponRejection::NotFound)));
    }

    #[tokio::test]
    async fn test_blank_code_and_negative_subtotal() {
        let coupons = service();
        assert!(matches!(coupons.validate(" ", Decimal::ONE, Utc::now()).await, Err(ApiError::InvalidInput(_))));
        assert!(matches!(
            coupons.validate("X", Decimal::NEGATIVE_ONE, Utc::now()).await,
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_stops_at_limit() {
        let coupons = service();
        let mut once = input("ONCE", "fixed", 5);
        once.usage_limit = Some(1);
        coupons.create(once).await.unwrap();

        coupons.apply("ONCE", "o1").await.unwrap();
        let err = coupons.apply("ONCE", "o2").await.unwrap_err();
        assert!(matches!(err, ApiError::CouponRejected(CouponRejection::UsageLimitReached)));
        let rejected = coupons.validate("ONCE", Decimal::TEN, Utc::now()).await.unwrap_err();
        assert_eq!(rejected.to_string(), "Coupon usage limit reached");
    }

    #[tokio::test]
    async fn test_concurrent_apply_respects_limit() {
        let coupons = service();
        let mut limited = input("RUSH", "fixed", 5);
        limited.usage_limit = Some(3);
        coupons.create(limited).await.unwrap();

        let attempts: Vec<_> = (0..10)
            .map(|i| {
                let coupons = coupons.clone();
                tokio::spawn(async move { coupons.apply("RUSH", &format!("o{i}")).await.is_ok() })
            })
            .collect();
        let mut applied = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                applied += 1;
            }
        }
        assert_eq!(applied, 3);
        assert_eq!(coupons.find_by_code("RUSH").await.unwrap().usage_count, 3);
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let coupons = service();
        coupons.create(input("DUP", "fixed", 1)).await.unwrap();
        assert!(matches!(coupons.create(input("DUP", "fixed", 2)).await, Err(ApiError::InvalidInput(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_with_one_code() {
        let coupons = service();
        let attempts: Vec<_> = (0..12)
            .map(|i| {
                let coupons = coupons.clone();
                tokio::spawn(async move { coupons.create(input("RACE", "fixed", i + 1)).await })
            })
            .collect();
        let mut created = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => created += 1,
                Err(ApiError::InvalidInput(message)) => assert_eq!(message, "Coupon code RACE already exists"),
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(coupons.list().await.unwrap().len(), 1);
    }

    #[test]
    fn test_store_conflict_reads_as_taken_code() {
        let conflict = StoreError::Conflict { collection: "coupons".into(), field: "code".into() };
        assert!(matches!(
            code_taken("SAVE10", conflict),
            ApiError::InvalidInput(message) if message == "Coupon code SAVE10 already exists"
        ));
        assert!(matches!(code_taken("SAVE10", StoreError::not_found("coupons", "c1")), ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_active_filters_window() {
        let coupons = service();
        let now = Utc::now();
        coupons.create(input("LIVE", "fixed", 1)).await.unwrap();
        let mut expired = input("OLD", "fixed", 1);
        expired.end_date = Some(now - Duration::days(1));
        coupons.create(expired).await.unwrap();
        let mut off = input("OFF", "fixed", 1);
        off.is_active = false;
        coupons.create(off).await.unwrap();

        let codes: Vec<_> = coupons.active(now).await.unwrap().into_iter().map(|c| c.code).collect();
        assert_eq!(codes, vec!["LIVE"]);
    }

    #[tokio::test]
    async fn test_update_cannot_reset_usage() {
        let coupons = service();
        let created = coupons.create(input("KEEP", "fixed", 1)).await.unwrap();
        coupons.apply("KEEP", "o1").await.unwrap();
        let patch = CouponPatch { value: Some(Decimal::from(3)), ..Default::default() };
        let updated = coupons.update(&created.id, &patch).await.unwrap();
        assert_eq!(updated.value, Decimal::from(3));
        assert_eq!(updated.usage_count, 1);
    }
}
