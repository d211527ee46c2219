//! Application state shared across handlers.
//!
//! Delegates are built once in `main` and injected here; handlers reach
//! them through accessors and build the cheap per-request services on
//! demand.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{
    CheckoutService, CouponService, DashboardService, DropshippingService, EventPublisher, IdentityProvider,
    OrderService, PaymentProviders, RatingService, SupplierApi,
};
use crate::store::{Collection, DocumentStore, Entity};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    payments: PaymentProviders,
    suppliers: Arc<dyn SupplierApi>,
    events: EventPublisher,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        payments: PaymentProviders,
        suppliers: Arc<dyn SupplierApi>,
        events: EventPublisher,
    ) -> Self {
        Self { inner: Arc::new(AppStateInner { config, store, identity, payments, suppliers, events }) }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    pub fn identity(&self) -> &dyn IdentityProvider {
        self.inner.identity.as_ref()
    }

    pub fn events(&self) -> &EventPublisher {
        &self.inner.events
    }

    /// Typed access to one collection.
    pub fn collection<T: Entity>(&self) -> Collection<T> {
        Collection::new(self.inner.store.clone())
    }

    pub fn coupons(&self) -> CouponService {
        CouponService::new(self.inner.store.clone(), self.inner.events.clone())
    }

    pub fn ratings(&self) -> RatingService {
        RatingService::new(self.inner.store.clone(), self.inner.events.clone())
    }

    pub fn orders(&self) -> OrderService {
        OrderService::new(self.inner.store.clone(), self.inner.events.clone())
    }

    pub fn checkout(&self) -> CheckoutService {
        CheckoutService::new(
            self.inner.store.clone(),
            self.orders(),
            self.inner.payments.clone(),
            self.inner.events.clone(),
        )
    }

    pub fn dropshipping(&self) -> DropshippingService {
        DropshippingService::new(self.inner.store.clone(), self.inner.suppliers.clone(), self.inner.events.clone())
    }

    pub fn dashboard(&self) -> DashboardService {
        DashboardService::new(self.inner.store.clone(), self.inner.config.low_stock_threshold)
    }
}
