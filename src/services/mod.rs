//! Delegates and domain services.
//!
//! Delegates wrap something outside the process (identity, payments,
//! supplier APIs, NATS). Services hold the request-independent logic handlers call into.

pub mod checkout;
pub mod coupons;
pub mod dashboard;
pub mod dropshipping;
pub mod events;
pub mod identity;
pub mod orders;
pub mod payments;
pub mod ratings;

pub use checkout::{CheckoutOutcome, CheckoutService, PaymentDetails};
pub use coupons::CouponService;
pub use dashboard::DashboardService;
pub use dropshipping::{DropshippingService, HttpSupplierApi, SupplierApi};
pub use events::EventPublisher;
pub use identity::{Identity, IdentityError, IdentityProvider, JwtIdentityProvider};
pub use orders::OrderService;
pub use payments::{PaymentError, PaymentProvider, PaymentProviders, ProviderKind};
pub use ratings::RatingService;
