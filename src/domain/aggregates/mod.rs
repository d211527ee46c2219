//! Aggregates module
pub mod category;
pub mod chat;
pub mod coupon;
pub mod order;
pub mod product;
pub mod review;
pub mod supplier;
pub mod user;

pub use category::{Category, CategoryPatch, CreateCategory};
pub use chat::{ChatMessage, ChatTranscript, StoreTranscript, WidgetConfig};
pub use coupon::{Coupon, CouponPatch, CouponRejection, CouponType, CreateCoupon, Discount};
pub use order::{Address, CreateOrder, Fulfillment, Order, OrderError, OrderItem, OrderPatch, OrderStatus};
pub use product::{CreateProduct, Product, ProductPatch, RatingSummary};
pub use review::{CreateReview, Review, ReviewPatch};
pub use supplier::{CreateSupplier, Supplier, SupplierLink, SupplierPatch, SupplierSettings};
pub use user::{Role, User};

use rust_decimal::Decimal;
use validator::ValidationError;

pub(crate) fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("non_negative"));
    }
    Ok(())
}
