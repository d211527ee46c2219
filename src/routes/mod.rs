//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//!
//! # Catalog
//! GET  /api/products                    - Active products
//! GET  /api/products/featured           - Featured products
//! GET  /api/products/category/:category - Products in a category
//! GET  /api/products/search/:query      - Case-insensitive search
//! GET  /api/products/:id                - Product detail
//! POST /api/products                    - Create (catalog)
//! PUT  /api/products/:id                - Update (catalog)
//! DELETE /api/products/:id              - Delete (catalog)
//! POST /api/products/:id/sync-inventory - Refresh stock from the supplier (admin)
//! GET  /api/products/categories/all     - Categories
//! POST /api/products/categories         - Create category (catalog)
//! PUT  /api/products/categories/:id     - Update category (catalog)
//! DELETE /api/products/categories/:id   - Delete category (catalog)
//!
//! # Coupons
//! GET  /api/coupons/active              - Currently redeemable coupons
//! POST /api/coupons/validate/:code      - Evaluate against a subtotal
//! POST /api/coupons/apply/:code         - Redeem for an order (auth)
//! GET  /api/coupons                     - All coupons (admin)
//! GET  /api/coupons/:id                 - Coupon detail (admin)
//! POST /api/coupons                     - Create (admin)
//! PUT  /api/coupons/:id                 - Update (admin)
//! DELETE /api/coupons/:id               - Delete (admin)
//!
//! # Orders
//! POST /api/orders                      - Place an order (auth)
//! GET  /api/orders/user                 - Own orders (auth)
//! GET  /api/orders/:id                  - Order detail (owner or staff)
//! GET  /api/orders                      - All orders (staff)
//! PUT  /api/orders/:id                  - Update (staff)
//! PATCH /api/orders/:id/status          - Change status (staff)
//! POST /api/orders/:id/fulfill          - Fulfill (staff)
//!
//! # Reviews
//! GET  /api/reviews/product/:productId  - Reviews of a product
//! GET  /api/reviews/:id                 - Review detail
//! POST /api/reviews/:id/helpful         - Vote helpful
//! POST /api/reviews                     - Create (auth)
//! PUT  /api/reviews/:id                 - Update (author or admin)
//! DELETE /api/reviews/:id               - Delete (author or admin)
//!
//! # Suppliers (admin)
//! GET  /api/suppliers                   - List
//! GET  /api/suppliers/:id               - Detail
//! GET  /api/suppliers/:id/products      - Products from the supplier
//! GET  /api/suppliers/:id/catalog       - Supplier's own catalog (remote)
//! GET  /api/suppliers/:id/check-connection - Reachability of the supplier API
//! POST /api/suppliers/:id/import/:productId - Import a supplier product
//! POST /api/suppliers/:id/sync-inventory - Refresh stock of linked products
//! POST /api/suppliers/:id/orders        - Forward an order's lines
//! GET  /api/suppliers/:id/orders/:orderId - Supplier order status
//! PUT  /api/suppliers/:id/settings      - Replace dropshipping settings
//! POST /api/suppliers                   - Create
//! PUT  /api/suppliers/:id               - Update
//! DELETE /api/suppliers/:id             - Delete
//!
//! # Payments
//! POST /api/payments/stripe             - Charge and place (auth)
//! POST /api/payments/square             - Charge and place (auth)
//! POST /api/payments/paypal             - Start PayPal checkout (auth)
//! POST /api/payments/paypal/complete    - Capture and place (auth)
//! POST /api/payments/refund             - Refund (admin)
//!
//! # Chat
//! GET  /api/chat/config                 - Widget ids
//! GET  /api/chat/script                 - Widget embed script
//! POST /api/chat/transcript             - Store a transcript
//! GET  /api/chat/transcripts/user       - Own transcripts (auth)
//! GET  /api/chat/transcripts/all        - All transcripts (admin)
//!
//! # Dashboard (staff)
//! GET  /api/dashboard                   - Overview
//! GET  /api/dashboard/sales             - Sales analytics (?period=week|month|year)
//! GET  /api/dashboard/inventory         - Stock levels
//! GET  /api/dashboard/users             - User analytics
//!
//! # Users
//! GET  /api/users/me                    - Own profile (auth)
//! PUT  /api/users/me                    - Update own profile (auth)
//! GET  /api/admin/users                 - All profiles (admin)
//! PUT  /api/admin/users/:id/role        - Assign a role (admin)
//! ```

pub mod chat;
pub mod coupons;
pub mod dashboard;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reviews;
pub mod suppliers;
pub mod users;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

/// Build the application router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/api/products", products::router())
        .nest("/api/coupons", coupons::router())
        .nest("/api/orders", orders::router())
        .nest("/api/reviews", reviews::router())
        .nest("/api/suppliers", suppliers::router())
        .nest("/api/payments", payments::router())
        .nest("/api/chat", chat::router())
        .nest("/api/dashboard", dashboard::router())
        .merge(users::router())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "canteen42-commerce" }))
}


#[cfg(test)]
mod tests {
    use super::testing::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new();
        let (status, body) = app.call(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("healthy"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = TestApp::new();
        let (status, _) = app.call(Method::GET, "/api/nowhere", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
