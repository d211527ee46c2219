//! Canteen42 Commerce API
//!
//! REST backend for a storefront: catalog, orders, coupons, reviews with
//! rating aggregation, suppliers, card and PayPal checkout, support chat
//! transcripts and an admin dashboard.
//!
//! ## Layout
//! - `domain`: typed records, request bodies and pure rules (coupon evaluation)
//! - `store`: document store contract with Postgres and in-memory backends
//! - `services`: identity, payments, events and the workflows built on them
//! - `auth`: bearer-token extractors and the authorization policy
//! - `routes`: axum handlers under `/api`

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

pub use error::{ApiError, Result};
pub use state::AppState;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Full application with HTTP tracing and CORS applied.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config().cors_origins);
    routes::routes().layer(TraceLayer::new_for_http()).layer(cors).with_state(state)
}

/// Any origin when none are configured.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new().allow_origin(allowed).allow_methods(Any).allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::TestApp;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let test = TestApp::with_lookup(|key| (key == "CORS_ORIGINS").then(|| "https://shop.example".to_string()));
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "https://shop.example")
            .body(Body::empty())
            .unwrap();

        let response = app(test.state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://shop.example"
        );
    }
}
