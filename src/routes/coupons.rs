//! Coupon handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::auth::{authorize, Capability, Principal};
use crate::domain::aggregates::{Coupon, CouponPatch, CreateCoupon};
use crate::domain::value_objects::CouponCode;
use crate::error::{ApiError, Result, ValidatedJson};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_coupons).post(create_coupon))
        .route("/active", get(active_coupons))
        .route("/validate/:code", post(validate_coupon))
        .route("/apply/:code", post(apply_coupon))
        .route("/:id", get(get_coupon).put(update_coupon).delete(delete_coupon))
}

fn code_from_path(raw: String) -> Result<CouponCode> {
    CouponCode::new(raw).map_err(|e| ApiError::InvalidInput(e.to_string()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateCouponRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize)]
struct ValidationResponse {
    success: bool,
    coupon: Coupon,
    #[serde(with = "rust_decimal::serde::float")]
    discount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    total: Decimal,
}

async fn validate_coupon(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ValidatedJson(body): ValidatedJson<ValidateCouponRequest>,
) -> Result<Json<ValidationResponse>> {
    let code = code_from_path(code)?;
    let (coupon, discount) = state.coupons().validate(code.as_str(), body.subtotal, Utc::now()).await?;
    Ok(Json(ValidationResponse { success: true, coupon, discount: discount.discount, total: discount.total }))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCouponRequest {
    #[validate(length(min = 1))]
    pub order_id: String,
}

async fn apply_coupon(
    principal: Principal,
    State(state): State<AppState>,
    Path(code): Path<String>,
    ValidatedJson(body): ValidatedJson<ApplyCouponRequest>,
) -> Result<Json<Value>> {
    let code = code_from_path(code)?;
    let coupon = state.coupons().apply(code.as_str(), &body.order_id).await?;
    tracing::debug!(uid = %principal.uid, code = %code, "Coupon redeemed by caller");
    Ok(Json(json!({ "success": true, "message": "Coupon applied successfully", "coupon": coupon })))
}

async fn active_coupons(State(state): State<AppState>) -> Result<Json<Value>> {
    let coupons = state.coupons().active(Utc::now()).await?;
    Ok(Json(json!({ "success": true, "coupons": coupons })))
}

async fn list_coupons(principal: Principal, State(state): State<AppState>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageCoupons, None)?;
    let coupons = state.coupons().list().await?;
    Ok(Json(json!({ "success": true, "coupons": coupons })))
}

async fn get_coupon(principal: Principal, State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageCoupons, None)?;
    let coupon = state.coupons().get(&id).await?;
    Ok(Json(json!({ "success": true, "coupon": coupon })))
}

async fn create_coupon(
    principal: Principal,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateCoupon>,
) -> Result<(StatusCode, Json<Value>)> {
    authorize(&principal, Capability::ManageCoupons, None)?;
    let coupon = state.coupons().create(body).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "coupon": coupon }))))
}

async fn update_coupon(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(patch): ValidatedJson<CouponPatch>,
) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageCoupons, None)?;
    let coupon = state.coupons().update(&id, &patch).await?;
    Ok(Json(json!({ "success": true, "coupon": coupon })))
}

async fn delete_coupon(principal: Principal, State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageCoupons, None)?;
    state.coupons().delete(&id).await?;
    tracing::info!(coupon_id = %id, "Coupon deleted");
    Ok(Json(json!({ "success": true, "result": { "id": id, "deleted": true } })))
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_save10_end_to_end() {
        let app = TestApp::new();
        let admin = app.login("a1", "admin").await;
        let (status, created) = app
            .call(
                Method::POST,
                "/api/coupons",
                Some(&admin),
                Some(json!({"code": "SAVE10", "type": "percentage", "value": 10, "isActive": true, "usageCount": 7})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["coupon"]["usageCount"], json!(0));

        let (status, validated) =
            app.call(Method::POST, "/api/coupons/validate/SAVE10", None, Some(json!({"subtotal": 200}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(validated["success"], json!(true));
        assert_eq!(validated["discount"], json!(20.0));
        assert_eq!(validated["total"], json!(180.0));
        assert_eq!(validated["coupon"]["usageCount"], json!(0));

        let customer = app.login("c1", "customer").await;
        let (status, applied) =
            app.call(Method::POST, "/api/coupons/apply/SAVE10", Some(&customer), Some(json!({"orderId": "o1"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(applied["message"], json!("Coupon applied successfully"));
        assert_eq!(applied["coupon"]["usageCount"], json!(1));
    }

    #[tokio::test]
    async fn test_rejections_carry_reasons() {
        let app = TestApp::new();
        app.store
            .create(
                "coupons",
                json!({"code": "BIG", "type": "fixed", "value": 5, "isActive": true, "minPurchase": 50}),
            )
            .await
            .unwrap();

        let (status, body) =
            app.call(Method::POST, "/api/coupons/validate/BIG", None, Some(json!({"subtotal": 49.99}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"success": false, "error": "Minimum purchase of $50 required"}));

        let (status, body) =
            app.call(Method::POST, "/api/coupons/validate/NOPE", None, Some(json!({"subtotal": 10}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], json!("Coupon not found"));
    }

    #[tokio::test]
    async fn test_apply_requires_login() {
        let app = TestApp::new();
        let (status, _) =
            app.call(Method::POST, "/api/coupons/apply/SAVE10", None, Some(json!({"orderId": "o1"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_only_listing() {
        let app = TestApp::new();
        let manager = app.login("m1", "manager").await;
        let (status, _) = app.call(Method::GET, "/api/coupons", Some(&manager), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app.call(Method::GET, "/api/coupons/active", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["coupons"].as_array().unwrap().is_empty());
    }
}
