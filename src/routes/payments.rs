//! Payment handlers.
//!
//! Card providers charge and place the order in one request. PayPal takes
//! two: the first returns an approval link, the second (after the buyer
//! approved) captures and places the order from the cart sent again.

use axum::{extract::State, routing::post, Json, Router};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::auth::{authorize, Capability, Principal};
use crate::domain::aggregates::{CreateOrder, Order};
use crate::error::{ApiError, Result, ValidatedJson};
use crate::services::payments::{PaymentResult, ProviderKind};
use crate::services::{CheckoutOutcome, PaymentDetails};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stripe", post(stripe_payment))
        .route("/square", post(square_payment))
        .route("/paypal", post(paypal_payment))
        .route("/paypal/complete", post(complete_paypal_payment))
        .route("/refund", post(refund_payment))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StripePaymentRequest {
    #[validate(length(min = 1))]
    pub payment_method_id: String,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[validate]
    pub order_data: CreateOrder,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SquarePaymentRequest {
    #[validate(length(min = 1))]
    pub source_id: String,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[validate]
    pub order_data: CreateOrder,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PayPalPaymentRequest {
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[validate]
    pub order_data: CreateOrder,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompletePayPalRequest {
    /// PayPal order id returned by the first step.
    #[validate(length(min = 1))]
    pub payment_id: String,
    #[validate]
    pub order_data: CreateOrder,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    #[validate(length(min = 1))]
    pub order_id: String,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct PlacedResponse {
    success: bool,
    payment: PaymentResult,
    order: Order,
}

async fn charge_and_place(
    state: &AppState,
    kind: ProviderKind,
    principal: &Principal,
    order_data: &CreateOrder,
    details: PaymentDetails,
) -> Result<Json<PlacedResponse>> {
    match state.checkout().start(kind, &principal.uid, order_data, details, Utc::now()).await? {
        CheckoutOutcome::Placed { order, payment } => Ok(Json(PlacedResponse { success: true, payment, order })),
        CheckoutOutcome::AwaitingApproval { payment, .. } => Err(ApiError::Internal(format!(
            "{kind} payment {} unexpectedly needs approval",
            payment.payment_id
        ))),
    }
}

async fn stripe_payment(
    principal: Principal,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<StripePaymentRequest>,
) -> Result<Json<PlacedResponse>> {
    let details = PaymentDetails { method_ref: Some(body.payment_method_id), currency: body.currency };
    charge_and_place(&state, ProviderKind::Stripe, &principal, &body.order_data, details).await
}

async fn square_payment(
    principal: Principal,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<SquarePaymentRequest>,
) -> Result<Json<PlacedResponse>> {
    let details = PaymentDetails { method_ref: Some(body.source_id), currency: body.currency };
    charge_and_place(&state, ProviderKind::Square, &principal, &body.order_data, details).await
}

async fn paypal_payment(
    principal: Principal,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<PayPalPaymentRequest>,
) -> Result<Json<Value>> {
    let details = PaymentDetails { method_ref: None, currency: body.currency };
    match state.checkout().start(ProviderKind::Paypal, &principal.uid, &body.order_data, details, Utc::now()).await? {
        CheckoutOutcome::AwaitingApproval { payment, amount } => Ok(Json(json!({
            "success": true,
            "payment": payment,
            "amount": amount.to_f64(),
        }))),
        CheckoutOutcome::Placed { order, payment } => Ok(Json(json!({ "success": true, "payment": payment, "order": order }))),
    }
}

async fn complete_paypal_payment(
    principal: Principal,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CompletePayPalRequest>,
) -> Result<Json<PlacedResponse>> {
    let (order, payment) =
        state.checkout().complete_paypal(&body.payment_id, &principal.uid, &body.order_data, Utc::now()).await?;
    Ok(Json(PlacedResponse { success: true, payment, order }))
}

async fn refund_payment(
    principal: Principal,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<RefundRequest>,
) -> Result<Json<Value>> {
    authorize(&principal, Capability::RefundPayments, None)?;
    let (order, refund) = state.checkout().refund_order(&body.order_id, body.amount, body.reason.as_deref()).await?;
    tracing::info!(order_id = %order.id, refund_id = %refund.refund_id, by = %principal.uid, "Order refunded");
    Ok(Json(json!({ "success": true, "refund": refund, "order": order })))
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    fn order_data(product_id: &str) -> Value {
        json!({"items": [{"productId": product_id, "quantity": 1}]})
    }

    #[tokio::test]
    async fn test_stripe_checkout_then_refund() {
        let app = TestApp::new();
        let mug = app.store.create("products", json!({"name": "Mug", "price": 30})).await.unwrap().id;
        let customer = app.login("c1", "customer").await;
        let admin = app.login("a1", "admin").await;

        let (status, body) = app
            .call(
                Method::POST,
                "/api/payments/stripe",
                Some(&customer),
                Some(json!({"paymentMethodId": "pm_card_visa", "orderData": order_data(&mug)})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["order"]["status"], json!("processing"));
        assert_eq!(body["order"]["paymentMethod"], json!("stripe"));
        assert_eq!(body["payment"]["paymentId"], body["order"]["paymentId"]);
        let order_id = body["order"]["id"].as_str().unwrap().to_string();

        let refund = json!({"orderId": order_id, "reason": "damaged"});
        let (status, _) = app.call(Method::POST, "/api/payments/refund", Some(&customer), Some(refund.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app.call(Method::POST, "/api/payments/refund", Some(&admin), Some(refund)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["order"]["status"], json!("refunded"));
        assert!(body["refund"]["refundId"].is_string());
    }

    #[tokio::test]
    async fn test_paypal_two_steps() {
        let app = TestApp::new();
        let mug = app.store.create("products", json!({"name": "Mug", "price": 30})).await.unwrap().id;
        let customer = app.login("c1", "customer").await;

        let (status, body) = app
            .call(Method::POST, "/api/payments/paypal", Some(&customer), Some(json!({"orderData": order_data(&mug)})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["payment"]["approvalUrl"].is_string());
        assert!(body.get("order").is_none());
        assert_eq!(app.store.count("orders").await.unwrap(), 0);

        let payment_id = body["payment"]["paymentId"].clone();
        let (status, body) = app
            .call(
                Method::POST,
                "/api/payments/paypal/complete",
                Some(&customer),
                Some(json!({"paymentId": payment_id, "orderData": order_data(&mug)})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["order"]["paymentMethod"], json!("paypal"));
        assert_eq!(app.store.count("orders").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_square_is_bad_request() {
        let app = TestApp::new();
        let mug = app.store.create("products", json!({"name": "Mug", "price": 30})).await.unwrap().id;
        let customer = app.login("c1", "customer").await;
        let (status, body) = app
            .call(
                Method::POST,
                "/api/payments/square",
                Some(&customer),
                Some(json!({"sourceId": "cnon:card", "orderData": order_data(&mug)})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Payment provider square is not configured"));
    }

    #[tokio::test]
    async fn test_payments_need_login() {
        let app = TestApp::new();
        let (status, _) = app
            .call(Method::POST, "/api/payments/stripe", None, Some(json!({"paymentMethodId": "pm", "orderData": {}})))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
