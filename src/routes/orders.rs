//! Order handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use validator::Validate;

use crate::auth::{authorize, Capability, Principal};
use crate::domain::aggregates::{CreateOrder, OrderPatch, OrderStatus};
use crate::error::{Result, ValidatedJson};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/user", get(user_orders))
        .route("/:id", get(get_order).put(update_order))
        .route("/:id/status", patch(update_status))
        .route("/:id/fulfill", post(fulfill_order))
}

async fn create_order(
    principal: Principal,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateOrder>,
) -> Result<(StatusCode, Json<Value>)> {
    let orders = state.orders();
    let order = orders.prepare(&principal.uid, &body, Utc::now()).await?;
    let order = orders.place(&order).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "order": order }))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOrdersParams {
    pub user_id: Option<String>,
}

/// Own orders. Staff may look at someone else's with `?userId=`.
async fn user_orders(
    principal: Principal,
    State(state): State<AppState>,
    Query(params): Query<UserOrdersParams>,
) -> Result<Json<Value>> {
    let user_id = match params.user_id {
        Some(other) if other != principal.uid => {
            authorize(&principal, Capability::ViewAllOrders, None)?;
            other
        }
        _ => principal.uid.clone(),
    };
    let orders = state.orders().list_for_user(&user_id).await?;
    Ok(Json(json!({ "success": true, "orders": orders })))
}

async fn get_order(principal: Principal, State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    let order = state.orders().get(&id).await?;
    authorize(&principal, Capability::ReadOrder, Some(&order.user_id))?;
    Ok(Json(json!({ "success": true, "order": order })))
}

async fn list_orders(principal: Principal, State(state): State<AppState>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ViewAllOrders, None)?;
    let orders = state.orders().list_all().await?;
    Ok(Json(json!({ "success": true, "orders": orders })))
}

async fn update_order(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(patch): ValidatedJson<OrderPatch>,
) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageOrders, None)?;
    let order = state.orders().update(&id, &patch).await?;
    Ok(Json(json!({ "success": true, "order": order })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

async fn update_status(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<StatusRequest>,
) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageOrders, None)?;
    let order = state.orders().set_status(&id, body.status).await?;
    Ok(Json(json!({ "success": true, "order": order })))
}

/// Free-form details (carrier, tracking number, ...) are stored as sent.
async fn fulfill_order(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<String>,
    details: Option<Json<Map<String, Value>>>,
) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageOrders, None)?;
    let details = details.map(|Json(d)| d).unwrap_or_default();
    let order = state.orders().fulfill(&id, details, Utc::now()).await?;
    tracing::info!(order_id = %id, by = %principal.uid, "Order fulfilled");
    Ok(Json(json!({ "success": true, "order": order })))
}
