//! Admin dashboard handlers.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{authorize, Capability, Principal};
use crate::error::Result;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(overview))
        .route("/sales", get(sales))
        .route("/inventory", get(inventory))
        .route("/users", get(users))
}

async fn overview(principal: Principal, State(state): State<AppState>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ViewDashboard, None)?;
    let overview = state.dashboard().overview(Utc::now()).await?;
    Ok(Json(json!({ "success": true, "dashboard": overview })))
}

#[derive(Debug, Deserialize)]
pub struct SalesParams {
    pub period: Option<String>,
}

async fn sales(
    principal: Principal,
    State(state): State<AppState>,
    Query(params): Query<SalesParams>,
) -> Result<Json<Value>> {
    authorize(&principal, Capability::ViewDashboard, None)?;
    let analytics = state.dashboard().sales(params.period.as_deref(), Utc::now()).await?;
    Ok(Json(json!({ "success": true, "analytics": analytics })))
}

async fn inventory(principal: Principal, State(state): State<AppState>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ViewDashboard, None)?;
    let report = state.dashboard().inventory().await?;
    Ok(Json(json!({ "success": true, "inventory": report })))
}

async fn users(principal: Principal, State(state): State<AppState>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ViewDashboard, None)?;
    let analytics = state.dashboard().users(Utc::now()).await?;
    Ok(Json(json!({ "success": true, "analytics": analytics })))
}
