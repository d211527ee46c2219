//! Profiles and role assignment.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::auth::{authorize, Capability, Principal};
use crate::domain::aggregates::user::{ProfileRecord, ProfileUpdate, RolePatch};
use crate::domain::aggregates::{Role, User};
use crate::error::{ApiError, Result, ValidatedJson};
use crate::state::AppState;
use crate::store::{Direction, Query, StoreError, CREATED_AT};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users/me", get(my_profile).put(update_my_profile))
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:id/role", put(update_role))
}

/// The stored profile, or one derived from the token before the first save.
async fn my_profile(principal: Principal, State(state): State<AppState>) -> Result<Json<Value>> {
    let profile = match state.collection::<User>().get(&principal.uid).await {
        Ok(user) => user,
        Err(StoreError::NotFound { .. }) => User {
            id: principal.uid.clone(),
            email: principal.email.clone(),
            display_name: principal.name.clone(),
            role: principal.role,
            phone: None,
            created_at: None,
            updated_at: None,
        },
        Err(e) => return Err(e.into()),
    };
    Ok(Json(json!({ "success": true, "profile": profile })))
}

async fn update_my_profile(
    principal: Principal,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<ProfileUpdate>,
) -> Result<Json<Value>> {
    let record = ProfileRecord {
        email: &principal.email,
        display_name: body.display_name.as_deref(),
        phone: body.phone.as_deref(),
    };
    let profile = state.collection::<User>().upsert(&principal.uid, &record).await?;
    Ok(Json(json!({ "success": true, "message": "Profile updated successfully", "profile": profile })))
}

async fn list_users(principal: Principal, State(state): State<AppState>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageUsers, None)?;
    let users = state.collection::<User>().query(&Query::new().order_by(CREATED_AT, Direction::Desc)).await?;
    Ok(Json(json!({ "success": true, "users": users })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RoleRequest {
    #[validate(length(min = 1))]
    pub role: String,
}

async fn update_role(
    principal: Principal,
    State(state): State<AppState>,
    Path(uid): Path<String>,
    ValidatedJson(body): ValidatedJson<RoleRequest>,
) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageUsers, None)?;
    let role = Role::parse(&body.role)
        .ok_or_else(|| ApiError::InvalidInput("Invalid role. Must be admin, customer, or manager".to_string()))?;
    let user = state.collection::<User>().upsert(&uid, &RolePatch { role }).await?;
    tracing::info!(uid = %uid, role = role.as_str(), by = %principal.uid, "User role updated");
    Ok(Json(json!({
        "success": true,
        "message": format!("User role updated to {}", role.as_str()),
        "user": user,
    })))
}
