//! Request authentication.
//!
//! [`Principal`] verifies the bearer token through the identity delegate
//! and resolves the caller's role. Handlers that only sometimes care who
//! is calling use [`OptionalPrincipal`].

pub mod policy;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use serde_json::Value;

use crate::domain::aggregates::{Role, User};
use crate::error::ApiError;
use crate::services::identity::{extract_bearer_token, Identity};
use crate::state::AppState;
use crate::store::{Entity, StoreError};

pub use policy::{authorize, Capability};

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub uid: String,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
}

impl Principal {
    /// Name shown next to user content: display name, then email, then uid.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| Some(self.email.as_str()).filter(|e| !e.is_empty()))
            .unwrap_or(&self.uid)
    }
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
}

/// Stored profile role first, then the token's `role` claim, then customer.
async fn resolve_role(state: &AppState, identity: &Identity) -> Result<Role, ApiError> {
    let stored = match state.store().get(User::COLLECTION, &identity.uid).await {
        Ok(doc) => doc.data.get("role").and_then(Value::as_str).and_then(Role::parse),
        Err(StoreError::NotFound { .. }) => None,
        Err(e) => return Err(e.into()),
    };
    let claimed = || identity.custom_claims.get("role").and_then(Value::as_str).and_then(Role::parse);
    Ok(stored.or_else(claimed).unwrap_or_default())
}

async fn authenticate(state: &AppState, token: &str) -> Result<Principal, ApiError> {
    let identity = state.identity().verify(token).await?;
    let role = resolve_role(state, &identity).await?;
    Ok(Principal { uid: identity.uid, email: identity.email, name: identity.name, role })
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer(parts).ok_or_else(|| ApiError::Unauthorized("No token provided".to_string()))?;
        authenticate(state, token).await
    }
}

/// Caller identity when a valid bearer token is present.
///
/// A missing or invalid token means an anonymous caller, not an error.
#[derive(Debug, Clone)]
pub struct OptionalPrincipal(pub Option<Principal>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer(parts) else {
            return Ok(Self(None));
        };
        match authenticate(state, token).await {
            Ok(principal) => Ok(Self(Some(principal))),
            Err(ApiError::Unauthorized(reason)) => {
                tracing::debug!(%reason, "Ignoring invalid bearer token on public route");
                Ok(Self(None))
            }
            Err(e) => Err(e),
        }
    }
}
