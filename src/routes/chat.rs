//! Support chat widget and transcripts.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::auth::{authorize, Capability, OptionalPrincipal, Principal};
use crate::domain::aggregates::{ChatTranscript, StoreTranscript, WidgetConfig};
use crate::error::{ApiError, Result, ValidatedJson};
use crate::state::AppState;
use crate::store::{Direction, Query, CREATED_AT};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/config", get(widget_config))
        .route("/script", get(widget_script))
        .route("/transcript", post(store_transcript))
        .route("/transcripts/user", get(user_transcripts))
        .route("/transcripts/all", get(all_transcripts))
}

fn widget(state: &AppState) -> WidgetConfig {
    let config = state.config();
    WidgetConfig { property_id: config.tawk_to_property_id.clone(), widget_id: config.tawk_to_widget_id.clone() }
}

async fn widget_config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "success": true, "config": widget(&state) }))
}

async fn widget_script(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let script = widget(&state)
        .embed_script()
        .ok_or_else(|| ApiError::NotFound("Chat widget is not configured".to_string()))?;
    Ok(([(header::CONTENT_TYPE, "application/javascript")], script))
}

/// Anonymous visitors may post; a valid token ties the transcript to the user.
async fn store_transcript(
    OptionalPrincipal(caller): OptionalPrincipal,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<StoreTranscript>,
) -> Result<(StatusCode, Json<Value>)> {
    let transcript = body.into_transcript(caller.map(|p| p.uid));
    let transcript = state.collection::<ChatTranscript>().create(&transcript).await?;
    tracing::debug!(transcript_id = %transcript.id, messages = transcript.messages.len(), "Chat transcript stored");
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "transcript": transcript }))))
}

async fn user_transcripts(principal: Principal, State(state): State<AppState>) -> Result<Json<Value>> {
    let query = Query::new().eq("userId", principal.uid).order_by(CREATED_AT, Direction::Desc);
    let transcripts = state.collection::<ChatTranscript>().query(&query).await?;
    Ok(Json(json!({ "success": true, "transcripts": transcripts })))
}

async fn all_transcripts(principal: Principal, State(state): State<AppState>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ViewAllTranscripts, None)?;
    let query = Query::new().order_by(CREATED_AT, Direction::Desc);
    let transcripts = state.collection::<ChatTranscript>().query(&query).await?;
    Ok(Json(json!({ "success": true, "transcripts": transcripts })))
}
