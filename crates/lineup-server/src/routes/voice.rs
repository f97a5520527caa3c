use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

type ErrorResponse = (StatusCode, Json<Value>);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Caller {
    #[serde(default)]
    user_id: Option<String>,
}

// The voice key is server-side, but these endpoints still require an
// authenticated caller
fn require_user(user_id: Option<&str>) -> Result<(), ErrorResponse> {
    user_id
        .filter(|id| !id.is_empty())
        .map(|_| ())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Unauthorized: No user ID found"})),
            )
        })
}

fn voice_error(e: anyhow::Error) -> ErrorResponse {
    tracing::error!("Voice request failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "Internal server error"})),
    )
}

async fn list_voices(
    State(state): State<AppState>,
    Query(caller): Query<Caller>,
) -> Result<Json<Value>, ErrorResponse> {
    require_user(caller.user_id.as_deref())?;
    let voices = state.voice_client().voices().await.map_err(voice_error)?;
    Ok(Json(json!({"voices": voices})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeakRequest {
    #[serde(default)]
    user_id: Option<String>,
    text: String,
    voice_id: String,
    #[serde(default)]
    model_id: Option<String>,
}

// Synthesize speech and hand back an inline audio data URI
async fn speak(
    State(state): State<AppState>,
    Json(request): Json<SpeakRequest>,
) -> Result<Json<Value>, ErrorResponse> {
    require_user(request.user_id.as_deref())?;
    if request.text.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "No text provided"})),
        ));
    }
    let audio = state
        .voice_client()
        .synthesize(&request.text, &request.voice_id, request.model_id.as_deref())
        .await
        .map_err(voice_error)?;
    Ok(Json(json!({"audio": audio})))
}

async fn list_agents(
    State(state): State<AppState>,
    Query(caller): Query<Caller>,
) -> Result<Json<Value>, ErrorResponse> {
    require_user(caller.user_id.as_deref())?;
    let agents = state.voice_client().agents().await.map_err(voice_error)?;
    Ok(Json(json!({"agents": agents})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAgentRequest {
    #[serde(default)]
    user_id: Option<String>,
    name: String,
    voice_id: String,
    first_message: String,
    system_prompt: String,
}

async fn create_agent(
    State(state): State<AppState>,
    Json(request): Json<CreateAgentRequest>,
) -> Result<Json<Value>, ErrorResponse> {
    require_user(request.user_id.as_deref())?;
    let agent = state
        .voice_client()
        .create_agent(
            &request.name,
            &request.voice_id,
            &request.first_message,
            &request.system_prompt,
        )
        .await
        .map_err(voice_error)?;
    Ok(Json(json!({"agent": agent})))
}

async fn delete_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(caller): Query<Caller>,
) -> Result<Json<Value>, ErrorResponse> {
    require_user(caller.user_id.as_deref())?;
    state
        .voice_client()
        .delete_agent(&agent_id)
        .await
        .map_err(voice_error)?;
    Ok(Json(json!({"success": true})))
}

async fn agent_conversations(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(caller): Query<Caller>,
) -> Result<Json<Value>, ErrorResponse> {
    require_user(caller.user_id.as_deref())?;
    let conversations = state
        .voice_client()
        .conversations(&agent_id)
        .await
        .map_err(voice_error)?;
    Ok(Json(json!({"conversations": conversations})))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/voices", get(list_voices))
        .route("/tts", post(speak))
        .route("/agents", get(list_agents).post(create_agent))
        .route("/agents/:id", delete(delete_agent))
        .route("/agents/:id/conversations", get(agent_conversations))
        .with_state(state)
}
