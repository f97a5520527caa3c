use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use lineup::auth::TokenError;
use lineup::linear::client::{IssueInput, LinearClient};
use serde::Deserialize;
use serde_json::{json, Value};

type ErrorResponse = (StatusCode, Json<Value>);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Caller {
    #[serde(default)]
    user_id: Option<String>,
}

fn map_token_error(e: TokenError) -> ErrorResponse {
    match e {
        TokenError::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Unauthorized: No user ID found"})),
        ),
        TokenError::TokenNotFound { .. } => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Linear OAuth token not found for this user"})),
        ),
        TokenError::UpstreamAuth { status, details } => {
            tracing::warn!("Token provider returned {}: {:?}", status, details);
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Failed to retrieve Linear OAuth token",
                    "details": details,
                })),
            )
        }
        TokenError::Transport(e) => {
            tracing::error!("Token provider unreachable: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Internal server error"})),
            )
        }
    }
}

async fn client_for(state: &AppState, user_id: Option<&str>) -> Result<LinearClient, ErrorResponse> {
    let token = state
        .token_resolver()
        .resolve(user_id.unwrap_or_default(), "linear")
        .await
        .map_err(map_token_error)?;
    Ok(LinearClient::new(token))
}

fn remote_error(e: anyhow::Error) -> ErrorResponse {
    tracing::error!("Linear request failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "Internal server error"})),
    )
}

// List the caller's teams for workspace pickers
async fn list_teams(
    State(state): State<AppState>,
    Query(caller): Query<Caller>,
) -> Result<Json<Value>, ErrorResponse> {
    let client = client_for(&state, caller.user_id.as_deref()).await?;
    let teams = client.teams().await.map_err(remote_error)?;
    Ok(Json(json!({"teams": teams})))
}

// The team's five most recently updated issues
async fn team_issues(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Query(caller): Query<Caller>,
) -> Result<Json<Value>, ErrorResponse> {
    let client = client_for(&state, caller.user_id.as_deref()).await?;
    let issues = client.team_issues(&team_id, 5).await.map_err(remote_error)?;
    Ok(Json(json!({"issues": issues})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateIssueRequest {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(flatten)]
    input: IssueInput,
}

async fn create_issue(
    State(state): State<AppState>,
    Json(request): Json<CreateIssueRequest>,
) -> Result<Json<Value>, ErrorResponse> {
    if request.input.title.is_none() || request.input.team_id.is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "title and teamId are required"})),
        ));
    }
    let client = client_for(&state, request.user_id.as_deref()).await?;
    let payload = client
        .create_issue(&request.input)
        .await
        .map_err(remote_error)?;
    Ok(Json(json!({"success": payload.success, "issue": payload.issue})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateIssueRequest {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(flatten)]
    input: IssueInput,
}

async fn update_issue(
    State(state): State<AppState>,
    Path(issue_id): Path<String>,
    Json(request): Json<UpdateIssueRequest>,
) -> Result<Json<Value>, ErrorResponse> {
    let client = client_for(&state, request.user_id.as_deref()).await?;
    let payload = client
        .update_issue(&issue_id, &request.input)
        .await
        .map_err(remote_error)?;
    Ok(Json(json!({"success": payload.success, "issue": payload.issue})))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/teams", get(list_teams))
        .route("/teams/:id/issues", get(team_issues))
        .route("/issues", post(create_issue))
        .route("/issues/:id", patch(update_issue))
        .with_state(state)
}
