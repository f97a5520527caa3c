use crate::state::AppState;
use axum::{
    extract::State,
    http::{self, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use lineup::{
    agent::{Agent, AgentInput},
    auth::TokenError,
    linear::{client::LinearClient, system::LinearSystem},
    models::message::{Message, MessageContent},
    models::role::Role,
    models::tool::ToolCall,
    providers::factory,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;

/// Wall-clock ceiling for one agent request, buffered or streamed
const REQUEST_DEADLINE: Duration = Duration::from_secs(90);

type ErrorResponse = (StatusCode, Json<Value>);

#[derive(Debug, Deserialize)]
struct TeamContext {
    id: String,
    name: String,
}

// Buffered request: one prompt in, one reply out
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskRequest {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    teams: Vec<TeamContext>,
}

// Streamed request: full conversation history in, SSE out
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    messages: Vec<IncomingMessage>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    teams: Vec<TeamContext>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    role: String,
    content: String,
    #[serde(default)]
    #[serde(rename = "toolInvocations")]
    tool_invocations: Vec<IncomingToolInvocation>,
}

#[derive(Debug, Deserialize)]
struct IncomingToolInvocation {
    state: String,
    #[serde(rename = "toolCallId")]
    tool_call_id: String,
    #[serde(rename = "toolName")]
    tool_name: String,
    args: Value,
    result: Option<String>,
}

fn internal_error() -> ErrorResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "Internal server error"})),
    )
}

fn unauthorized() -> ErrorResponse {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "Unauthorized: No user ID found"})),
    )
}

/// Resolve the caller's Linear token and assemble an agent bound to it.
///
/// Only identity and token-retrieval failures surface as distinct status
/// codes here; once the loop is running, remote failures stay inside the
/// conversation.
async fn build_agent(
    state: &AppState,
    user_id: Option<&str>,
    teams: &[TeamContext],
) -> Result<Agent, ErrorResponse> {
    let user_id = user_id.filter(|id| !id.is_empty()).ok_or_else(unauthorized)?;

    let token = state
        .token_resolver()
        .resolve(user_id, "linear")
        .await
        .map_err(|e| match e {
            TokenError::Unauthorized => unauthorized(),
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
                internal_error()
            }
        })?;

    let provider = factory::get_provider(state.provider_config.clone()).map_err(|e| {
        tracing::error!("Failed to create provider: {}", e);
        internal_error()
    })?;

    let teams: Vec<(String, String)> = teams
        .iter()
        .map(|team| (team.name.clone(), team.id.clone()))
        .collect();

    let mut agent = Agent::new(provider);
    agent.add_system(Box::new(
        LinearSystem::new(LinearClient::new(token)).with_teams(&teams),
    ));
    Ok(agent)
}

// Buffered delivery: run the loop to completion, reply with the final text
// and every tool invocation that happened along the way
async fn ask_handler(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<Value>, ErrorResponse> {
    let prompt = request
        .prompt
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "No prompt provided"})),
            )
        })?;

    let agent = build_agent(&state, request.user_id.as_deref(), &request.teams).await?;

    let reply = timeout(REQUEST_DEADLINE, agent.run(AgentInput::Prompt(prompt)))
        .await
        .map_err(|_| {
            tracing::error!("Agent request exceeded the {:?} deadline", REQUEST_DEADLINE);
            internal_error()
        })?
        .map_err(|e| {
            tracing::error!("Agent run failed: {}", e);
            internal_error()
        })?;

    Ok(Json(json!({
        "response": reply.text,
        "toolInvocations": reply.tool_invocations,
    })))
}

// Custom SSE response type that implements the Vercel AI SDK data protocol
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> axum::response::Response {
        let body = axum::body::Body::from_stream(self);

        http::Response::builder()
            .header("Content-Type", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .header("Connection", "keep-alive")
            .header("x-vercel-ai-data-stream", "v1")
            .body(body)
            .unwrap_or_default()
    }
}

// Protocol-specific message formatting
struct ProtocolFormatter;

impl ProtocolFormatter {
    fn format_text(text: &str) -> String {
        let encoded_text = serde_json::to_string(text).unwrap_or_default();
        format!("0:{}\n", encoded_text)
    }

    fn format_tool_call(id: &str, name: &str, args: &Value) -> String {
        // Tool calls start with "9:"
        let tool_call = json!({
            "toolCallId": id,
            "toolName": name,
            "args": args
        });
        format!("9:{}\n", tool_call)
    }

    fn format_tool_response(id: &str, result: &str) -> String {
        // Tool responses start with "a:"
        let response = json!({
            "toolCallId": id,
            "result": result,
        });
        format!("a:{}\n", response)
    }

    fn format_finish(reason: &str) -> String {
        // Finish messages start with "d:"
        let finish = json!({
            "finishReason": reason,
            "usage": {
                "promptTokens": 0,
                "completionTokens": 0
            }
        });
        format!("d:{}\n", finish)
    }
}

// Convert incoming messages to the internal Message type
fn convert_messages(incoming: Vec<IncomingMessage>) -> Vec<Message> {
    let mut messages = Vec::new();

    for msg in incoming {
        match msg.role.as_str() {
            "user" => {
                messages.push(Message::user().with_text(msg.content));
            }
            "assistant" => {
                // Each completed tool invocation replays as a request/response
                // pair so the model sees its own history
                for tool in msg.tool_invocations {
                    if tool.state == "result" {
                        let tool_call = ToolCall::new(tool.tool_name, tool.args);
                        messages.push(
                            Message::assistant()
                                .with_tool_request(tool.tool_call_id.clone(), Ok(tool_call)),
                        );

                        if let Some(result) = tool.result {
                            messages.push(
                                Message::user().with_tool_response(tool.tool_call_id, Ok(result)),
                            );
                        }
                    }
                }

                // Then the assistant's text response after tool interactions
                if !msg.content.is_empty() {
                    messages.push(Message::assistant().with_text(msg.content));
                }
            }
            _ => {
                tracing::warn!("Unknown role: {}", msg.role);
            }
        }
    }

    messages
}

async fn stream_message(
    message: Message,
    tx: &mpsc::Sender<String>,
) -> Result<(), mpsc::error::SendError<String>> {
    match message.role {
        Role::User => {
            // Only tool responses travel back on user messages
            for content in message.content {
                if let MessageContent::ToolResponse(response) = content {
                    match response.tool_result {
                        Ok(result) => {
                            tx.send(ProtocolFormatter::format_tool_response(
                                &response.id,
                                &result,
                            ))
                            .await?;
                        }
                        Err(err) => {
                            tx.send(ProtocolFormatter::format_tool_response(
                                &response.id,
                                &format!("Error: {}", err),
                            ))
                            .await?;
                        }
                    }
                }
            }
        }
        Role::Assistant => {
            for content in message.content {
                match content {
                    MessageContent::ToolRequest(request) => {
                        if let Ok(tool_call) = request.tool_call {
                            tx.send(ProtocolFormatter::format_tool_call(
                                &request.id,
                                &tool_call.name,
                                &tool_call.arguments,
                            ))
                            .await?;
                        } else {
                            // An unparseable tool call still has to appear in
                            // the history; its error follows as the response
                            tx.send(ProtocolFormatter::format_tool_call(
                                &request.id,
                                "invalid name",
                                &json!({}),
                            ))
                            .await?;
                        }
                    }
                    MessageContent::Text(text) => {
                        for line in text.text.lines() {
                            let modified_line = format!("{}\n", line);
                            tx.send(ProtocolFormatter::format_text(&modified_line))
                                .await?;
                        }
                    }
                    MessageContent::ToolResponse(_) => {
                        // Tool responses should only come from the user
                        continue;
                    }
                }
            }
        }
    }
    Ok(())
}

// Streamed delivery: forward each loop turn as it happens over SSE
async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<SseResponse, ErrorResponse> {
    let agent = build_agent(&state, request.user_id.as_deref(), &request.teams).await?;
    let messages = convert_messages(request.messages);

    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);

    // Spawn task to handle streaming
    tokio::spawn(async move {
        let mut stream = match agent.reply(AgentInput::Conversation(messages)).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Failed to start reply stream: {}", e);
                let _ = tx.send(ProtocolFormatter::format_finish("error")).await;
                return;
            }
        };

        let deadline = tokio::time::Instant::now() + REQUEST_DEADLINE;
        loop {
            if tokio::time::Instant::now() >= deadline {
                tracing::error!("Agent stream exceeded the {:?} deadline", REQUEST_DEADLINE);
                break;
            }
            tokio::select! {
                response = timeout(Duration::from_millis(500), stream.next()) => {
                    match response {
                        Ok(Some(Ok(message))) => {
                            if let Err(e) = stream_message(message, &tx).await {
                                tracing::error!("Error sending message through channel: {}", e);
                                break;
                            }
                        }
                        Ok(Some(Err(e))) => {
                            tracing::error!("Error processing message: {}", e);
                            break;
                        }
                        Ok(None) => {
                            break;
                        }
                        Err(_) => { // Heartbeat, used to detect disconnected clients and then end running tools.
                            if tx.is_closed() {
                                break;
                            }
                            continue;
                        }
                    }
                }
            }
        }

        // Send finish message
        let _ = tx.send(ProtocolFormatter::format_finish("stop")).await;
    });

    Ok(SseResponse::new(stream))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/agent", post(ask_handler))
        .route("/agent/stream", post(chat_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_text() {
        assert_eq!(ProtocolFormatter::format_text("hello\n"), "0:\"hello\\n\"\n");
    }

    #[test]
    fn test_format_tool_call() {
        let line = ProtocolFormatter::format_tool_call(
            "call_1",
            "createIssue",
            &json!({"title": "Fix login bug"}),
        );
        assert!(line.starts_with("9:"));
        assert!(line.ends_with('\n'));
        let payload: Value = serde_json::from_str(&line[2..]).unwrap();
        assert_eq!(payload["toolCallId"], "call_1");
        assert_eq!(payload["toolName"], "createIssue");
    }

    #[test]
    fn test_format_tool_response() {
        let line = ProtocolFormatter::format_tool_response("call_1", "Issue created: ABC-123");
        assert!(line.starts_with("a:"));
        let payload: Value = serde_json::from_str(&line[2..]).unwrap();
        assert_eq!(payload["result"], "Issue created: ABC-123");
    }

    #[test]
    fn test_format_finish() {
        let line = ProtocolFormatter::format_finish("stop");
        assert!(line.starts_with("d:"));
        let payload: Value = serde_json::from_str(&line[2..]).unwrap();
        assert_eq!(payload["finishReason"], "stop");
    }

    #[test]
    fn test_convert_messages_replays_tool_history() {
        let incoming = vec![
            IncomingMessage {
                role: "user".to_string(),
                content: "create an issue".to_string(),
                tool_invocations: vec![],
            },
            IncomingMessage {
                role: "assistant".to_string(),
                content: "Done!".to_string(),
                tool_invocations: vec![IncomingToolInvocation {
                    state: "result".to_string(),
                    tool_call_id: "call_1".to_string(),
                    tool_name: "createIssue".to_string(),
                    args: json!({"title": "Fix login bug", "teamId": "T1"}),
                    result: Some("Issue created: ABC-123".to_string()),
                }],
            },
        ];

        let messages = convert_messages(incoming);
        // user text, replayed tool request, replayed tool response, assistant text
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].text(), "create an issue");
        assert!(messages[1].content[0].as_tool_request().is_some());
        let response = messages[2].content[0].as_tool_response().unwrap();
        assert_eq!(response.tool_result.as_deref(), Ok("Issue created: ABC-123"));
        assert_eq!(messages[3].text(), "Done!");
    }

    #[test]
    fn test_convert_messages_skips_unknown_roles() {
        let incoming = vec![IncomingMessage {
            role: "system".to_string(),
            content: "ignored".to_string(),
            tool_invocations: vec![],
        }];
        assert!(convert_messages(incoming).is_empty());
    }

    mod endpoint {
        use super::*;
        use crate::configuration::{ClerkSettings, VoiceSettings};
        use axum::body::Body;
        use http_body_util::BodyExt;
        use lineup::providers::configs::{OpenAiProviderConfig, ProviderConfig};
        use tower::ServiceExt;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn app(clerk_host: String, openai_host: String) -> Router {
            crate::routes::configure(AppState {
                provider_config: ProviderConfig::OpenAi(OpenAiProviderConfig {
                    host: openai_host,
                    api_key: "test-key".to_string(),
                    model: "gpt-4o".to_string(),
                    temperature: None,
                    max_tokens: None,
                }),
                clerk: ClerkSettings {
                    secret_key: "sk_test".to_string(),
                    host: clerk_host,
                },
                voice: VoiceSettings {
                    api_key: "xi_test".to_string(),
                    host: "http://localhost:9".to_string(),
                },
            })
        }

        fn post_json(uri: &str, body: Value) -> http::Request<Body> {
            http::Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        }

        async fn body_json(response: axum::response::Response) -> Value {
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            serde_json::from_slice(&bytes).unwrap()
        }

        async fn mount_clerk(server: &MockServer) {
            Mock::given(method("GET"))
                .and(path(
                    "/v1/users/user_123/oauth_access_tokens/oauth_linear",
                ))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "data": [{"token": "lin_tok", "provider": "oauth_linear"}]
                })))
                .mount(server)
                .await;
        }

        #[tokio::test]
        async fn test_agent_happy_path() {
            let clerk = MockServer::start().await;
            mount_clerk(&clerk).await;

            let openai = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/chat/completions"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "choices": [{
                        "index": 0,
                        "message": {"role": "assistant", "content": "You have 3 open issues."},
                        "finish_reason": "stop"
                    }],
                    "usage": {"prompt_tokens": 10, "completion_tokens": 8, "total_tokens": 18}
                })))
                .mount(&openai)
                .await;

            let app = app(clerk.uri(), openai.uri());
            let response = app
                .oneshot(post_json(
                    "/agent",
                    json!({"prompt": "How many issues are open?", "userId": "user_123"}),
                ))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["response"], "You have 3 open issues.");
            assert_eq!(body["toolInvocations"], json!([]));
        }

        #[tokio::test]
        async fn test_agent_rejects_missing_prompt() {
            let app = app(
                "http://localhost:9".to_string(),
                "http://localhost:9".to_string(),
            );
            let response = app
                .oneshot(post_json("/agent", json!({"userId": "user_123"})))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_json(response).await;
            assert_eq!(body["error"], "No prompt provided");
        }

        #[tokio::test]
        async fn test_agent_rejects_missing_user() {
            let app = app(
                "http://localhost:9".to_string(),
                "http://localhost:9".to_string(),
            );
            let response = app
                .oneshot(post_json("/agent", json!({"prompt": "hello"})))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let body = body_json(response).await;
            assert_eq!(body["error"], "Unauthorized: No user ID found");
        }

        #[tokio::test]
        async fn test_agent_reports_missing_linear_token() {
            let clerk = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(json!({"data": [], "total_count": 0})),
                )
                .mount(&clerk)
                .await;

            let app = app(clerk.uri(), "http://localhost:9".to_string());
            let response = app
                .oneshot(post_json(
                    "/agent",
                    json!({"prompt": "hello", "userId": "user_123"}),
                ))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_json(response).await;
            assert_eq!(body["error"], "Linear OAuth token not found for this user");
        }

        #[tokio::test]
        async fn test_stream_emits_text_and_finish() {
            let clerk = MockServer::start().await;
            mount_clerk(&clerk).await;

            let openai = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/chat/completions"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "choices": [{
                        "index": 0,
                        "message": {"role": "assistant", "content": "Hello!"},
                        "finish_reason": "stop"
                    }],
                    "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
                })))
                .mount(&openai)
                .await;

            let app = app(clerk.uri(), openai.uri());
            let response = app
                .oneshot(post_json(
                    "/agent/stream",
                    json!({
                        "messages": [{"role": "user", "content": "hi"}],
                        "userId": "user_123"
                    }),
                ))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response
                    .headers()
                    .get("x-vercel-ai-data-stream")
                    .and_then(|v| v.to_str().ok()),
                Some("v1")
            );

            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let text = String::from_utf8(bytes.to_vec()).unwrap();
            assert!(text.contains("0:\"Hello!\\n\""));
            assert!(text.contains("d:{"));
            assert!(text.contains("\"finishReason\":\"stop\""));
        }
    }
}
