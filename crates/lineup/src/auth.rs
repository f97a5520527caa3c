use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

/// Default host for the Clerk backend API
pub const CLERK_API_HOST: &str = "https://api.clerk.com";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Unauthorized: no user id")]
    Unauthorized,

    #[error("No {integration} token linked for this user")]
    TokenNotFound { integration: String },

    #[error("Token provider error ({status}): {details:?}")]
    UpstreamAuth { status: u16, details: Vec<String> },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Exchanges an authenticated user identity for a third-party OAuth access
/// token held by the identity provider. Pure lookup, no mutation, no retry.
pub struct TokenResolver {
    client: Client,
    host: String,
    secret_key: String,
}

impl TokenResolver {
    pub fn new<S: Into<String>>(secret_key: S) -> Self {
        Self::with_host(CLERK_API_HOST, secret_key)
    }

    pub fn with_host<H: Into<String>, S: Into<String>>(host: H, secret_key: S) -> Self {
        Self {
            client: Client::new(),
            host: host.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Retrieve the first OAuth access token the identity provider holds for
    /// the given user and integration (e.g. "linear").
    pub async fn resolve(&self, user_id: &str, integration: &str) -> Result<String, TokenError> {
        if user_id.is_empty() {
            return Err(TokenError::Unauthorized);
        }

        let url = format!(
            "{}/v1/users/{}/oauth_access_tokens/oauth_{}",
            self.host.trim_end_matches('/'),
            user_id,
            integration
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let details = body
                .get("errors")
                .and_then(|e| e.as_array())
                .map(|errors| {
                    errors
                        .iter()
                        .filter_map(|error| {
                            error
                                .get("long_message")
                                .or_else(|| error.get("message"))
                                .and_then(|m| m.as_str())
                                .map(String::from)
                        })
                        .collect()
                })
                .unwrap_or_default();
            return Err(TokenError::UpstreamAuth {
                status: status.as_u16(),
                details,
            });
        }

        let body: Value = response.json().await?;
        // The endpoint returns either a bare array or a paginated {data: [...]}
        let records = body
            .get("data")
            .and_then(|d| d.as_array())
            .or_else(|| body.as_array())
            .cloned()
            .unwrap_or_default();

        records
            .first()
            .and_then(|record| record.get("token"))
            .and_then(|token| token.as_str())
            .map(String::from)
            .ok_or_else(|| TokenError::TokenNotFound {
                integration: integration.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{bearer_token, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_resolve_returns_first_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/users/user_123/oauth_access_tokens/oauth_linear"))
            .and(bearer_token("sk_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"token": "lin_first", "provider": "oauth_linear"},
                    {"token": "lin_second", "provider": "oauth_linear"}
                ],
                "total_count": 2
            })))
            .mount(&server)
            .await;

        let resolver = TokenResolver::with_host(server.uri(), "sk_test");
        let token = resolver.resolve("user_123", "linear").await.unwrap();
        assert_eq!(token, "lin_first");
    }

    #[tokio::test]
    async fn test_resolve_bare_array_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"token": "lin_tok", "provider": "oauth_linear"}])),
            )
            .mount(&server)
            .await;

        let resolver = TokenResolver::with_host(server.uri(), "sk_test");
        let token = resolver.resolve("user_123", "linear").await.unwrap();
        assert_eq!(token, "lin_tok");
    }

    #[tokio::test]
    async fn test_resolve_no_linked_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": [], "total_count": 0})),
            )
            .mount(&server)
            .await;

        let resolver = TokenResolver::with_host(server.uri(), "sk_test");
        let err = resolver.resolve("user_123", "linear").await.unwrap_err();
        assert!(
            matches!(err, TokenError::TokenNotFound { integration } if integration == "linear")
        );
    }

    #[tokio::test]
    async fn test_resolve_upstream_error_with_details() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "errors": [
                    {"message": "not found", "long_message": "OAuth account not found", "code": "oauth_missing"}
                ]
            })))
            .mount(&server)
            .await;

        let resolver = TokenResolver::with_host(server.uri(), "sk_test");
        let err = resolver.resolve("user_123", "linear").await.unwrap_err();
        match err {
            TokenError::UpstreamAuth { status, details } => {
                assert_eq!(status, 400);
                assert_eq!(details, vec!["OAuth account not found".to_string()]);
            }
            other => panic!("expected UpstreamAuth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_empty_user_id() {
        let resolver = TokenResolver::with_host("http://localhost:9", "sk_test");
        let err = resolver.resolve("", "linear").await.unwrap_err();
        assert!(matches!(err, TokenError::Unauthorized));
    }
}
