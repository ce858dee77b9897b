//! Upstream grants fetching.
//!
//! The cache only ever talks to the [`GrantsProvider`] trait; the reqwest
//! implementation below is the production wiring for a Keycloak-style
//! authorization server.
use async_trait::async_trait;
use serde_json::Value;

use crate::errors::FetchError;

/// Fetches the grants document for a raw access token.
///
/// Implementations must be re-entrant: the cache calls this concurrently for
/// different principals.
#[async_trait]
pub trait GrantsProvider: Send + Sync {
    async fn fetch_grants(&self, access_token: &str) -> Result<Value, FetchError>;
}

const UMA_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:uma-ticket";

/// Fetches grants from the authorization server's token endpoint using the
/// UMA ticket flow: the session's own token authenticates the request and the
/// response lists the permissions granted to it.
#[derive(Debug, Clone)]
pub struct HttpGrantsProvider {
    client: reqwest::Client,
    token_endpoint: String,
    client_id: String,
}

impl HttpGrantsProvider {
    pub fn new(token_endpoint: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
        }
    }

    pub fn with_client(
        client: reqwest::Client,
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
        }
    }
}

#[async_trait]
impl GrantsProvider for HttpGrantsProvider {
    async fn fetch_grants(&self, access_token: &str) -> Result<Value, FetchError> {
        let response = self
            .client
            .post(&self.token_endpoint)
            .bearer_auth(access_token)
            .form(&[
                ("grant_type", UMA_GRANT_TYPE),
                ("audience", self.client_id.as_str()),
                ("response_mode", "permissions"),
            ])
            .send()
            .await
            .map_err(|err| FetchError::Other(err.into()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FetchError::Http {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json()
            .await
            .map_err(|err| FetchError::Other(err.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::net::SocketAddr;
    use tokio::task::JoinHandle;

    async fn spawn_grants_server(
        status: StatusCode,
        body: Value,
        expected_token: Option<&'static str>,
    ) -> (SocketAddr, JoinHandle<()>) {
        use tokio::net::TcpListener;

        let app = Router::new().route(
            "/token",
            post({
                let body = body.clone();
                move |headers: HeaderMap| {
                    let body = body.clone();
                    async move {
                        if let Some(token) = expected_token {
                            let authorization = headers
                                .get("authorization")
                                .and_then(|value| value.to_str().ok())
                                .unwrap_or_default();
                            assert_eq!(authorization, format!("Bearer {token}"));
                        }
                        (status, Json(body))
                    }
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = axum::serve(listener, app.into_make_service());
        let handle = tokio::spawn(async move {
            let _ = server.await;
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn returns_grants_on_success() {
        let (addr, _server) = spawn_grants_server(
            StatusCode::OK,
            json!([{"rsname": "orders", "scopes": ["Write"]}]),
            Some("t1"),
        )
        .await;

        let provider = HttpGrantsProvider::new(format!("http://{addr}/token"), "rill-broker");
        let grants = provider.fetch_grants("t1").await.expect("grants");
        assert_eq!(grants[0]["rsname"], "orders");
    }

    #[tokio::test]
    async fn maps_error_statuses() {
        let (addr, _server) = spawn_grants_server(
            StatusCode::FORBIDDEN,
            json!({"error": "access_denied"}),
            None,
        )
        .await;

        let provider = HttpGrantsProvider::new(format!("http://{addr}/token"), "rill-broker");
        let err = provider.fetch_grants("t1").await.expect_err("403");
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn connection_failure_is_not_an_http_error() {
        // Nothing listens on this port.
        let provider = HttpGrantsProvider::new("http://127.0.0.1:9/token", "rill-broker");
        let err = provider.fetch_grants("t1").await.expect_err("refused");
        assert_eq!(err.status(), None);
    }
}
