//! Transport adapter: base URL resolution, bearer auth, and outcome classification.
//!
//! # Design
//! The adapter is the innermost [`Service`] of the request pipeline. Raw I/O
//! is delegated to an [`HttpClient`], which makes the adapter testable with
//! a scripted client and lets production code use [`ReqwestClient`]. The
//! session token comes from a [`TokenProvider`]; having no token is not an
//! error, the request simply goes out unauthenticated.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use url::Url;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// One stage of the request pipeline: descriptor in, unwrapped JSON out.
pub trait Service: Send + Sync {
    fn call(&self, request: HttpRequest) -> BoxFuture<'_, Result<Value, ApiError>>;
}

/// Executes a fully resolved request. `Err` means no response was received.
pub trait HttpClient: Send + Sync {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, ApiError>>;
}

/// Source of the current session's bearer token.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> BoxFuture<'_, Option<String>>;
}

/// No session: every request is sent unauthenticated.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSession;

impl TokenProvider for NoSession {
    fn token(&self) -> BoxFuture<'_, Option<String>> {
        futures::future::ready(None).boxed()
    }
}

/// A fixed token, e.g. one obtained out of band.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn token(&self) -> BoxFuture<'_, Option<String>> {
        futures::future::ready(Some(self.0.clone())).boxed()
    }
}

/// A [`reqwest`]-backed implementation of [`HttpClient`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HttpClient for ReqwestClient {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, ApiError>> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        let mut builder = self.inner.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        async move {
            let resp = builder
                .send()
                .await
                .map_err(|e| ApiError::Transport(e.to_string()))?;
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .await
                .map_err(|e| ApiError::Transport(e.to_string()))?;
            Ok(HttpResponse { status, body })
        }
        .boxed()
    }
}

/// Innermost pipeline stage.
#[derive(Debug, Clone)]
pub struct TransportAdapter<C, P = NoSession> {
    base_url: String,
    client: C,
    session: P,
}

impl TransportAdapter<ReqwestClient, NoSession> {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(config, ReqwestClient::new())
    }
}

impl<C: HttpClient> TransportAdapter<C, NoSession> {
    pub fn with_client(config: &ClientConfig, client: C) -> Self {
        Self {
            base_url: config.resolve_base_url(),
            client,
            session: NoSession,
        }
    }
}

impl<C: HttpClient, P: TokenProvider> TransportAdapter<C, P> {
    pub fn with_session<Q: TokenProvider>(self, session: Q) -> TransportAdapter<C, Q> {
        TransportAdapter {
            base_url: self.base_url,
            client: self.client,
            session,
        }
    }

    /// Join the descriptor's relative URL onto the base URL and encode its params.
    pub fn resolve(&self, request: &HttpRequest) -> Result<Url, ApiError> {
        let mut base = self.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base).map_err(|e| ApiError::InvalidUrl(format!("{base}: {e}")))?;
        let mut url = base
            .join(request.url.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", request.url)))?;
        if !request.params.is_empty() {
            url.query_pairs_mut().extend_pairs(request.params.iter());
        }
        Ok(url)
    }
}

impl<C: HttpClient, P: TokenProvider> Service for TransportAdapter<C, P> {
    fn call(&self, request: HttpRequest) -> BoxFuture<'_, Result<Value, ApiError>> {
        async move {
            let url = self.resolve(&request)?;
            let mut outgoing = HttpRequest {
                url: url.to_string(),
                params: Vec::new(),
                ..request
            };
            if let Some(token) = self.session.token().await {
                outgoing
                    .headers
                    .push(("authorization".to_string(), format!("Bearer {token}")));
            }

            tracing::debug!(method = %outgoing.method, url = %outgoing.url, "sending request");
            let response = self.client.send(outgoing).await.inspect_err(|e| {
                tracing::debug!(error = %e, "transport failure");
            })?;
            tracing::debug!(status = response.status, "received response");
            classify(response)
        }
        .boxed()
    }
}

/// Map a raw response to its JSON payload or a status error.
pub fn classify(response: HttpResponse) -> Result<Value, ApiError> {
    let body = response.body.trim();
    if response.is_success() {
        if body.is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(body).map_err(|e| ApiError::Deserialization(e.to_string()));
    }
    let body = if body.is_empty() {
        None
    } else {
        Some(serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())))
    };
    Err(ApiError::Status {
        status: response.status,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            body: body.to_string(),
        }
    }

    fn adapter(base: &str) -> TransportAdapter<ReqwestClient> {
        TransportAdapter::new(&ClientConfig::new().with_base_url(base))
    }

    #[test]
    fn classify_success_parses_json() {
        assert_eq!(classify(response(200, r#"{"a":1}"#)).unwrap(), json!({ "a": 1 }));
        assert_eq!(classify(response(204, "")).unwrap(), Value::Null);
    }

    #[test]
    fn classify_success_with_bad_json() {
        let err = classify(response(200, "not json")).unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }

    #[test]
    fn classify_error_keeps_body() {
        let err = classify(response(400, r#"{"message":"bad"}"#)).unwrap_err();
        assert_eq!(err.server_message(), Some("bad"));

        let err = classify(response(502, "upstream down")).unwrap_err();
        assert!(
            matches!(err, ApiError::Status { status: 502, body: Some(Value::String(ref s)) } if s == "upstream down")
        );

        let err = classify(response(500, "")).unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 500, body: None }));
    }

    #[test]
    fn resolve_joins_paths_and_params() {
        let a = adapter("http://localhost:8001/api");
        let req = HttpRequest::new(HttpMethod::Get, "courses").with_param("category", "Web Dev");
        let url = a.resolve(&req).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8001/api/courses?category=Web+Dev");

        let req = HttpRequest::new(HttpMethod::Get, "/courses/c1");
        assert_eq!(a.resolve(&req).unwrap().as_str(), "http://localhost:8001/api/courses/c1");
    }

    #[test]
    fn resolve_rejects_bad_base_url() {
        let a = adapter("not a url");
        let err = a.resolve(&HttpRequest::new(HttpMethod::Get, "courses")).unwrap_err();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn attaches_bearer_token_when_available() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/courses"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let a = adapter(&server.uri()).with_session(StaticToken("tok-1".into()));
        let value = a.call(HttpRequest::new(HttpMethod::Get, "courses")).await.unwrap();
        assert_eq!(value, json!({ "data": [] }));
    }

    #[tokio::test]
    async fn sends_unauthenticated_without_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transactions"))
            .and(query_param("userId", "u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let a = adapter(&server.uri());
        let req = HttpRequest::new(HttpMethod::Get, "transactions").with_param("userId", "u1");
        a.call(req).await.unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn status_errors_carry_server_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/courses/c1"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({ "message": "Not allowed" })),
            )
            .mount(&server)
            .await;

        let err = adapter(&server.uri())
            .call(HttpRequest::new(HttpMethod::Delete, "courses/c1"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.server_message(), Some("Not allowed"));
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = adapter(&format!("http://{addr}"))
            .call(HttpRequest::new(HttpMethod::Get, "courses"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
