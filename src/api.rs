// Backend HTTP client
// Every service goes through `ApiClient`: it builds the URL, attaches the bearer
// token and turns non-2xx bodies into a readable `ApiError`.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::session::{Session, SessionError};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    // Display is the backend's own message, shown to the user as-is
    #[error("{message}")]
    ApiResponseError { status_code: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Session error: {0}")]
    SessionError(#[from] SessionError),
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::ApiResponseError { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    // Backends report a missing row either through the status or only in the text
    pub fn is_not_found(&self) -> bool {
        if self.status_code() == Some(404) {
            return true;
        }
        let message = self.to_string().to_lowercase();
        message.contains("not found") || message.contains("404")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout_ms: u64,
}

impl ReqwestTransport {
    pub fn new(timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, timeout_ms }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout(self.timeout_ms)
            } else {
                ApiError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}

/// Pulls a human readable message out of an error response.
///
/// `detail` wins over `error`; either may be a string or any JSON value (which
/// is then stringified). A JSON body with neither is stringified whole, and a
/// body that is not JSON at all falls back to `HTTP <status>: <reason>`.
pub fn error_message(response: &HttpResponse) -> String {
    let Ok(body) = serde_json::from_str::<Value>(&response.body) else {
        return format!("HTTP {}: {}", response.status, response.reason);
    };

    let pick = |field: &str| match body.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };

    pick("detail")
        .or_else(|| pick("error"))
        .unwrap_or_else(|| body.to_string())
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    session: Session,
}

impl ApiClient {
    pub fn new(base_url: &str, transport: Arc<dyn HttpTransport>, session: Session) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // Auth routes never carry a bearer token: a stale one would fail signin
    fn headers(&self, endpoint: &str) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];

        if !endpoint.starts_with("/auth/") {
            if let Some(token) = self.session.access_token() {
                headers.push(("Authorization".to_string(), format!("Bearer {token}")));
            }
        }

        headers
    }

    fn url(&self, endpoint: &str, query: &[(&str, String)]) -> String {
        let mut url = format!("{}{}", self.base_url, endpoint);

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        let mut has_params = false;
        for (key, value) in query.iter().filter(|(_, v)| !v.is_empty()) {
            serializer.append_pair(key, value);
            has_params = true;
        }
        if has_params {
            url.push('?');
            url.push_str(&serializer.finish());
        }

        url
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let url = self.url(endpoint, query);
        debug!(?method, %url, "backend request");

        let response = self
            .transport
            .send(HttpRequest {
                method,
                url,
                headers: self.headers(endpoint),
                body,
            })
            .await?;

        if !response.is_success() {
            let message = error_message(&response);
            warn!(status = response.status, %endpoint, %message, "backend request failed");
            return Err(ApiError::ApiResponseError {
                status_code: response.status,
                message,
            });
        }

        // Empty bodies (204, bare deletes) decode as null
        let raw = if response.body.trim().is_empty() {
            "null"
        } else {
            response.body.as_str()
        };

        serde_json::from_str(raw).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
        serde_json::to_value(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.request(Method::Get, endpoint, params, None).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = Self::encode(body)?;
        self.request(Method::Post, endpoint, &[], Some(body)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = Self::encode(body)?;
        self.request(Method::Put, endpoint, &[], Some(body)).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = Self::encode(body)?;
        self.request(Method::Patch, endpoint, &[], Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request(Method::Delete, endpoint, &[], None).await
    }
}

// Scripted backend used by the controller and service tests
#[cfg(test)]
pub(crate) mod mock_server {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use tokio::sync::Mutex;

    pub const MOCK_BASE_URL: &str = "http://mock.local/api";

    #[derive(Debug, Clone)]
    pub struct MockResponse {
        pub status: u16,
        pub body: String,
        pub delay: Duration,
    }

    impl MockResponse {
        pub fn json(status: u16, body: Value) -> Self {
            Self {
                status,
                body: body.to_string(),
                delay: Duration::ZERO,
            }
        }

        pub fn raw(status: u16, body: &str) -> Self {
            Self {
                status,
                body: body.to_string(),
                delay: Duration::ZERO,
            }
        }

        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    // Responses are queued per (method, path); the last one repeats
    #[derive(Default)]
    pub struct MockServer {
        routes: Mutex<HashMap<(Method, String), VecDeque<MockResponse>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl MockServer {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn respond(&self, method: Method, path: &str, response: MockResponse) {
            self.routes
                .lock()
                .await
                .entry((method, path.to_string()))
                .or_default()
                .push_back(response);
        }

        pub async fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().await.clone()
        }

        pub async fn request_count(&self, method: Method, path: &str) -> usize {
            self.requests
                .lock()
                .await
                .iter()
                .filter(|r| r.method == method && path_of(&r.url) == path)
                .count()
        }

        pub async fn last_request(&self, method: Method, path: &str) -> Option<HttpRequest> {
            self.requests
                .lock()
                .await
                .iter()
                .rev()
                .find(|r| r.method == method && path_of(&r.url) == path)
                .cloned()
        }
    }

    pub fn path_of(url: &str) -> String {
        let path = url.strip_prefix(MOCK_BASE_URL).unwrap_or(url);
        path.split('?').next().unwrap_or_default().to_string()
    }

    #[async_trait]
    impl HttpTransport for MockServer {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            let key = (request.method, path_of(&request.url));
            self.requests.lock().await.push(request);

            let response = {
                let mut routes = self.routes.lock().await;
                match routes.get_mut(&key) {
                    Some(queue) if queue.len() > 1 => queue.pop_front(),
                    Some(queue) => queue.front().cloned(),
                    None => None,
                }
            };

            let Some(response) = response else {
                return Ok(HttpResponse {
                    status: 404,
                    reason: "Not Found".to_string(),
                    body: r#"{"detail":"Not found."}"#.to_string(),
                });
            };

            if !response.delay.is_zero() {
                tokio::time::sleep(response.delay).await;
            }

            Ok(HttpResponse {
                status: response.status,
                reason: String::new(),
                body: response.body,
            })
        }
    }

    pub fn client(server: &Arc<MockServer>, session: Session) -> ApiClient {
        ApiClient::new(MOCK_BASE_URL, server.clone(), session)
    }
}

#[cfg(test)]
mod tests {
    use super::mock_server::{client, MockResponse, MockServer};
    use super::*;
    use crate::{models::AuthResponse, models::User};
    use serde_json::json;

    fn response(status: u16, reason: &str, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            reason: reason.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_error_message_prefers_detail_then_error() {
        assert_eq!(
            error_message(&response(400, "Bad Request", r#"{"detail":"Invalid token","error":"x"}"#)),
            "Invalid token"
        );
        assert_eq!(
            error_message(&response(400, "Bad Request", r#"{"error":"Email taken"}"#)),
            "Email taken"
        );
        assert_eq!(
            error_message(&response(400, "Bad Request", r#"{"error":{"email":["required"]}}"#)),
            r#"{"email":["required"]}"#
        );
        assert_eq!(
            error_message(&response(400, "Bad Request", r#"{"name":["too long"]}"#)),
            r#"{"name":["too long"]}"#
        );
        assert_eq!(
            error_message(&response(502, "Bad Gateway", "<html>upstream</html>")),
            "HTTP 502: Bad Gateway"
        );
    }

    #[test]
    fn test_not_found_detection() {
        let by_status = ApiError::ApiResponseError {
            status_code: 404,
            message: "gone".into(),
        };
        let by_message = ApiError::ApiResponseError {
            status_code: 400,
            message: "Attraction Not Found".into(),
        };
        let other = ApiError::NetworkError("connection refused".into());

        assert!(by_status.is_not_found());
        assert!(by_message.is_not_found());
        assert!(!other.is_not_found());
    }

    #[tokio::test]
    async fn test_bearer_token_skips_auth_routes() {
        let server = Arc::new(MockServer::new());
        server
            .respond(Method::Get, "/compilations/", MockResponse::json(200, json!([])))
            .await;
        server
            .respond(
                Method::Post,
                "/auth/signin/",
                MockResponse::json(
                    200,
                    json!({"user": {"id": 1, "email": "a@b.c"}, "access": "t", "refresh": "r"}),
                ),
            )
            .await;

        let session = Session::in_memory();
        session
            .store_auth(&AuthResponse {
                user: User::default(),
                access: "token-1".into(),
                refresh: "refresh-1".into(),
            })
            .unwrap();
        let api = client(&server, session);

        let _: Vec<Value> = api.get("/compilations/", &[]).await.unwrap();
        let _: Value = api.post("/auth/signin/", &json!({"email": "a@b.c"})).await.unwrap();

        let list = server.last_request(Method::Get, "/compilations/").await.unwrap();
        assert_eq!(list.header("authorization"), Some("Bearer token-1"));
        assert_eq!(list.header("content-type"), Some("application/json"));

        let signin = server.last_request(Method::Post, "/auth/signin/").await.unwrap();
        assert_eq!(signin.header("authorization"), None);
    }

    #[tokio::test]
    async fn test_query_params_skip_empty_values() {
        let server = Arc::new(MockServer::new());
        server
            .respond(Method::Get, "/attractions/search/", MockResponse::json(200, json!([])))
            .await;
        let api = client(&server, Session::in_memory());

        let params = vec![("q", "musée d'orsay".to_string()), ("category", String::new())];
        let _: Vec<Value> = api.get("/attractions/search/", &params).await.unwrap();

        let request = server.requests().await.pop().unwrap();
        assert_eq!(
            request.url,
            "http://mock.local/api/attractions/search/?q=mus%C3%A9e+d%27orsay"
        );
    }

    #[tokio::test]
    async fn test_non_success_becomes_api_error() {
        let server = Arc::new(MockServer::new());
        server
            .respond(
                Method::Delete,
                "/compilations/3/",
                MockResponse::json(403, json!({"detail": "You do not have permission."})),
            )
            .await;
        let api = client(&server, Session::in_memory());

        let err = api.delete::<()>("/compilations/3/").await.unwrap_err();
        assert_eq!(err.status_code(), Some(403));
        assert_eq!(err.to_string(), "You do not have permission.");
    }

    #[tokio::test]
    async fn test_empty_body_decodes_as_null() {
        let server = Arc::new(MockServer::new());
        server
            .respond(Method::Delete, "/compilations/3/", MockResponse::raw(204, ""))
            .await;
        let api = client(&server, Session::in_memory());

        tokio_test::assert_ok!(api.delete::<()>("/compilations/3/").await);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_invalid_response() {
        let server = Arc::new(MockServer::new());
        server
            .respond(Method::Get, "/attractions/", MockResponse::raw(200, "not json"))
            .await;
        let api = client(&server, Session::in_memory());

        let err = api.get::<Vec<Value>>("/attractions/", &[]).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_patch_sends_body_with_patch_method() {
        let server = Arc::new(MockServer::new());
        server
            .respond(
                Method::Patch,
                "/auth/me/",
                MockResponse::json(200, json!({"id": 1, "username": "ana"})),
            )
            .await;
        let api = client(&server, Session::in_memory());

        let user: Value = api.patch("/auth/me/", &json!({"username": "ana"})).await.unwrap();
        assert_eq!(user["username"], "ana");

        let sent = server.last_request(Method::Patch, "/auth/me/").await.unwrap();
        assert_eq!(sent.body, Some(json!({"username": "ana"})));
    }
}
