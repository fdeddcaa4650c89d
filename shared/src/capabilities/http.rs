//! API gateway: the one place the client talks HTTP.
//!
//! The core describes each call as an [`ApiRequest`] and hands it to the shell
//! through the [`Http`] capability. The shell answers with the raw status and
//! body; decoding, status mapping and the `{message, status, data}` error shape
//! carried by [`AppError`] all happen back in the core. [`HttpGateway`] is the
//! `reqwest` executor a Rust shell answers with.

use async_trait::async_trait;
use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::event::AuthToken;
use crate::{AppError, ErrorKind, DEFAULT_API_ERROR_MESSAGE};

pub const MAX_PATH_LENGTH: usize = 512;
pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }

    pub fn has_request_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: HttpMethod,
    path: String,
    body: Option<Value>,
    bearer: Option<AuthToken>,
    request_id: String,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Result<Self, HttpError> {
        let path = path.into();
        Self::validate_path(&path)?;
        Ok(Self {
            method,
            path,
            body: None,
            bearer: None,
            request_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    pub fn get(path: impl Into<String>) -> Result<Self, HttpError> {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post<T: Serialize>(path: impl Into<String>, body: &T) -> Result<Self, HttpError> {
        Self::new(HttpMethod::Post, path)?.with_json(body)
    }

    pub fn put<T: Serialize>(path: impl Into<String>, body: &T) -> Result<Self, HttpError> {
        Self::new(HttpMethod::Put, path)?.with_json(body)
    }

    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, HttpError> {
        if !self.method.has_request_body() {
            return Err(HttpError::InvalidRequest {
                reason: format!("{} requests carry no body", self.method.as_str()),
            });
        }
        let value = serde_json::to_value(body).map_err(|e| HttpError::Serialization {
            message: e.to_string(),
        })?;
        self.body = Some(value);
        Ok(self)
    }

    #[must_use]
    pub fn with_bearer(mut self, token: AuthToken) -> Self {
        self.bearer = Some(token);
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn bearer(&self) -> Option<&AuthToken> {
        self.bearer.as_ref()
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    fn validate_path(path: &str) -> Result<(), HttpError> {
        if !path.starts_with('/') {
            return Err(HttpError::InvalidRequest {
                reason: format!("path must start with '/': {path}"),
            });
        }
        if path.len() > MAX_PATH_LENGTH {
            return Err(HttpError::InvalidRequest {
                reason: format!("path exceeds {MAX_PATH_LENGTH} bytes"),
            });
        }
        if path.contains("..") || path.chars().any(char::is_control) {
            return Err(HttpError::InvalidRequest {
                reason: "path contains traversal or control characters".to_string(),
            });
        }
        Ok(())
    }
}

impl Operation for ApiRequest {
    type Output = HttpResult;
}

/// Whatever the server answered, whatever the status.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes a 2xx body. Any other status becomes [`HttpError::Status`]
    /// carrying the server's `message` when it sent one.
    pub fn into_json(self, request_id: &str) -> Result<Value, HttpError> {
        if !self.is_success() {
            let rejection = AppError::from_http_status(self.status, Some(self.body.as_bytes()));
            warn!(status = self.status, message = %rejection.message, request_id, "request rejected");
            return Err(HttpError::Status {
                status: self.status,
                message: rejection.message,
                data: rejection.data.unwrap_or(Value::Null),
                request_id: request_id.to_string(),
            });
        }

        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&self.body).map_err(|e| HttpError::InvalidResponse {
            reason: e.to_string(),
            request_id: request_id.to_string(),
        })
    }
}

pub type HttpResult = Result<ApiResponse, HttpError>;

#[derive(Error, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HttpError {
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64, request_id: String },

    #[error("connection failed: {message}")]
    Connection { message: String, request_id: String },

    #[error("HTTP error {status}: {message}")]
    Status {
        status: u16,
        message: String,
        data: Value,
        request_id: String,
    },

    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String, request_id: String },
}

impl HttpError {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            HttpError::Timeout { request_id, .. }
            | HttpError::Connection { request_id, .. }
            | HttpError::Status { request_id, .. }
            | HttpError::InvalidResponse { request_id, .. } => Some(request_id),
            HttpError::InvalidRequest { .. } | HttpError::Serialization { .. } => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<HttpError> for AppError {
    fn from(e: HttpError) -> Self {
        let request_id = e.request_id().map(str::to_owned);
        let error = match e {
            HttpError::Timeout { timeout_ms, .. } => {
                AppError::timeout().with_internal(format!("aborted after {timeout_ms}ms"))
            }
            HttpError::Connection { message, .. } => AppError::unreachable(message),
            // A body we cannot read is reported like an unreachable server.
            HttpError::InvalidResponse { reason, .. } => AppError::unreachable(reason),
            HttpError::Status {
                status,
                message,
                data,
                ..
            } => AppError::rejected(message, status).with_data(data),
            HttpError::InvalidRequest { reason } => {
                AppError::new(ErrorKind::Internal, "Requête invalide").with_internal(reason)
            }
            HttpError::Serialization { message } => {
                AppError::new(ErrorKind::Serialization, "Requête invalide").with_internal(message)
            }
        };
        match request_id {
            Some(id) => error.with_context("request_id", id),
            None => error,
        }
    }
}

#[derive(Capability)]
pub struct Http<Ev> {
    context: CapabilityContext<ApiRequest, Ev>,
}

impl<Ev> Http<Ev> {
    pub fn new(context: CapabilityContext<ApiRequest, Ev>) -> Self {
        Self { context }
    }
}

impl<Ev> Http<Ev>
where
    Ev: Send + 'static,
{
    /// Sends `request` and hands the decoded JSON body of a 2xx answer to `make_event`.
    pub fn send<F>(&self, request: ApiRequest, make_event: F)
    where
        F: FnOnce(Result<Value, HttpError>) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let request_id = request.request_id().to_string();
            let result = context
                .request_from_shell(request)
                .await
                .and_then(|response| response.into_json(&request_id));
            context.update_app(make_event(result));
        });
    }
}

#[async_trait]
pub trait ApiGateway: Send + Sync {
    /// Performs the exchange. Any status is a response; only transport
    /// failures are errors.
    async fn execute(&self, request: ApiRequest) -> HttpResult;
}

/// Successful bodies look like `{success, message?, ...payload}`.
/// A 2xx answer with `success: false` is still a rejection.
pub fn parse_envelope<T: DeserializeOwned>(body: Value) -> Result<T, AppError> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_API_ERROR_MESSAGE)
            .to_string();
        return Err(AppError::rejected(message, 200).with_data(body));
    }

    serde_json::from_value(body).map_err(|e| {
        AppError::new(ErrorKind::Serialization, "Réponse inattendue du serveur")
            .with_internal(e.to_string())
    })
}

/// `reqwest`-backed gateway used outside tests.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpGateway {
    pub fn new(config: &Config) -> Result<Self, HttpError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_CONTENT_TYPE));

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| HttpError::InvalidRequest {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.api_base_url.as_str().trim_end_matches('/').to_string(),
            timeout: config.request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn transport_error(&self, e: &reqwest::Error, request_id: &str) -> HttpError {
        if e.is_timeout() {
            HttpError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                request_id: request_id.to_string(),
            }
        } else {
            HttpError::Connection {
                message: e.to_string(),
                request_id: request_id.to_string(),
            }
        }
    }
}

#[async_trait]
impl ApiGateway for HttpGateway {
    #[instrument(skip(self, request), fields(method = request.method.as_str(), path = %request.path, request_id = %request.request_id))]
    async fn execute(&self, request: ApiRequest) -> HttpResult {
        let url = format!("{}{}", self.base_url, request.path);
        let started = Instant::now();

        let mut builder = self.client.request(request.method.into(), &url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token.expose());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            let err = self.transport_error(&e, &request.request_id);
            warn!(error = %err, "request failed before a response arrived");
            err
        })?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(&e, &request.request_id))?;

        debug!(
            status,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "response received"
        );

        Ok(ApiResponse::new(status, String::from_utf8_lossy(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_path_validation() {
        assert!(ApiRequest::get("/client/support/reclamations").is_ok());
        assert!(ApiRequest::get("client/auth/login").is_err());
        assert!(ApiRequest::get("/client/../admin").is_err());
        assert!(ApiRequest::get(format!("/{}", "a".repeat(MAX_PATH_LENGTH))).is_err());
    }

    #[test]
    fn test_get_requests_refuse_a_body() {
        let result = ApiRequest::get("/x").unwrap().with_json(&json!({"a": 1}));
        assert!(matches!(result, Err(HttpError::InvalidRequest { .. })));
    }

    #[test]
    fn test_post_carries_json_and_bearer() {
        let request = ApiRequest::post("/client/auth/login", &json!({"phoneNumber": "0612345678"}))
            .unwrap()
            .with_bearer(AuthToken::new("tok"));
        assert_eq!(request.method(), HttpMethod::Post);
        assert_eq!(request.body(), Some(&json!({"phoneNumber": "0612345678"})));
        assert_eq!(request.bearer().map(AuthToken::expose), Some("tok"));
        assert!(!request.request_id().is_empty());
    }

    #[test]
    fn test_request_debug_redacts_token() {
        let request = ApiRequest::get("/x").unwrap().with_bearer(AuthToken::new("very-secret"));
        assert!(!format!("{request:?}").contains("very-secret"));
    }

    #[test]
    fn test_request_carries_its_token_to_the_shell() {
        let request = ApiRequest::get("/client/support/reclamations")
            .unwrap()
            .with_bearer(AuthToken::new("tok"));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["method"], "Get");
        assert_eq!(json["bearer"], "tok");

        let back: ApiRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_non_2xx_uses_server_message() {
        let err = ApiResponse::new(401, r#"{"message":"Code incorrect"}"#)
            .into_json("r1")
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(matches!(&err, HttpError::Status { message, .. } if message == "Code incorrect"));
        assert_eq!(err.request_id(), Some("r1"));

        let err = ApiResponse::new(502, "<html>bad gateway</html>")
            .into_json("r2")
            .unwrap_err();
        assert!(matches!(&err, HttpError::Status { message, .. } if message == DEFAULT_API_ERROR_MESSAGE));
    }

    #[test]
    fn test_2xx_bodies_decode() {
        assert_eq!(ApiResponse::new(204, "").into_json("r").unwrap(), Value::Null);
        assert_eq!(
            ApiResponse::new(200, r#"{"success":true}"#).into_json("r").unwrap(),
            json!({"success": true})
        );
        assert!(matches!(
            ApiResponse::new(200, "not json").into_json("r"),
            Err(HttpError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_status_error_converts_to_rejection() {
        let err = HttpError::Status {
            status: 401,
            message: "Code expiré".into(),
            data: json!({"message": "Code expiré"}),
            request_id: "r1".into(),
        };
        let app: AppError = err.into();
        assert_eq!(app.kind, ErrorKind::Rejected);
        assert_eq!(app.status, Some(401));
        assert_eq!(app.message, "Code expiré");
        assert_eq!(app.context.get("request_id").map(String::as_str), Some("r1"));
    }

    #[test]
    fn test_timeout_and_parse_failures_are_generic() {
        let timeout: AppError = HttpError::Timeout {
            timeout_ms: 10_000,
            request_id: "r".into(),
        }
        .into();
        assert_eq!(timeout.kind, ErrorKind::Timeout);

        let garbled: AppError = HttpError::InvalidResponse {
            reason: "expected value".into(),
            request_id: "r".into(),
        }
        .into();
        assert_eq!(garbled.kind, ErrorKind::Network);
    }

    #[test]
    fn test_envelope_success_false_is_rejection() {
        #[derive(Deserialize)]
        struct Ack {
            #[allow(dead_code)]
            success: bool,
        }

        let err = parse_envelope::<Ack>(json!({"success": false, "message": "Numéro inconnu"}))
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Rejected);
        assert_eq!(err.message, "Numéro inconnu");

        let err = parse_envelope::<Ack>(json!({"success": false})).err().unwrap();
        assert_eq!(err.message, DEFAULT_API_ERROR_MESSAGE);

        assert!(parse_envelope::<Ack>(json!({"success": true})).is_ok());
    }

    #[test]
    fn test_envelope_shape_mismatch_is_serialization_error() {
        #[derive(Debug, Deserialize)]
        struct NeedsToken {
            #[allow(dead_code)]
            token: String,
        }
        let err = parse_envelope::<NeedsToken>(json!({"success": true})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Serialization);
    }
}
