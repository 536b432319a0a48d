//! HTTP transport for the ShipKit API
//!
//! [`HttpTransport`] is the only place bytes leave the process. The pipeline
//! talks to it in terms of [`HttpRequest`]/[`HttpResponse`], which keeps the
//! refresh and retry logic independent of the HTTP library.

use super::types::AuthError;
use crate::settings::ClientSettings;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;

/// A fully built outbound request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Token from the `Authorization: Bearer` header, if present
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("Authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
    }
}

/// Status and raw body of a response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_no_content(&self) -> bool {
        self.status == 204
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Decode the body as `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AuthError> {
        serde_json::from_str(&self.body).map_err(|e| AuthError::Decode(e.to_string()))
    }
}

/// Moves a request over the wire.
///
/// Failures to get any response at all are reported as
/// `AuthError::Api { status: None, .. }`; every received status, including
/// errors, is returned as an `HttpResponse`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AuthError>;
}

/// reqwest-backed transport used in production
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with the configured user agent and request deadline
    pub fn new(settings: &ClientSettings) -> Result<Self, AuthError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| AuthError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        debug!("{} {}", request.method, request.url);

        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                warn!("{} {} timed out", request.method, request.url);
                AuthError::network(format!("Request timed out: {}", e))
            } else {
                warn!("{} {} failed: {}", request.method, request.url, e);
                AuthError::network(e)
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::network(format!("Failed to read response body: {}", e)))?;

        debug!("{} {} -> {}", request.method, request.url, status);
        Ok(HttpResponse { status, body })
    }
}
