//! Authenticated HTTP client
//!
//! Single entry point for API access. Attaches the bearer token, and on a 401
//! for an authorized request refreshes through the [`RefreshCoordinator`] and
//! retries the original request exactly once.

use super::http_client::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use super::refresh::{REFRESH_PATH, RefreshCoordinator};
use super::storage::TokenStore;
use super::types::{AuthError, TokenPair};
use crate::settings::ClientSettings;
use log::{debug, info, warn};
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// One API call
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub path: String,
    pub method: Method,
    pub body: Option<serde_json::Value>,
    pub requires_auth: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            body: None,
            requires_auth: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, AuthError> {
        let value = serde_json::to_value(body)
            .map_err(|e| AuthError::Decode(format!("Failed to encode request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Mark the call as needing the bearer token
    pub fn authorized(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn with_auth(mut self, requires_auth: bool) -> Self {
        self.requires_auth = requires_auth;
        self
    }
}

/// HTTP client with token attachment and refresh-then-retry
#[derive(Clone)]
pub struct AuthenticatedClient {
    settings: Arc<ClientSettings>,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn TokenStore>,
    refresher: RefreshCoordinator,
}

impl AuthenticatedClient {
    /// Build a client over an explicit transport and token store
    pub fn new(
        settings: ClientSettings,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        let refresher = RefreshCoordinator::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            settings.endpoint(REFRESH_PATH),
        );
        info!("API client targeting {}", settings.api_base_url);
        Self {
            settings: Arc::new(settings),
            transport,
            store,
            refresher,
        }
    }

    /// Build a client that talks to the network through reqwest
    pub fn with_reqwest(
        settings: ClientSettings,
        store: Arc<dyn TokenStore>,
    ) -> Result<Self, AuthError> {
        let transport = ReqwestTransport::new(&settings)?;
        Ok(Self::new(settings, Arc::new(transport), store))
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    /// Whether a complete token pair is stored
    pub fn is_authenticated(&self) -> bool {
        self.store.get().is_some()
    }

    /// Issue `descriptor` and decode the response as `T`.
    ///
    /// A 401 on an authorized request triggers one refresh and one retry. A
    /// 204 decodes from JSON `null`, so use `()` or `Option<_>` for endpoints
    /// without a payload.
    pub async fn request<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<T, AuthError> {
        let sent_token = if descriptor.requires_auth {
            self.store.get().map(|pair| pair.access_token)
        } else {
            None
        };

        let mut response = self.send(&descriptor, sent_token.as_deref()).await?;

        if response.is_unauthorized() && descriptor.requires_auth {
            debug!(
                "{} {} returned 401, refreshing tokens",
                descriptor.method, descriptor.path
            );
            let TokenPair { access_token, .. } =
                self.refresher.refresh_stale(sent_token.as_deref()).await?;
            response = self.send(&descriptor, Some(&access_token)).await?;
            if response.is_unauthorized() {
                warn!(
                    "{} {} still unauthorized after refresh",
                    descriptor.method, descriptor.path
                );
            }
        }

        Self::decode(&descriptor, response)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        requires_auth: bool,
    ) -> Result<T, AuthError> {
        self.request(RequestDescriptor::get(path).with_auth(requires_auth))
            .await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        requires_auth: bool,
    ) -> Result<T, AuthError> {
        self.request(RequestDescriptor::post(path).json(body)?.with_auth(requires_auth))
            .await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        requires_auth: bool,
    ) -> Result<T, AuthError> {
        self.request(RequestDescriptor::put(path).json(body)?.with_auth(requires_auth))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        requires_auth: bool,
    ) -> Result<T, AuthError> {
        self.request(RequestDescriptor::delete(path).with_auth(requires_auth))
            .await
    }

    async fn send(
        &self,
        descriptor: &RequestDescriptor,
        access_token: Option<&str>,
    ) -> Result<HttpResponse, AuthError> {
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        if descriptor.requires_auth {
            if let Some(token) = access_token {
                headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
            }
        }

        let request = HttpRequest {
            method: descriptor.method.clone(),
            url: self.settings.endpoint(&descriptor.path),
            headers,
            body: descriptor.body.clone(),
        };
        self.transport.send(request).await
    }

    fn decode<T: DeserializeOwned>(
        descriptor: &RequestDescriptor,
        response: HttpResponse,
    ) -> Result<T, AuthError> {
        if !response.is_success() {
            debug!(
                "{} {} failed with {}",
                descriptor.method, descriptor.path, response.status
            );
            return Err(AuthError::Api {
                status: Some(response.status),
                body: response.body,
            });
        }

        if response.is_no_content() {
            return serde_json::from_value(serde_json::Value::Null).map_err(|e| {
                AuthError::Decode(format!("204 No Content for a typed payload: {}", e))
            });
        }

        response.json()
    }
}
