//! Identity endpoints of the ShipKit API

use super::client::AuthenticatedClient;
use super::types::{AuthError, AuthResponse, Credentials, MessageResponse, RegisterData, User};
use log::{debug, info};
use serde_json::json;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const ME_PATH: &str = "/auth/me";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const VERIFY_EMAIL_PATH: &str = "/auth/verify-email";
pub const RESEND_VERIFICATION_PATH: &str = "/auth/resend-verification";

impl AuthenticatedClient {
    /// Exchange credentials for a user and token pair. Does not store tokens.
    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, AuthError> {
        debug!("Signing in user: {}", credentials.email);
        let response: AuthResponse = self.post(LOGIN_PATH, credentials, false).await?;
        info!("Sign in successful for user {}", response.user.id);
        Ok(response)
    }

    /// Create an account. Does not store tokens.
    pub async fn register(&self, data: &RegisterData) -> Result<AuthResponse, AuthError> {
        debug!("Registering user: {}", data.email);
        let response: AuthResponse = self.post(REGISTER_PATH, data, false).await?;
        info!("Registration successful for user {}", response.user.id);
        Ok(response)
    }

    /// Resolve the stored tokens to a user ("who am I")
    pub async fn me(&self) -> Result<User, AuthError> {
        self.get(ME_PATH, true).await
    }

    /// Revoke every refresh token issued to the current user
    pub async fn revoke_refresh_tokens(&self) -> Result<MessageResponse, AuthError> {
        self.post(LOGOUT_PATH, &json!({}), true).await
    }

    pub async fn verify_email(&self, token: &str) -> Result<MessageResponse, AuthError> {
        self.post(VERIFY_EMAIL_PATH, &json!({ "token": token }), false)
            .await
    }

    pub async fn resend_verification(&self, email: &str) -> Result<MessageResponse, AuthError> {
        self.post(RESEND_VERIFICATION_PATH, &json!({ "email": email }), false)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::storage::{MemoryTokenStore, TokenStore};
    use crate::auth::test_support::{BASE_URL, FakeApi};
    use crate::auth::types::TokenPair;
    use crate::settings::ClientSettings;
    use std::sync::Arc;

    fn client(api: Arc<FakeApi>, store: Arc<MemoryTokenStore>) -> AuthenticatedClient {
        let settings = ClientSettings {
            api_base_url: BASE_URL.to_string(),
            ..ClientSettings::default()
        };
        AuthenticatedClient::new(settings, api, store)
    }

    #[tokio::test]
    async fn test_login_sends_credentials_without_bearer() {
        let api = Arc::new(FakeApi::new());
        let store = Arc::new(MemoryTokenStore::with_pair(TokenPair::new("A1", "R1").unwrap()));
        let client = client(api.clone(), store);

        let response = client
            .login(&Credentials::new("a@b.com", "x"))
            .await
            .unwrap();
        assert_eq!(response.user.id, 1);
        assert_eq!(response.tokens.access_token, "A1");

        let sent = &api.requests_to(LOGIN_PATH)[0];
        assert!(sent.bearer_token().is_none());
        let body = sent.body.as_ref().unwrap();
        assert_eq!(body["email"], "a@b.com");
        assert_eq!(body["password"], "x");
    }

    #[tokio::test]
    async fn test_login_rejection_does_not_refresh() {
        let api = Arc::new(FakeApi::new());
        let store = Arc::new(MemoryTokenStore::new());
        let client = client(api.clone(), store.clone());

        let err = client
            .login(&Credentials::new("a@b.com", "wrong"))
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(err.detail().as_deref(), Some("Invalid email or password"));
        assert_eq!(api.refresh_calls(), 0);
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_register_conflict_surfaces_detail() {
        let api = Arc::new(FakeApi::new());
        let client = client(api, Arc::new(MemoryTokenStore::new()));

        let err = client
            .register(&RegisterData {
                email: "taken@b.com".to_string(),
                password: "x".to_string(),
                name: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.detail().as_deref(), Some("Email already registered"));
    }

    #[tokio::test]
    async fn test_verification_endpoints() {
        let api = Arc::new(FakeApi::new());
        let client = client(api.clone(), Arc::new(MemoryTokenStore::new()));

        let sent = client.resend_verification("a@b.com").await.unwrap();
        assert!(sent.message.contains("verification link"));

        let err = client.verify_email("bad").await.unwrap_err();
        assert_eq!(err.detail().as_deref(), Some("Invalid verification token"));

        let ok = client.verify_email("good").await.unwrap();
        assert_eq!(ok.message, "Email verified successfully");
        assert_eq!(
            api.requests_to(VERIFY_EMAIL_PATH)[1].body.as_ref().unwrap()["token"],
            "good"
        );
    }
}
