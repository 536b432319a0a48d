//! Session manager - owns the signed-in identity and its lifecycle

use super::client::AuthenticatedClient;
use super::types::{
    AuthError, AuthResponse, Credentials, MessageResponse, RegisterData, SessionState, User,
};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::watch;

/// Session manager
///
/// State machine: `Initializing -> Ready(Option<User>)`. Consumers read the
/// state through [`SessionManager::state`] or follow it with
/// [`SessionManager::subscribe`]; only the manager writes it.
pub struct SessionManager {
    client: AuthenticatedClient,
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionManager {
    /// Create a manager in the `Initializing` state
    pub fn new(client: AuthenticatedClient) -> Self {
        let (sender, _) = watch::channel(SessionState::Initializing);
        let state = Arc::new(sender);

        // A failed refresh anywhere in the pipeline signs the user out
        let weak = Arc::downgrade(&state);
        client.refresher().on_session_expired(move || {
            if let Some(state) = weak.upgrade() {
                info!("Session expired, signing out");
                state.send_replace(SessionState::Ready(None));
            }
        });

        Self { client, state }
    }

    /// Create a manager and resolve any stored session
    pub async fn start(client: AuthenticatedClient) -> Self {
        let manager = Self::new(client);
        manager.initialize().await;
        manager
    }

    /// Resolve stored tokens to a user.
    ///
    /// Without stored tokens this settles on `Ready(None)` without touching
    /// the network. Any failure clears the tokens.
    pub async fn initialize(&self) {
        if self.client.token_store().get().is_none() {
            info!("No stored session found, user needs to log in");
            self.set_state(SessionState::Ready(None));
            return;
        }

        info!("Found stored session, resolving user...");
        match self.client.me().await {
            Ok(user) => {
                info!("Restored session for user {}", user.id);
                self.set_state(SessionState::Ready(Some(user)));
            }
            Err(e) => {
                warn!("Failed to restore stored session: {}", e);
                self.client.token_store().clear();
                self.set_state(SessionState::Ready(None));
            }
        }
    }

    /// Current state snapshot
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Follow state changes. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    /// Sign in with email and password
    pub async fn login(&self, credentials: &Credentials) -> Result<User, AuthError> {
        let response = self.client.login(credentials).await?;
        self.establish(response)
    }

    /// Create an account and sign in with it
    pub async fn register(&self, data: &RegisterData) -> Result<User, AuthError> {
        let response = self.client.register(data).await?;
        self.establish(response)
    }

    /// Log out locally. No network call is made.
    pub fn logout(&self) {
        info!("Logging out");
        self.client.refresher().invalidate();
        self.client.token_store().clear();
        self.set_state(SessionState::Ready(None));
    }

    /// Revoke refresh tokens on the server, then log out locally.
    ///
    /// Revocation is best effort; local logout always happens.
    pub async fn logout_everywhere(&self) {
        if self.client.is_authenticated() {
            match self.client.revoke_refresh_tokens().await {
                Ok(_) => info!("Server-side session revoked"),
                Err(e) => warn!("Failed to revoke session on server (non-fatal): {}", e),
            }
        }
        self.logout();
    }

    /// Re-fetch the current user. A failure is treated as a logout.
    pub async fn refresh_user(&self) -> Result<User, AuthError> {
        match self.client.me().await {
            Ok(user) => {
                debug!("User {} refreshed", user.id);
                self.set_state(SessionState::Ready(Some(user.clone())));
                Ok(user)
            }
            Err(e) => {
                warn!("Failed to refresh user, signing out: {}", e);
                self.client.token_store().clear();
                self.set_state(SessionState::Ready(None));
                Err(e)
            }
        }
    }

    /// Confirm an email address, then pick up the new verification flag
    pub async fn verify_email(&self, token: &str) -> Result<MessageResponse, AuthError> {
        let response = self.client.verify_email(token).await?;
        if self.is_authenticated() {
            if let Err(e) = self.refresh_user().await {
                warn!("Email verified but user refresh failed: {}", e);
            }
        }
        Ok(response)
    }

    pub async fn resend_verification(&self, email: &str) -> Result<MessageResponse, AuthError> {
        self.client.resend_verification(email).await
    }

    fn establish(&self, response: AuthResponse) -> Result<User, AuthError> {
        let pair = response.tokens.into_pair()?;
        self.client.refresher().invalidate();
        self.client.token_store().set(&pair)?;
        info!("Signed in as user {}", response.user.id);
        self.set_state(SessionState::Ready(Some(response.user.clone())));
        Ok(response.user)
    }

    fn set_state(&self, next: SessionState) {
        self.state.send_replace(next);
    }
}
