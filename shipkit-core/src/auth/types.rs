//! Authentication types

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Session state observed by the UI
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    /// Stored credentials have not been resolved yet
    #[default]
    Initializing,
    /// Resolution finished; `None` means signed out
    Ready(Option<User>),
}

impl SessionState {
    /// The signed-in user, if any
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Ready(Some(user)) => Some(user),
            _ => None,
        }
    }

    /// Whether the startup identity check is still running
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Initializing)
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }
}

/// Access/refresh token pair.
///
/// Both tokens are opaque. A pair with an empty slot is never stored.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    /// Build a pair, rejecting empty tokens
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let pair = Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        };
        if pair.is_complete() {
            Ok(pair)
        } else {
            Err(AuthError::InvalidTokenPair)
        }
    }

    /// Assemble a pair from two storage slots. Partial pairs read as absent.
    pub fn from_slots(access_token: Option<String>, refresh_token: Option<String>) -> Option<Self> {
        match (access_token, refresh_token) {
            (Some(access_token), Some(refresh_token)) => {
                Self::new(access_token, refresh_token).ok()
            }
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}

// Tokens never show up in logs
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token_len", &self.access_token.len())
            .field("refresh_token_len", &self.refresh_token.len())
            .finish()
    }
}

/// Subscription plan tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Pro,
    Team,
    Enterprise,
    #[serde(other)]
    Unknown,
}

/// User record returned by the identity endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub plan: Plan,
    #[serde(default)]
    pub tokens_balance: i64,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

fn default_is_active() -> bool {
    true
}

/// Accept RFC 3339 timestamps as well as naive ISO-8601 ones (read as UTC)
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// Login request body
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Registration request body
#[derive(Debug, Clone, Serialize)]
pub struct RegisterData {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Tokens as issued by login/register
#[derive(Debug, Clone, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

impl AuthTokens {
    pub fn into_pair(self) -> Result<TokenPair, AuthError> {
        TokenPair::new(self.access_token, self.refresh_token)
    }
}

/// Response from `/auth/login` and `/auth/register`
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: AuthTokens,
}

/// Response from `/auth/refresh`
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Plain `{"message": ...}` acknowledgement
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Error types for the request pipeline
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid token pair: access and refresh tokens must both be present")]
    InvalidTokenPair,

    /// Non-2xx response, or no response at all when `status` is `None`
    #[error("API error ({}): {body}", .status.map_or_else(|| "no response".to_string(), |s| s.to_string()))]
    Api { status: Option<u16>, body: String },

    #[error("Session expired, please sign in again")]
    SessionExpired,

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// Failure before any HTTP status was received
    pub fn network(message: impl fmt::Display) -> Self {
        AuthError::Api {
            status: None,
            body: message.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Api { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, AuthError::SessionExpired)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Server-provided `detail` message, falling back to the raw body
    pub fn detail(&self) -> Option<String> {
        let AuthError::Api { body, .. } = self else {
            return None;
        };
        let parsed = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| match value.get("detail") {
                Some(serde_json::Value::String(text)) => Some(text.clone()),
                Some(other) if !other.is_null() => Some(other.to_string()),
                _ => None,
            });
        match parsed {
            Some(detail) => Some(detail),
            None if body.is_empty() => None,
            None => Some(body.clone()),
        }
    }
}
