//! Scripted in-process ShipKit API used by the pipeline tests

use super::http_client::{HttpRequest, HttpResponse, HttpTransport};
use super::types::AuthError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const BASE_URL: &str = "http://api.shipkit.test";

const DEFAULT_REFRESH_DELAY: Duration = Duration::from_millis(50);

struct FakeState {
    valid_access: String,
    valid_refresh: String,
    generation: u32,
    reject_refresh: bool,
    malformed_refresh: bool,
    me_always_unauthorized: bool,
    verified: bool,
}

/// Fake identity/resource server.
///
/// Accepts `A1`/`R1` initially; each successful refresh rotates to the next
/// generation (`A2`/`R2`, ...) and invalidates the previous tokens.
pub struct FakeApi {
    state: Mutex<FakeState>,
    refresh_calls: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
    refresh_delay: Duration,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                valid_access: "A1".to_string(),
                valid_refresh: "R1".to_string(),
                generation: 1,
                reject_refresh: false,
                malformed_refresh: false,
                me_always_unauthorized: false,
                verified: false,
            }),
            refresh_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            refresh_delay: DEFAULT_REFRESH_DELAY,
        }
    }

    pub fn rejecting_refresh(self) -> Self {
        self.state.lock().reject_refresh = true;
        self
    }

    pub fn malformed_refresh(self) -> Self {
        self.state.lock().malformed_refresh = true;
        self
    }

    pub fn me_always_unauthorized(self) -> Self {
        self.state.lock().me_always_unauthorized = true;
        self
    }

    /// How long `/auth/refresh` takes to answer
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Recorded requests for `path`, in arrival order
    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.strip_prefix(BASE_URL) == Some(path))
            .cloned()
            .collect()
    }

    fn user(&self) -> Value {
        json!({
            "id": 1,
            "email": "a@b.com",
            "name": "Ada",
            "plan": "free",
            "tokens_balance": 1000,
            "is_active": true,
            "is_verified": self.state.lock().verified,
            "created_at": "2024-05-01T10:20:30.123456"
        })
    }

    fn authorized(&self, request: &HttpRequest) -> bool {
        let state = self.state.lock();
        !state.me_always_unauthorized
            && request.bearer_token() == Some(state.valid_access.as_str())
    }

    fn unauthorized(detail: &str) -> HttpResponse {
        HttpResponse::new(401, json!({ "detail": detail }).to_string())
    }

    fn auth_response(&self, status: u16) -> HttpResponse {
        let tokens = {
            let state = self.state.lock();
            json!({
                "access_token": state.valid_access,
                "refresh_token": state.valid_refresh,
                "token_type": "bearer"
            })
        };
        HttpResponse::new(
            status,
            json!({ "user": self.user(), "tokens": tokens }).to_string(),
        )
    }

    async fn handle_refresh(&self, request: &HttpRequest) -> HttpResponse {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.refresh_delay).await;

        let presented = request
            .body
            .as_ref()
            .and_then(|b| b.get("refresh_token"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut state = self.state.lock();
        if state.malformed_refresh {
            return HttpResponse::new(200, r#"{"unexpected": true}"#);
        }
        if state.reject_refresh || presented != state.valid_refresh {
            return Self::unauthorized("Token expired or revoked");
        }
        state.generation += 1;
        state.valid_access = format!("A{}", state.generation);
        state.valid_refresh = format!("R{}", state.generation);
        HttpResponse::new(
            200,
            json!({
                "access_token": state.valid_access,
                "refresh_token": state.valid_refresh,
                "token_type": "bearer"
            })
            .to_string(),
        )
    }
}

#[async_trait]
impl HttpTransport for FakeApi {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        self.requests.lock().push(request.clone());
        let path = request
            .url
            .strip_prefix(BASE_URL)
            .unwrap_or(request.url.as_str())
            .to_string();
        let field = |name: &str| -> String {
            request
                .body
                .as_ref()
                .and_then(|b| b.get(name))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let response = match (request.method.as_str(), path.as_str()) {
            ("POST", "/auth/login") => {
                if field("password") == "x" {
                    self.auth_response(200)
                } else {
                    Self::unauthorized("Invalid email or password")
                }
            }
            ("POST", "/auth/register") => {
                if field("email") == "taken@b.com" {
                    HttpResponse::new(400, r#"{"detail":"Email already registered"}"#)
                } else {
                    self.auth_response(201)
                }
            }
            ("POST", "/auth/refresh") => self.handle_refresh(&request).await,
            ("GET", "/auth/me") if self.authorized(&request) => {
                HttpResponse::new(200, self.user().to_string())
            }
            ("GET", "/auth/me") => Self::unauthorized("Could not validate credentials"),
            ("POST", "/auth/logout") if self.authorized(&request) => {
                HttpResponse::new(200, r#"{"message":"Logged out"}"#)
            }
            ("POST", "/auth/logout") => Self::unauthorized("Could not validate credentials"),
            ("POST", "/auth/verify-email") => {
                if field("token") == "good" {
                    self.state.lock().verified = true;
                    HttpResponse::new(200, r#"{"message":"Email verified successfully"}"#)
                } else {
                    HttpResponse::new(400, r#"{"detail":"Invalid verification token"}"#)
                }
            }
            ("POST", "/auth/resend-verification") => HttpResponse::new(
                200,
                r#"{"message":"If the email exists, a verification link has been sent"}"#,
            ),
            ("DELETE", "/projects/7") if self.authorized(&request) => HttpResponse::new(204, ""),
            (_, "/projects/7") => Self::unauthorized("Could not validate credentials"),
            ("GET", "/billing/plans") => HttpResponse::new(200, "<html>not json</html>"),
            ("GET", "/boom") => HttpResponse::new(500, r#"{"detail":"Internal error"}"#),
            ("GET", "/offline") => return Err(AuthError::network("connection refused")),
            _ => HttpResponse::new(404, r#"{"detail":"Not Found"}"#),
        };
        Ok(response)
    }
}
