//! Authentication Module for ShipKit
//!
//! Authenticated request pipeline with single-flight token refresh.
//!
//! ## Architecture
//!
//! - types.rs: Token pair, user, session state and error types
//! - storage.rs: Durable and in-memory token stores
//! - http_client.rs: Transport seam and the reqwest-backed transport
//! - refresh.rs: Coalesced `/auth/refresh` with session expiry hooks
//! - client.rs: Bearer injection, refresh on 401 and a single retry
//! - api.rs: Identity endpoints (login, register, me, verification)
//! - manager.rs: Session state machine

pub mod api;
pub mod client;
pub mod http_client;
pub mod manager;
pub mod refresh;
pub mod storage;
pub mod types;

#[cfg(test)]
mod test_support;

pub use client::{AuthenticatedClient, RequestDescriptor};
pub use http_client::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use manager::SessionManager;
pub use refresh::RefreshCoordinator;
pub use storage::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::{
    AuthError, AuthResponse, Credentials, MessageResponse, Plan, RegisterData, SessionState,
    TokenPair, User,
};
