//! ShipKit Core Library
//!
//! Client side of the ShipKit API: token storage, the authenticated request
//! pipeline and the session manager. Used by the ShipKit desktop client.

pub mod auth;
pub mod settings;

// Re-export commonly used items
pub use auth::{
    AuthError, AuthenticatedClient, Credentials, FileTokenStore, MemoryTokenStore,
    RequestDescriptor, SessionManager, SessionState, TokenPair, TokenStore, User,
};
pub use reqwest::Method;
pub use settings::{ClientSettings, load_settings};
