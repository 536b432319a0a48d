//! Single-flight token refresh
//!
//! Every caller that needs a new access token goes through
//! [`RefreshCoordinator`]. While one refresh is running, later callers attach
//! to the same pending outcome instead of presenting the refresh token again
//! (the server rotates refresh tokens, so a second presentation of the old one
//! would be rejected and log the user out).

use super::http_client::{HttpRequest, HttpTransport};
use super::storage::TokenStore;
use super::types::{AuthError, RefreshResponse, TokenPair};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub const REFRESH_PATH: &str = "/auth/refresh";

type PendingRefresh = Shared<BoxFuture<'static, Result<TokenPair, AuthError>>>;
type ExpiryHook = Arc<dyn Fn() + Send + Sync>;

struct InFlight {
    id: u64,
    pending: PendingRefresh,
}

/// Why a caller wants a refresh
enum Trigger<'a> {
    /// Unconditional request for new tokens
    Explicit,
    /// A request sent with this access token came back 401
    Rejected(Option<&'a str>),
}

struct Inner {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn TokenStore>,
    refresh_url: String,
    in_flight: Mutex<Option<InFlight>>,
    next_id: AtomicU64,
    // Bumped whenever the session is ended or replaced
    epoch: Mutex<u64>,
    expiry_hooks: Mutex<Vec<ExpiryHook>>,
}

/// Performs `/auth/refresh` with at most one call in flight
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn TokenStore>,
        refresh_url: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                refresh_url: refresh_url.into(),
                in_flight: Mutex::new(None),
                next_id: AtomicU64::new(0),
                epoch: Mutex::new(0),
                expiry_hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Obtain a fresh token pair.
    ///
    /// Joins the running refresh if there is one, otherwise starts a new one.
    /// Every failure is reported as `AuthError::SessionExpired` and leaves
    /// the token store empty.
    pub async fn refresh(&self) -> Result<TokenPair, AuthError> {
        self.join_or_start(Trigger::Explicit).await
    }

    /// Obtain tokens newer than `used_access_token`.
    ///
    /// If the stored access token has already moved on from the one the
    /// failing request carried, the stored pair is returned without a
    /// network call.
    pub async fn refresh_stale(
        &self,
        used_access_token: Option<&str>,
    ) -> Result<TokenPair, AuthError> {
        self.join_or_start(Trigger::Rejected(used_access_token)).await
    }

    /// Run `hook` whenever a refresh fails, before waiters are resolved.
    ///
    /// Hooks run with the session epoch locked and must not call back into
    /// the coordinator.
    pub fn on_session_expired(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.inner.expiry_hooks.lock().push(Arc::new(hook));
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Detach any running refresh from the current session.
    ///
    /// Call before the stored tokens are cleared or replaced. A refresh
    /// started earlier still completes, but neither writes the store nor runs
    /// expiry hooks; its waiters get `AuthError::SessionExpired`.
    pub fn invalidate(&self) {
        {
            let mut epoch = self.inner.epoch.lock();
            *epoch += 1;
            debug!("Session epoch advanced to {}", *epoch);
        }
        if let Some(stale) = self.inner.in_flight.lock().take() {
            debug!("Detached token refresh #{} from the session", stale.id);
        }
    }

    async fn join_or_start(&self, trigger: Trigger<'_>) -> Result<TokenPair, AuthError> {
        let pending = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!("Joining in-flight token refresh #{}", in_flight.id);
                    in_flight.pending.clone()
                }
                None => {
                    if let Trigger::Rejected(used) = trigger {
                        if let Some(current) = self.inner.store.get() {
                            if used != Some(current.access_token.as_str()) {
                                debug!("Access token already rotated, skipping refresh");
                                return Ok(current);
                            }
                        }
                    }
                    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
                    let pending = Inner::spawn_refresh(Arc::clone(&self.inner), id);
                    *slot = Some(InFlight {
                        id,
                        pending: pending.clone(),
                    });
                    pending
                }
            }
        };
        pending.await
    }
}

impl Inner {
    /// Run the refresh on its own task so abandoned callers cannot cancel it
    fn spawn_refresh(inner: Arc<Inner>, id: u64) -> PendingRefresh {
        let epoch = *inner.epoch.lock();
        info!("Starting token refresh #{}", id);
        let task_inner = Arc::clone(&inner);
        let task = tokio::spawn(async move {
            let outcome = task_inner.perform_refresh().await;
            let result = task_inner.settle(id, epoch, outcome);
            task_inner.finish(id);
            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!("Token refresh #{} aborted: {}", id, e);
                    inner.finish(id);
                    Err(AuthError::SessionExpired)
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn perform_refresh(&self) -> Result<TokenPair, AuthError> {
        let refresh_token = match self.store.get() {
            Some(pair) => pair.refresh_token,
            None => {
                debug!("No refresh token stored");
                return Err(AuthError::SessionExpired);
            }
        };

        let request = HttpRequest {
            method: Method::POST,
            url: self.refresh_url.clone(),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
            ],
            body: Some(json!({ "refresh_token": refresh_token })),
        };

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(AuthError::Api {
                status: Some(response.status),
                body: response.body,
            });
        }

        let data: RefreshResponse = response.json()?;
        TokenPair::new(data.access_token, data.refresh_token)
    }

    /// Apply a refresh outcome, unless the session it belongs to has ended
    fn settle(
        &self,
        id: u64,
        epoch: u64,
        outcome: Result<TokenPair, AuthError>,
    ) -> Result<TokenPair, AuthError> {
        // Held until the store reflects the outcome
        let current = self.epoch.lock();
        if *current != epoch {
            info!("Token refresh #{} outlived its session, discarding result", id);
            return Err(AuthError::SessionExpired);
        }

        match outcome {
            Ok(pair) => match self.store.set(&pair) {
                Ok(()) => {
                    info!("Token refresh #{} succeeded", id);
                    Ok(pair)
                }
                Err(e) => {
                    error!("Failed to persist refreshed tokens: {}", e);
                    self.expire();
                    Err(AuthError::SessionExpired)
                }
            },
            Err(e) => {
                warn!("Token refresh #{} failed: {}", id, e);
                self.expire();
                Err(AuthError::SessionExpired)
            }
        }
    }

    /// Drop the stored pair and tell listeners the session is gone
    fn expire(&self) {
        self.store.clear();
        let hooks = self.expiry_hooks.lock().clone();
        for hook in hooks {
            hook();
        }
    }

    /// Return to idle, unless a newer refresh already owns the slot
    fn finish(&self, id: u64) {
        let mut slot = self.in_flight.lock();
        if slot.as_ref().map(|f| f.id) == Some(id) {
            *slot = None;
        }
    }
}
