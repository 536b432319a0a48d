//! Token storage
//!
//! Everything that reads or writes the persisted token pair goes through the
//! [`TokenStore`] trait. [`FileTokenStore`] is the durable store used by the
//! application; [`MemoryTokenStore`] backs tests and throwaway sessions.

use super::types::{AuthError, TokenPair};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const TOKENS_FILE: &str = "tokens.dat";
const ACCESS_TOKEN_SLOT: &str = "access_token";
const REFRESH_TOKEN_SLOT: &str = "refresh_token";

// Simple obfuscation key - not cryptographically secure but prevents casual reading
const OBFUSCATION_KEY: &[u8] = b"ShipKitClientTokenStorage";

/// Holder for the current access/refresh token pair
pub trait TokenStore: Send + Sync {
    /// Current pair, or `None` when logged out
    fn get(&self) -> Option<TokenPair>;

    /// Replace the stored pair
    fn set(&self, pair: &TokenPair) -> Result<(), AuthError>;

    /// Forget the stored pair. Never fails; storage errors are logged.
    fn clear(&self);
}

/// In-memory token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    pair: Mutex<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a pair
    pub fn with_pair(pair: TokenPair) -> Self {
        Self {
            pair: Mutex::new(Some(pair)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<TokenPair> {
        self.pair.lock().clone()
    }

    fn set(&self, pair: &TokenPair) -> Result<(), AuthError> {
        if !pair.is_complete() {
            return Err(AuthError::InvalidTokenPair);
        }
        *self.pair.lock() = Some(pair.clone());
        Ok(())
    }

    fn clear(&self) {
        *self.pair.lock() = None;
    }
}

/// Durable token store backed by a single obfuscated file.
///
/// The file holds a JSON object with one entry per named slot
/// (`access_token`, `refresh_token`).
#[derive(Debug)]
pub struct FileTokenStore {
    data_dir: PathBuf,
    // Serializes writers so a rename never races a concurrent clear
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    /// Open the store in the default per-user data directory
    pub fn new() -> Result<Self, AuthError> {
        let data_dir = crate::settings::data_dir().ok_or_else(|| {
            AuthError::Storage("Could not determine data directory".to_string())
        })?;
        Self::in_dir(data_dir)
    }

    /// Open the store in an explicit directory, creating it if needed
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|e| {
            AuthError::Storage(format!("Failed to create data directory: {}", e))
        })?;

        info!(
            "Token store initialized at {}",
            data_dir.join(TOKENS_FILE).display()
        );

        Ok(Self {
            data_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(TOKENS_FILE)
    }

    /// Simple XOR obfuscation (not secure, but prevents casual reading)
    fn obfuscate(data: &[u8]) -> Vec<u8> {
        data.iter()
            .enumerate()
            .map(|(i, &byte)| byte ^ OBFUSCATION_KEY[i % OBFUSCATION_KEY.len()])
            .collect()
    }

    fn encode_slots(pair: &TokenPair) -> Result<String, AuthError> {
        let mut slots = BTreeMap::new();
        slots.insert(ACCESS_TOKEN_SLOT, pair.access_token.as_str());
        slots.insert(REFRESH_TOKEN_SLOT, pair.refresh_token.as_str());
        let json = serde_json::to_string(&slots)
            .map_err(|e| AuthError::Storage(format!("Failed to serialize tokens: {}", e)))?;
        Ok(BASE64.encode(Self::obfuscate(json.as_bytes())))
    }

    fn decode_slots(encoded: &str) -> Result<BTreeMap<String, String>, String> {
        let obfuscated = BASE64
            .decode(encoded.trim())
            .map_err(|e| format!("base64: {}", e))?;
        let json = String::from_utf8(Self::obfuscate(&obfuscated))
            .map_err(|e| format!("utf8: {}", e))?;
        serde_json::from_str(&json).map_err(|e| format!("json: {}", e))
    }

    fn discard_corrupted(path: &Path, reason: &str) {
        error!("Token file is corrupted ({}), discarding it", reason);
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove corrupted token file: {}", e);
        }
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Option<TokenPair> {
        let path = self.path();
        let encoded = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Token file does not exist (first run or logged out)");
                return None;
            }
            Err(e) => {
                error!("Failed to read token file: {}", e);
                return None;
            }
        };

        let mut slots = match Self::decode_slots(&encoded) {
            Ok(slots) => slots,
            Err(reason) => {
                Self::discard_corrupted(&path, &reason);
                return None;
            }
        };

        let pair = TokenPair::from_slots(
            slots.remove(ACCESS_TOKEN_SLOT),
            slots.remove(REFRESH_TOKEN_SLOT),
        );
        if pair.is_none() {
            warn!("Token file holds a partial pair, treating as logged out");
        }
        pair
    }

    fn set(&self, pair: &TokenPair) -> Result<(), AuthError> {
        if !pair.is_complete() {
            return Err(AuthError::InvalidTokenPair);
        }

        let encoded = Self::encode_slots(pair)?;
        let path = self.path();
        let tmp_path = path.with_extension("dat.tmp");

        let _guard = self.write_lock.lock();
        std::fs::write(&tmp_path, &encoded).map_err(|e| {
            error!("Failed to write token file: {}", e);
            AuthError::Storage(format!("Failed to write token file: {}", e))
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            AuthError::Storage(format!("Failed to replace token file: {}", e))
        })?;

        debug!("Stored token pair ({} bytes)", encoded.len());
        Ok(())
    }

    fn clear(&self) {
        let _guard = self.write_lock.lock();
        match std::fs::remove_file(self.path()) {
            Ok(()) => info!("Cleared stored tokens"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No stored tokens to clear")
            }
            Err(e) => error!("Failed to delete token file: {}", e),
        }
    }
}
