//! Storage for authorizations that outlive one tool invocation.
//!
//! Non-blocking CIBA and device flows leave a [`PendingAuthorization`]
//! behind when they interrupt; the next invocation (or the background
//! resumer) polls it. Credentials obtained out of band can be parked here
//! for the resumed call to consume.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use authpause_auth0::{BackchannelAuthorizeResponse, DeviceCodeResponse};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::credential::{after_secs, Credential};
use crate::interrupt::InterruptKind;

/// Seconds added to the polling interval on `slow_down`
pub const SLOW_DOWN_INCREMENT_SECS: u64 = 5;

/// Used when the server omits `expires_in` on a backchannel request
const DEFAULT_CIBA_EXPIRY_SECS: u64 = 300;

/// Errors that can occur in auth store operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthStoreError {
    /// Failed to read from storage.
    #[error("Failed to read auth store: {0}")]
    Read(String),

    /// Failed to write to storage.
    #[error("Failed to write auth store: {0}")]
    Write(String),

    /// IO error during storage operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The out-of-band flow a pending authorization is waiting on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum PendingFlow {
    Ciba {
        auth_req_id: String,
    },
    Device {
        device_code: String,
        user_code: String,
        verification_uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        verification_uri_complete: Option<String>,
    },
}

/// An authorization request awaiting user approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    #[serde(flatten)]
    pub flow: PendingFlow,
    pub tool_call_id: String,
    pub interval_secs: u64,
    pub expires_at: DateTime<Utc>,
    pub next_poll_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PendingAuthorization {
    /// Record a backchannel authorization request
    pub fn ciba(
        tool_call_id: impl Into<String>,
        response: &BackchannelAuthorizeResponse,
        now: DateTime<Utc>,
    ) -> Self {
        let interval = response.interval_secs();
        let expires_in = response.expires_in.unwrap_or(DEFAULT_CIBA_EXPIRY_SECS);
        Self {
            flow: PendingFlow::Ciba {
                auth_req_id: response.auth_req_id.clone(),
            },
            tool_call_id: tool_call_id.into(),
            interval_secs: interval,
            expires_at: after_secs(now, expires_in),
            next_poll_at: after_secs(now, interval),
            created_at: now,
        }
    }

    /// Record a device authorization request
    pub fn device(
        tool_call_id: impl Into<String>,
        response: &DeviceCodeResponse,
        now: DateTime<Utc>,
    ) -> Self {
        let interval = response.interval_secs();
        Self {
            flow: PendingFlow::Device {
                device_code: response.device_code.clone(),
                user_code: response.user_code.clone(),
                verification_uri: response.verification_uri.clone(),
                verification_uri_complete: response.verification_uri_complete.clone(),
            },
            tool_call_id: tool_call_id.into(),
            interval_secs: interval,
            expires_at: after_secs(now, response.expires_in),
            next_poll_at: after_secs(now, interval),
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True once the polling interval has elapsed
    pub fn is_poll_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_poll_at
    }

    /// Seconds until expiry, never negative
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        (self.expires_at - now).num_seconds().max(0) as u64
    }

    /// Schedule the next poll one interval from `now`
    pub fn schedule_next(&mut self, now: DateTime<Utc>) {
        self.next_poll_at = after_secs(now, self.interval_secs);
    }

    /// Widen the interval after `slow_down` and reschedule
    pub fn slow_down(&mut self, now: DateTime<Utc>) {
        self.interval_secs = self.interval_secs.saturating_add(SLOW_DOWN_INCREMENT_SECS);
        self.schedule_next(now);
    }

    /// The interrupt describing this pending request
    pub fn pending_kind(&self, now: DateTime<Utc>) -> InterruptKind {
        match &self.flow {
            PendingFlow::Ciba { auth_req_id } => InterruptKind::CibaPending {
                auth_req_id: auth_req_id.clone(),
                interval: self.interval_secs,
                expires_in: Some(self.remaining_secs(now)),
            },
            PendingFlow::Device {
                user_code,
                verification_uri,
                verification_uri_complete,
                ..
            } => InterruptKind::DeviceFlowPending {
                verification_uri: verification_uri.clone(),
                verification_uri_complete: verification_uri_complete.clone(),
                user_code: user_code.clone(),
                interval: self.interval_secs,
                expires_in: self.remaining_secs(now),
            },
        }
    }

    /// The interrupt raised after the server asked to slow down
    pub fn slow_down_kind(&self, now: DateTime<Utc>) -> InterruptKind {
        match &self.flow {
            PendingFlow::Ciba { auth_req_id } => InterruptKind::CibaPolling {
                auth_req_id: auth_req_id.clone(),
                interval: self.interval_secs,
            },
            PendingFlow::Device { .. } => self.pending_kind(now),
        }
    }
}

/// Trait for auth store implementations.
///
/// Keys are chosen by the authorized wrapper, by default the tool call id.
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Save (or replace) a pending authorization.
    async fn save_pending(
        &self,
        key: &str,
        pending: PendingAuthorization,
    ) -> Result<(), AuthStoreError>;

    /// Load a pending authorization.
    async fn load_pending(&self, key: &str) -> Result<Option<PendingAuthorization>, AuthStoreError>;

    /// Remove a pending authorization.
    ///
    /// Returns `true` if one was removed.
    async fn remove_pending(&self, key: &str) -> Result<bool, AuthStoreError>;

    /// All pending authorizations with their keys.
    async fn list_pending(&self) -> Result<Vec<(String, PendingAuthorization)>, AuthStoreError>;

    /// Park a credential for a later invocation.
    async fn save_credential(&self, key: &str, credential: Credential)
        -> Result<(), AuthStoreError>;

    /// Remove and return a parked credential. Each credential is consumed once.
    async fn take_credential(&self, key: &str) -> Result<Option<Credential>, AuthStoreError>;

    /// Like [`AuthStore::take_credential`], but an expired credential is
    /// discarded and reported as absent.
    async fn take_live_credential(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Credential>, AuthStoreError> {
        match self.take_credential(key).await? {
            Some(credential) if credential.is_expired(now) => {
                log::debug!("discarding expired credential parked under {}", key);
                Ok(None)
            }
            other => Ok(other),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    pending: HashMap<String, PendingAuthorization>,
    #[serde(default)]
    credentials: HashMap<String, Credential>,
}

/// In-memory auth store.
///
/// Cleared when the process exits.
#[derive(Default)]
pub struct MemoryAuthStore {
    state: RwLock<StoreState>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStore for MemoryAuthStore {
    async fn save_pending(
        &self,
        key: &str,
        pending: PendingAuthorization,
    ) -> Result<(), AuthStoreError> {
        self.state.write().pending.insert(key.to_string(), pending);
        Ok(())
    }

    async fn load_pending(&self, key: &str) -> Result<Option<PendingAuthorization>, AuthStoreError> {
        Ok(self.state.read().pending.get(key).cloned())
    }

    async fn remove_pending(&self, key: &str) -> Result<bool, AuthStoreError> {
        Ok(self.state.write().pending.remove(key).is_some())
    }

    async fn list_pending(&self) -> Result<Vec<(String, PendingAuthorization)>, AuthStoreError> {
        Ok(self
            .state
            .read()
            .pending
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn save_credential(
        &self,
        key: &str,
        credential: Credential,
    ) -> Result<(), AuthStoreError> {
        self.state
            .write()
            .credentials
            .insert(key.to_string(), credential);
        Ok(())
    }

    async fn take_credential(&self, key: &str) -> Result<Option<Credential>, AuthStoreError> {
        Ok(self.state.write().credentials.remove(key))
    }
}

/// File-based auth store.
///
/// State is persisted to a JSON file, created on first write. The file
/// holds live access tokens; put it somewhere only the host can read.
pub struct FileAuthStore {
    path: PathBuf,
    cache: RwLock<Option<StoreState>>,
}

impl FileAuthStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    fn ensure_loaded(&self) -> Result<(), AuthStoreError> {
        let mut cache = self.cache.write();
        if cache.is_some() {
            return Ok(());
        }

        let state = if self.path.exists() {
            let contents = std::fs::read_to_string(&self.path)?;
            if contents.trim().is_empty() {
                StoreState::default()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            StoreState::default()
        };

        *cache = Some(state);
        Ok(())
    }

    fn flush(&self) -> Result<(), AuthStoreError> {
        let cache = self.cache.read();
        if let Some(ref state) = *cache {
            if let Some(parent) = self.path.parent() {
                if !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let json = serde_json::to_string_pretty(state)?;
            std::fs::write(&self.path, json)?;
        }
        Ok(())
    }

    /// Run `f` against the loaded state, flushing afterwards if it reports a change
    fn update<T>(&self, f: impl FnOnce(&mut StoreState) -> (T, bool)) -> Result<T, AuthStoreError> {
        self.ensure_loaded()?;
        let (value, changed) = {
            let mut cache = self.cache.write();
            let state = cache.get_or_insert_with(StoreState::default);
            f(state)
        };
        if changed {
            self.flush()?;
        }
        Ok(value)
    }

    fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> Result<T, AuthStoreError> {
        self.ensure_loaded()?;
        let cache = self.cache.read();
        let state = cache
            .as_ref()
            .ok_or_else(|| AuthStoreError::Read("auth store cache not loaded".to_string()))?;
        Ok(f(state))
    }
}

#[async_trait]
impl AuthStore for FileAuthStore {
    async fn save_pending(
        &self,
        key: &str,
        pending: PendingAuthorization,
    ) -> Result<(), AuthStoreError> {
        self.update(|state| {
            state.pending.insert(key.to_string(), pending);
            ((), true)
        })
    }

    async fn load_pending(&self, key: &str) -> Result<Option<PendingAuthorization>, AuthStoreError> {
        self.read(|state| state.pending.get(key).cloned())
    }

    async fn remove_pending(&self, key: &str) -> Result<bool, AuthStoreError> {
        self.update(|state| {
            let removed = state.pending.remove(key).is_some();
            (removed, removed)
        })
    }

    async fn list_pending(&self) -> Result<Vec<(String, PendingAuthorization)>, AuthStoreError> {
        self.read(|state| {
            state
                .pending
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
    }

    async fn save_credential(
        &self,
        key: &str,
        credential: Credential,
    ) -> Result<(), AuthStoreError> {
        self.update(|state| {
            state.credentials.insert(key.to_string(), credential);
            ((), true)
        })
    }

    async fn take_credential(&self, key: &str) -> Result<Option<Credential>, AuthStoreError> {
        self.update(|state| {
            let credential = state.credentials.remove(key);
            let changed = credential.is_some();
            (credential, changed)
        })
    }
}
