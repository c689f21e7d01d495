//! OAuth token storage.
//!
//! The access token and its expiry always change together under one write
//! lock, so readers never see a new token with an old expiry. When a path is
//! configured every change is written to disk with a temp-file rename.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};

/// Absolute expiry `expires_in` seconds after `now`. Negative lifetimes mean
/// already expired; lifetimes past the end of time are clamped.
fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    Duration::try_seconds(expires_in.max(0))
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// The persisted token set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// A token is only usable strictly before its expiry.
    pub fn has_valid_access_token(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(token), Some(expires_at)) => !token.is_empty() && now < expires_at,
            _ => false,
        }
    }
}

/// What a successful token-endpoint response grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Absent on most refresh responses; the stored one is kept then.
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

#[derive(Debug, Default)]
pub struct TokenStore {
    path: Option<PathBuf>,
    state: RwLock<Credentials>,
}

impl TokenStore {
    /// A store persisted at `path`. Call [`TokenStore::load`] to read it.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            state: RwLock::new(Credentials::default()),
        }
    }

    pub fn in_memory(credentials: Credentials) -> Self {
        Self {
            path: None,
            state: RwLock::new(credentials),
        }
    }

    pub fn with_optional_path(path: Option<PathBuf>) -> Self {
        Self {
            path,
            state: RwLock::new(Credentials::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Credentials> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Credentials> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads tokens from disk. Returns `Ok(false)` if there is nothing to load.
    pub fn load(&self) -> ProviderResult<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        if !path.exists() {
            debug!("no token file at {:?}", path);
            return Ok(false);
        }

        let content = fs::read_to_string(path).map_err(|e| {
            ProviderError::io(format!("failed to read token file: {e}")).with_source(e)
        })?;
        let credentials: Credentials = serde_json::from_str(&content).map_err(|e| {
            ProviderError::configuration(format!("failed to parse token file: {e}"))
        })?;

        info!("loaded tokens from {:?}", path);
        *self.write() = credentials;
        Ok(true)
    }

    fn save(&self, credentials: &Credentials) -> ProviderResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ProviderError::io(format!("failed to create token directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(credentials)
            .map_err(|e| ProviderError::internal(format!("failed to serialize tokens: {e}")))?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content)
            .map_err(|e| ProviderError::io(format!("failed to write token file: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))
                .map_err(|e| ProviderError::io(format!("failed to restrict token file: {e}")))?;
        }

        fs::rename(&temp_path, path)
            .map_err(|e| ProviderError::io(format!("failed to replace token file: {e}")))?;

        debug!("saved tokens to {:?}", path);
        Ok(())
    }

    /// Applies a token grant and persists the result.
    ///
    /// The in-memory state is updated even if persisting fails.
    pub fn apply(&self, grant: TokenGrant) -> ProviderResult<()> {
        let snapshot = {
            let mut state = self.write();
            state.access_token = Some(grant.access_token);
            state.expires_at = Some(expiry_after(Utc::now(), grant.expires_in));
            if let Some(refresh) = grant.refresh_token.filter(|t| !t.is_empty()) {
                state.refresh_token = Some(refresh);
            }
            state.clone()
        };
        self.save(&snapshot)
    }

    /// Forgets a refresh token the server no longer accepts.
    pub fn clear_refresh_token(&self) -> ProviderResult<()> {
        let snapshot = {
            let mut state = self.write();
            state.refresh_token = None;
            state.clone()
        };
        self.save(&snapshot)
    }

    /// Drops all tokens, in memory and on disk.
    pub fn clear(&self) -> ProviderResult<()> {
        *self.write() = Credentials::default();
        if let Some(path) = &self.path {
            if path.exists() {
                fs::remove_file(path)
                    .map_err(|e| ProviderError::io(format!("failed to remove token file: {e}")))?;
                info!("cleared tokens from {:?}", path);
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Credentials {
        self.read().clone()
    }

    pub fn has_valid_access_token(&self) -> bool {
        self.read().has_valid_access_token(Utc::now())
    }

    /// The access token if it has not expired.
    pub fn access_token(&self) -> Option<String> {
        let state = self.read();
        state
            .has_valid_access_token(Utc::now())
            .then(|| state.access_token.clone())
            .flatten()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone().filter(|t| !t.is_empty())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
