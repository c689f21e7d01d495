//! Client configuration.
//!
//! All settings live in a single `config.toml` at
//! `~/.config/photolink/config.toml` by default:
//!
//! ```toml
//! vault = "~/Notes"
//!
//! [google]
//! client_id = "pass::google/photolink-id"
//! client_secret = "env::PHOTOLINK_SECRET"
//! strategy = "loopback"
//!
//! [thumbnails]
//! width = 400
//! height = 280
//!
//! [location]
//! option = "subfolder"
//! subfolder = "photos"
//!
//! [dates]
//! source = "note-title"
//! format = "YYYY-MM-DD"
//! ```
//!
//! Credential values support secret references, see [`crate::secret`].

use std::path::{Path, PathBuf};

use photolink_core::{DEFAULT_TEMPLATE, DateSettings, LocationPolicy};
use photolink_providers::google::{AuthStrategy, GoogleConfig, OAuthCredentials};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};
use crate::secret::SecretRef;

pub const DEFAULT_FILENAME_FORMAT: &str = "YYYY-MM-DD[_google-photo_]HHmmss[.jpg]";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Root directory of the notes vault.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault: Option<PathBuf>,
    pub google: GoogleSettings,
    pub thumbnails: ThumbnailSettings,
    pub location: LocationPolicy,
    pub dates: DateSettings,
}

/// Thumbnail size, file naming and the text inserted into the note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailSettings {
    pub width: u32,
    pub height: u32,
    /// moment.js format applied to the photo's creation time.
    pub filename_format: String,
    pub template: String,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            width: 400,
            height: 280,
            filename_format: DEFAULT_FILENAME_FORMAT.to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Direct,
    Proxy,
    #[default]
    Loopback,
}

/// Google account settings. Credentials support `pass::` / `env::` references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub strategy: StrategyKind,
    /// Redirect URI registered for the direct and proxy strategies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    /// Token exchange service for the proxy strategy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_path: Option<PathBuf>,
    /// Request the Picker API scope as well.
    pub picker: bool,
}

impl GoogleSettings {
    /// Resolves the configured credentials, expanding secret references.
    pub fn resolve_credentials(&self) -> ClientResult<OAuthCredentials> {
        let raw_id = self.client_id.as_deref().ok_or_else(|| {
            ClientError::Config(format!(
                "Google credentials not found. Add to {}:\n  \
                 [google]\n  \
                 client_id = \"YOUR_ID.apps.googleusercontent.com\"\n  \
                 client_secret = \"YOUR_SECRET\"\n\n  \
                 Or run: photolink auth --credentials-file <path>",
                ClientConfig::default_path().display()
            ))
        })?;
        let client_id = SecretRef::parse(raw_id)
            .resolve()
            .map_err(|e| ClientError::Config(format!("failed to resolve client_id: {e}")))?;

        // A token proxy holds the secret, so it may be absent then.
        let client_secret = match self.client_secret.as_deref() {
            Some(raw) => SecretRef::parse(raw)
                .resolve()
                .map_err(|e| ClientError::Config(format!("failed to resolve client_secret: {e}")))?,
            None if self.exchange_url.is_some() => String::new(),
            None => {
                return Err(ClientError::Config(
                    "client_secret is missing from the [google] section".to_string(),
                ));
            }
        };

        Ok(OAuthCredentials::new(client_id, client_secret))
    }

    pub fn auth_strategy(&self) -> ClientResult<AuthStrategy> {
        let redirect_uri = || {
            self.redirect_uri.clone().ok_or_else(|| {
                ClientError::Config(format!(
                    "redirect_uri is required for the {:?} strategy",
                    self.strategy
                ))
            })
        };
        Ok(match self.strategy {
            StrategyKind::Loopback => AuthStrategy::Loopback,
            StrategyKind::Direct => AuthStrategy::Direct {
                redirect_uri: redirect_uri()?,
            },
            StrategyKind::Proxy => AuthStrategy::Proxy {
                redirect_uri: redirect_uri()?,
                exchange_url: self.exchange_url.clone(),
            },
        })
    }

    /// Builds the provider configuration.
    pub fn to_provider_config(&self) -> ClientResult<GoogleConfig> {
        self.provider_config_with(self.resolve_credentials()?)
    }

    /// Builds the provider configuration around explicitly given credentials.
    pub fn provider_config_with(&self, credentials: OAuthCredentials) -> ClientResult<GoogleConfig> {
        let mut config = GoogleConfig::new(credentials).with_strategy(self.auth_strategy()?);
        if self.picker {
            config = config.with_picker_scope();
        }
        if let Some(path) = &self.token_path {
            config = config.with_token_path(path);
        }
        config.validate().map_err(ClientError::Config)?;
        Ok(config)
    }
}

impl ClientConfig {
    /// Loads the default file, or defaults if it does not exist.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            debug!("no config file at {}", path.display());
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| ClientError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("photolink")
            .join("config.toml")
    }

    /// The vault root, falling back to the current directory.
    pub fn vault_root(&self) -> PathBuf {
        self.vault.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Writes `client_id`/`client_secret` into the `[google]` table of the file
/// at `path`, keeping everything else in it as it was.
pub fn save_credentials(path: &Path, client_id: &str, client_secret: &str) -> ClientResult<()> {
    let content = if path.exists() {
        std::fs::read_to_string(path)?
    } else {
        String::new()
    };

    let mut doc = content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| ClientError::Config(format!("could not parse {}: {e}", path.display())))?;

    if !doc.contains_key("google") {
        doc["google"] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    let google = doc["google"]
        .as_table_mut()
        .ok_or_else(|| ClientError::Config("[google] is not a table".to_string()))?;
    google["client_id"] = toml_edit::value(client_id);
    if !client_secret.is_empty() {
        google["client_secret"] = toml_edit::value(client_secret);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, doc.to_string())?;
    info!("credentials saved to {}", path.display());
    Ok(())
}
