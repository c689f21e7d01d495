//! Google Photos provider configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// OAuth 2.0 client credentials from the Google Cloud Console.
#[derive(Debug, Clone, Default)]
pub struct OAuthCredentials {
    pub client_id: String,
    /// May be empty when a proxy performs the token exchange.
    pub client_secret: String,
}

/// The JSON file downloaded from the Cloud Console, either nested under
/// `installed`/`web` or flat.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("failed to read credentials file: {e}"))?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: CredentialsFile = serde_json::from_str(json)
            .map_err(|e| format!("failed to parse credentials JSON: {e}"))?;

        if let Some(creds) = file.installed.or(file.web) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }
        match (file.client_id, file.client_secret) {
            (Some(id), Some(secret)) => Ok(Self::new(id, secret)),
            _ => Err(
                "credentials file must contain an 'installed'/'web' section or top-level 'client_id'/'client_secret'"
                    .to_string(),
            ),
        }
    }
}

/// How the interactive part of authentication reaches the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Show the consent page on a host-provided surface and read the
    /// redirected URL back from it.
    Direct {
        /// Registered redirect URI; the browser will fail to load it, which
        /// is fine because only its query string is needed.
        redirect_uri: String,
    },
    /// Open the consent page in the default browser. Google redirects to a
    /// hosted relay page which hands the code back through the
    /// `photolink auth callback` URI handler, out of band.
    Proxy {
        redirect_uri: String,
        /// When set, codes and refresh tokens are exchanged through this
        /// service (which holds the client secret) instead of Google.
        exchange_url: Option<String>,
    },
    /// Listen on an ephemeral `127.0.0.1` port for the redirect.
    #[default]
    Loopback,
}

/// Remote endpoints; overridable so tests can point at a mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleEndpoints {
    pub auth_url: String,
    pub token_url: String,
    /// Photos Library API base (`.../v1`).
    pub library_api: String,
    /// Photos Picker API base (`.../v1`).
    pub picker_api: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            library_api: "https://photoslibrary.googleapis.com/v1".to_string(),
            picker_api: "https://photospicker.googleapis.com/v1".to_string(),
        }
    }
}

impl GoogleEndpoints {
    /// All endpoints rooted at one base URL (`{base}/token`, `{base}/v1`, ...).
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            auth_url: format!("{base}/auth"),
            token_url: format!("{base}/token"),
            library_api: format!("{base}/v1"),
            picker_api: format!("{base}/picker/v1"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub credentials: OAuthCredentials,
    pub strategy: AuthStrategy,
    pub scopes: Vec<String>,
    /// Where tokens are persisted. `None` keeps them in memory only.
    pub token_path: Option<PathBuf>,
    pub timeout: Duration,
    pub user_agent: String,
    pub endpoints: GoogleEndpoints,
}

impl GoogleConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub const LIBRARY_SCOPE: &'static str =
        "https://www.googleapis.com/auth/photoslibrary.readonly";
    pub const PICKER_SCOPE: &'static str =
        "https://www.googleapis.com/auth/photospicker.mediaitems.readonly";

    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
            strategy: AuthStrategy::default(),
            scopes: vec![Self::LIBRARY_SCOPE.to_string()],
            token_path: Some(Self::default_token_path()),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("photolink/{}", env!("CARGO_PKG_VERSION")),
            endpoints: GoogleEndpoints::default(),
        }
    }

    /// `~/.local/share/photolink/google-tokens.json`
    pub fn default_token_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".local").join("share"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("photolink")
            .join("google-tokens.json")
    }

    pub fn with_strategy(mut self, strategy: AuthStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Adds the picker scope if it is not already requested.
    pub fn with_picker_scope(mut self) -> Self {
        if !self.scopes.iter().any(|s| s == Self::PICKER_SCOPE) {
            self.scopes.push(Self::PICKER_SCOPE.to_string());
        }
        self
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = Some(path.into());
        self
    }

    pub fn in_memory_tokens(mut self) -> Self {
        self.token_path = None;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_endpoints(mut self, endpoints: GoogleEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// True when token exchange goes through a proxy that owns the secret.
    pub fn exchanges_via_proxy(&self) -> bool {
        matches!(
            self.strategy,
            AuthStrategy::Proxy {
                exchange_url: Some(_),
                ..
            }
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.credentials.client_id.trim().is_empty() {
            return Err("client_id is required".to_string());
        }
        if self.credentials.client_secret.trim().is_empty() && !self.exchanges_via_proxy() {
            return Err("client_secret is required unless a token proxy is configured".to_string());
        }
        if self.scopes.is_empty() {
            return Err("at least one OAuth scope is required".to_string());
        }
        match &self.strategy {
            AuthStrategy::Direct { redirect_uri } | AuthStrategy::Proxy { redirect_uri, .. }
                if redirect_uri.trim().is_empty() =>
            {
                Err("redirect_uri is required for this auth strategy".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> OAuthCredentials {
        OAuthCredentials::new("id.apps.googleusercontent.com", "secret")
    }

    #[test]
    fn defaults() {
        let config = GoogleConfig::new(creds());
        assert_eq!(config.strategy, AuthStrategy::Loopback);
        assert_eq!(config.scopes, vec![GoogleConfig::LIBRARY_SCOPE.to_string()]);
        assert!(
            config
                .token_path
                .as_ref()
                .unwrap()
                .ends_with("photolink/google-tokens.json")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn picker_scope_is_added_once() {
        let config = GoogleConfig::new(creds())
            .with_picker_scope()
            .with_picker_scope();
        assert_eq!(config.scopes.len(), 2);
        assert!(config.scopes.contains(&GoogleConfig::PICKER_SCOPE.to_string()));
    }

    #[test]
    fn secret_optional_with_exchange_proxy() {
        let no_secret = OAuthCredentials::new("id", "");
        assert!(GoogleConfig::new(no_secret.clone()).validate().is_err());

        let proxied = GoogleConfig::new(no_secret).with_strategy(AuthStrategy::Proxy {
            redirect_uri: "https://relay.example/".into(),
            exchange_url: Some("https://proxy.example/".into()),
        });
        assert!(proxied.validate().is_ok());
    }

    #[test]
    fn direct_requires_redirect_uri() {
        let config = GoogleConfig::new(creds()).with_strategy(AuthStrategy::Direct {
            redirect_uri: " ".into(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn rooted_endpoints() {
        let endpoints = GoogleEndpoints::rooted_at("http://127.0.0.1:9999/");
        assert_eq!(endpoints.token_url, "http://127.0.0.1:9999/token");
        assert_eq!(endpoints.library_api, "http://127.0.0.1:9999/v1");
        assert_eq!(endpoints.picker_api, "http://127.0.0.1:9999/picker/v1");
    }

    #[test]
    fn credentials_from_json_formats() {
        let nested = r#"{"installed":{"client_id":"a","client_secret":"b","project_id":"p"}}"#;
        let creds = OAuthCredentials::from_json(nested).unwrap();
        assert_eq!((creds.client_id.as_str(), creds.client_secret.as_str()), ("a", "b"));

        let flat = r#"{"client_id":"c","client_secret":"d"}"#;
        assert_eq!(OAuthCredentials::from_json(flat).unwrap().client_id, "c");

        assert!(OAuthCredentials::from_json(r#"{"other":{}}"#).is_err());
        assert!(
            OAuthCredentials::from_json("not json")
                .unwrap_err()
                .contains("parse")
        );
    }
}
