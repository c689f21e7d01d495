//! Wiring shared by the commands: token store, auth engine, API client.

use std::sync::Arc;

use photolink_providers::google::{AuthEngine, GoogleConfig, PhotosClient, TokenStore};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::terminal::TerminalConsent;

/// Builds an authenticated-on-demand API client from provider settings.
///
/// Stored tokens are loaded up front; a token file that cannot be read is
/// reported and treated as signed out.
pub fn photos_client(google: GoogleConfig) -> ClientResult<Arc<PhotosClient>> {
    let tokens = Arc::new(TokenStore::with_optional_path(google.token_path.clone()));
    match tokens.load() {
        Ok(true) => debug!("loaded stored tokens"),
        Ok(false) => debug!("no stored tokens"),
        Err(e) => warn!("ignoring unreadable token file: {}", e),
    }

    let auth = AuthEngine::new(google, tokens)?.with_consent_prompt(Arc::new(TerminalConsent));
    Ok(Arc::new(PhotosClient::new(Arc::new(auth))?))
}

/// [`photos_client`] for the `[google]` section of `config`.
pub fn connect(config: &ClientConfig) -> ClientResult<Arc<PhotosClient>> {
    photos_client(config.google.to_provider_config()?)
}
