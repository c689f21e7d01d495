//! Google Photos integration.
//!
//! - [`AuthEngine`] acquires and refreshes OAuth tokens (direct, proxy or
//!   loopback strategy) and keeps them in a [`TokenStore`].
//! - [`PhotosClient`] talks to the Library API: media search, albums and
//!   thumbnail downloads, re-authenticating on `401`.
//! - [`PickerSessionEngine`] drives a Picker API session for accounts that
//!   select photos on Google's own page.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use photolink_providers::google::{AuthEngine, GoogleConfig, OAuthCredentials, PhotosClient, TokenStore};
//!
//! let config = GoogleConfig::new(OAuthCredentials::new("id.apps.googleusercontent.com", "secret"));
//! let tokens = Arc::new(TokenStore::with_optional_path(config.token_path.clone()));
//! tokens.load()?;
//! let auth = Arc::new(AuthEngine::new(config, tokens)?);
//! let client = PhotosClient::new(auth)?;
//! let page = client.media_search(&SearchQuery::all(), Attempt::First).await?;
//! ```

mod client;
mod config;
mod oauth;
mod picker;
mod tokens;

pub use client::PhotosClient;
pub use config::{AuthStrategy, GoogleConfig, GoogleEndpoints, OAuthCredentials};
pub use oauth::{
    AuthEngine, AuthorizationCode, BrowserLauncher, BrowserWindow, ConsentPrompt, PkceFlow,
    SystemBrowser,
};
pub use picker::{PickerSession, PickerSessionEngine, PickerState, PollingConfig, parse_duration};
pub use tokens::{Credentials, TokenGrant, TokenStore};
