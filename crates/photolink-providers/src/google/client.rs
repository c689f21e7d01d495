//! Google Photos Library API client.
//!
//! Every call goes through [`PhotosClient::request`], which makes sure a
//! fresh token is attached and classifies the response:
//!
//! | status | outcome |
//! |---|---|
//! | 200 | parsed body |
//! | 400 | `MalformedInput` with the server's message |
//! | 401 | re-authenticate: `Retry` on success, `Unauthenticated` otherwise |
//! | other | `UnknownStatus` |
//!
//! A `401` on an [`Attempt::Retried`] request is `Unauthenticated` straight
//! away.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use photolink_core::{Album, MediaItem, MediaPage, MediaSource, SearchQuery};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::provider::{Attempt, BoxFuture, PhotoSource};

use super::oauth::AuthEngine;

const ALBUM_PAGE_SIZE: u32 = 50;

/// Authenticated client for the Library API (and the transport used by the
/// picker engine).
#[derive(Debug)]
pub struct PhotosClient {
    auth: Arc<AuthEngine>,
    http_client: reqwest::Client,
}

impl PhotosClient {
    pub fn new(auth: Arc<AuthEngine>) -> ProviderResult<Self> {
        let config = auth.config();
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                ProviderError::configuration(format!("failed to create HTTP client: {e}"))
            })?;
        Ok(Self { auth, http_client })
    }

    pub fn auth(&self) -> &Arc<AuthEngine> {
        &self.auth
    }

    fn library_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.auth.config().endpoints.library_api.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Returns a usable access token, authenticating first if needed.
    async fn access_token(&self) -> ProviderResult<String> {
        if let Some(token) = self.auth.tokens().access_token() {
            return Ok(token);
        }
        debug!("access token missing or expired, authenticating");
        if !self.auth.authenticate().await {
            return Err(ProviderError::unauthenticated("authentication failed"));
        }
        self.auth
            .tokens()
            .access_token()
            .ok_or_else(|| ProviderError::unauthenticated("no access token after authentication"))
    }

    /// Sends one authorized request and classifies the response.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        attempt: Attempt,
    ) -> ProviderResult<T> {
        let token = self.access_token().await?;

        let mut request = self
            .http_client
            .request(method.clone(), url)
            .bearer_auth(&token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response: {e}")))?;

        match status {
            StatusCode::OK => {
                let text = if text.trim().is_empty() { "{}" } else { &text };
                serde_json::from_str(text).map_err(|e| {
                    ProviderError::invalid_response(format!("failed to parse response: {e}"))
                })
            }
            StatusCode::BAD_REQUEST => Err(ProviderError::malformed_input(error_message(&text))),
            StatusCode::UNAUTHORIZED => {
                if attempt == Attempt::Retried {
                    return Err(ProviderError::unauthenticated(
                        "access token rejected after re-authentication",
                    )
                    .with_status(401));
                }
                debug!("{} {} returned 401, re-authenticating", method, url);
                if self.auth.authenticate().await {
                    Err(ProviderError::retry("access token renewed"))
                } else {
                    Err(ProviderError::unauthenticated("re-authentication failed").with_status(401))
                }
            }
            other => Err(ProviderError::unknown_status(
                other.as_u16(),
                error_message(&text),
            )),
        }
    }

    /// [`PhotosClient::request`] with the single permitted re-send on `Retry`.
    pub async fn request_with_retry<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> ProviderResult<T> {
        match self.request(method.clone(), url, body, Attempt::First).await {
            Err(e) if e.code() == ProviderErrorCode::Retry => {
                self.request(method, url, body, Attempt::Retried).await
            }
            other => other,
        }
    }

    /// One page of `mediaItems:search`.
    pub async fn media_search(
        &self,
        query: &SearchQuery,
        attempt: Attempt,
    ) -> ProviderResult<MediaPage> {
        let body = serde_json::to_value(query)
            .map_err(|e| ProviderError::internal(format!("failed to encode query: {e}")))?;
        let url = self.library_url("mediaItems:search");
        let response: SearchResponse = self
            .request(Method::POST, &url, Some(&body), attempt)
            .await?;

        let items: Vec<MediaItem> = response
            .media_items
            .into_iter()
            .filter_map(|item| item.into_media_item(MediaSource::Library))
            .collect();
        debug!("search returned {} items", items.len());

        Ok(MediaPage {
            items,
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    /// All albums, owned first, then shared albums not already listed.
    pub async fn list_albums(&self) -> ProviderResult<Vec<Album>> {
        let mut albums: Vec<Album> = Vec::new();
        let mut shared: Vec<Album> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!("{}?pageSize={ALBUM_PAGE_SIZE}", self.library_url("albums"));
            if let Some(token) = &page_token {
                url.push_str("&pageToken=");
                url.push_str(&urlencoding::encode(token));
            }

            let page: AlbumsResponse = self.request_with_retry(Method::GET, &url, None).await?;
            albums.extend(page.albums.into_iter().map(|a| a.into_album(false)));
            shared.extend(page.shared_albums.into_iter().map(|a| a.into_album(true)));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        for album in shared {
            if !albums.iter().any(|a| a.id == album.id) {
                albums.push(album);
            }
        }
        debug!("listed {} albums", albums.len());
        Ok(albums)
    }

    /// Fetches a thumbnail sized to fit `width` x `height`.
    ///
    /// Picker items only serve bytes to the token that picked them.
    pub async fn download(
        &self,
        item: &MediaItem,
        width: u32,
        height: u32,
    ) -> ProviderResult<Vec<u8>> {
        let url = item.sized_url(width, height);
        let mut request = self.http_client.get(&url);
        if item.requires_bearer() {
            request = request.bearer_auth(self.access_token().await?);
        }

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::unknown_status(
                status.as_u16(),
                format!("thumbnail download failed: {}", error_message(&body)),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read thumbnail: {e}")))?;
        debug!("downloaded {} bytes for {}", bytes.len(), item.id);
        Ok(bytes.to_vec())
    }
}

impl PhotoSource for PhotosClient {
    fn name(&self) -> &str {
        "google-photos"
    }

    fn search(
        &self,
        query: SearchQuery,
        attempt: Attempt,
    ) -> BoxFuture<'_, ProviderResult<MediaPage>> {
        Box::pin(async move { self.media_search(&query, attempt).await })
    }
}

/// Pulls `error.message` out of a Google error body, or returns it verbatim.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    media_items: Vec<ApiMediaItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiMediaMetadata {
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMediaItem {
    id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    product_url: Option<String>,
    base_url: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    media_metadata: ApiMediaMetadata,
    #[serde(default)]
    filename: Option<String>,
}

impl ApiMediaItem {
    fn into_media_item(self, source: MediaSource) -> Option<MediaItem> {
        let Some(creation_time) = self.media_metadata.creation_time else {
            warn!("media item {} has no creation time, skipping", self.id);
            return None;
        };
        Some(MediaItem {
            product_url: self.product_url.unwrap_or_default(),
            description: self.description.filter(|d| !d.is_empty()),
            base_url: self.base_url,
            mime_type: self.mime_type.unwrap_or_else(|| "image/jpeg".to_string()),
            creation_time,
            original_filename: self.filename,
            source,
            id: self.id,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbumsResponse {
    #[serde(default)]
    albums: Vec<ApiAlbum>,
    #[serde(default)]
    shared_albums: Vec<ApiAlbum>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAlbum {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    product_url: Option<String>,
    /// int64 fields arrive as JSON strings.
    #[serde(default)]
    media_items_count: Option<String>,
    #[serde(default)]
    cover_photo_base_url: Option<String>,
}

impl ApiAlbum {
    fn into_album(self, shared: bool) -> Album {
        Album {
            title: self.title.unwrap_or_else(|| "Untitled album".to_string()),
            product_url: self.product_url,
            media_items_count: self.media_items_count.and_then(|c| c.parse().ok()),
            cover_photo_base_url: self.cover_photo_base_url,
            shared,
            id: self.id,
        }
    }
}
