//! Google Photos Picker sessions.
//!
//! The picker replaces library search for accounts without Library API
//! access: a session is created remotely, the user selects photos on
//! Google's own page, and the engine polls until the selection is done.
//!
//! ```text
//! Created ──open──▶ Polling ──mediaItemsSet──▶ Completed
//!                      │
//!                      ├──budget exceeded──▶ Expired
//!                      └──fetch error──────▶ Failed
//! ```
//!
//! Sessions are remote resources: [`PickerSessionEngine::close`] must run when
//! the consuming view goes away, whatever state the session reached.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use photolink_core::{MediaItem, MediaSource};
use reqwest::Method;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};

use super::client::PhotosClient;
use super::oauth::{BrowserLauncher, BrowserWindow};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10 * 60);
const ITEMS_PAGE_SIZE: u32 = 100;
const FALLBACK_PRODUCT_URL: &str = "https://photos.google.com/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerState {
    Created,
    Polling,
    Completed,
    Expired,
    Failed,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingConfig {
    #[serde(default)]
    pub poll_interval: Option<String>,
    #[serde(default)]
    pub timeout_in: Option<String>,
}

/// A remote picker session as returned by create and status calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickerSession {
    pub id: String,
    pub picker_uri: String,
    #[serde(default)]
    pub polling_config: PollingConfig,
    #[serde(default)]
    pub media_items_set: bool,
    #[serde(default)]
    pub expire_time: Option<DateTime<Utc>>,
}

impl PickerSession {
    /// Server-hinted poll interval, 5s when absent or unparseable.
    pub fn poll_interval(&self) -> Duration {
        self.polling_config
            .poll_interval
            .as_deref()
            .and_then(parse_duration)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    pub fn timeout_in(&self) -> Option<Duration> {
        self.polling_config
            .timeout_in
            .as_deref()
            .and_then(parse_duration)
    }
}

/// Parses a protobuf-style duration string such as `"5s"` or `"0.25s"`.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().strip_suffix('s')?.parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PickedItemsResponse {
    #[serde(default)]
    media_items: Vec<PickedItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PickedItem {
    id: String,
    #[serde(default)]
    create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    media_file: Option<PickedFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PickedFile {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    filename: Option<String>,
}

impl PickedItem {
    fn into_media_item(self) -> Option<MediaItem> {
        let file = self.media_file.unwrap_or_default();
        let Some(base_url) = file.base_url.filter(|u| !u.is_empty()) else {
            warn!("picked item {} has no base URL, skipping", self.id);
            return None;
        };
        Some(MediaItem {
            description: None,
            product_url: FALLBACK_PRODUCT_URL.to_string(),
            base_url,
            mime_type: file.mime_type.unwrap_or_else(|| "image/jpeg".to_string()),
            creation_time: self.create_time.unwrap_or_else(Utc::now),
            original_filename: file.filename,
            source: MediaSource::Picker,
            id: self.id,
        })
    }
}

/// Drives one picker session from creation to teardown.
pub struct PickerSessionEngine {
    client: Arc<PhotosClient>,
    browser: Arc<dyn BrowserLauncher>,
    session: Option<PickerSession>,
    window: Option<Box<dyn BrowserWindow>>,
    state: PickerState,
    max_wait: Duration,
}

impl std::fmt::Debug for PickerSessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PickerSessionEngine")
            .field("session", &self.session.as_ref().map(|s| &s.id))
            .field("state", &self.state)
            .field("window_open", &self.window.is_some())
            .finish()
    }
}

impl PickerSessionEngine {
    pub fn new(client: Arc<PhotosClient>, browser: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            client,
            browser,
            session: None,
            window: None,
            state: PickerState::Created,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn state(&self) -> PickerState {
        self.state
    }

    pub fn session(&self) -> Option<&PickerSession> {
        self.session.as_ref()
    }

    fn picker_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.client
                .auth()
                .config()
                .endpoints
                .picker_api
                .trim_end_matches('/'),
            endpoint
        )
    }

    fn session_id(&self) -> ProviderResult<String> {
        self.session
            .as_ref()
            .map(|s| s.id.clone())
            .ok_or_else(|| ProviderError::internal("no picker session has been created"))
    }

    /// Creates the remote session.
    pub async fn create(&mut self) -> ProviderResult<&PickerSession> {
        let body = serde_json::json!({});
        let session: PickerSession = self
            .client
            .request_with_retry(Method::POST, &self.picker_url("sessions"), Some(&body))
            .await?;
        info!("created picker session {}", session.id);
        self.state = PickerState::Created;
        Ok(&*self.session.insert(session))
    }

    /// Opens the picker page. The engine does not wait on the browser.
    pub fn open(&mut self) -> ProviderResult<()> {
        let uri = self
            .session
            .as_ref()
            .map(|s| s.picker_uri.clone())
            .ok_or_else(|| ProviderError::internal("no picker session has been created"))?;
        let window = self.browser.open(&uri)?;
        self.window = Some(window);
        Ok(())
    }

    /// Polls the session until the user is done or the wait budget runs out.
    pub async fn poll(&mut self) -> ProviderResult<PickerState> {
        let id = self.session_id()?;
        let url = self.picker_url(&format!("sessions/{}", urlencoding::encode(&id)));

        let budget = self
            .session
            .as_ref()
            .and_then(PickerSession::timeout_in)
            .map_or(self.max_wait, |t| t.min(self.max_wait));
        let deadline = Instant::now() + budget;
        self.state = PickerState::Polling;

        loop {
            let interval = self
                .session
                .as_ref()
                .map_or(DEFAULT_POLL_INTERVAL, PickerSession::poll_interval);
            if Instant::now() + interval > deadline {
                warn!("picker session {} expired after {:?}", id, budget);
                self.state = PickerState::Expired;
                return Ok(self.state);
            }
            tokio::time::sleep(interval).await;

            let status: PickerSession =
                match self.client.request_with_retry(Method::GET, &url, None).await {
                    Ok(status) => status,
                    Err(e) => {
                        warn!("polling picker session {} failed: {}", id, e);
                        self.state = PickerState::Failed;
                        return Err(e);
                    }
                };
            let done = status.media_items_set;
            self.session = Some(status);
            if done {
                debug!("picker session {} has a selection", id);
                self.state = PickerState::Completed;
                return Ok(self.state);
            }
        }
    }

    /// Lists the picked items, following page tokens.
    pub async fn list_items(&self) -> ProviderResult<Vec<MediaItem>> {
        let id = self.session_id()?;
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!(
                "{}?sessionId={}&pageSize={ITEMS_PAGE_SIZE}",
                self.picker_url("mediaItems"),
                urlencoding::encode(&id)
            );
            if let Some(token) = &page_token {
                url.push_str("&pageToken=");
                url.push_str(&urlencoding::encode(token));
            }

            let page: PickedItemsResponse =
                self.client.request_with_retry(Method::GET, &url, None).await?;
            items.extend(
                page.media_items
                    .into_iter()
                    .filter_map(PickedItem::into_media_item),
            );

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!("picker session {} returned {} items", id, items.len());
        Ok(items)
    }

    /// Create, open, poll and list in one go. Returns no items unless the
    /// session completed.
    pub async fn run(&mut self) -> ProviderResult<Vec<MediaItem>> {
        self.create().await?;
        if let Err(e) = self.open() {
            let uri = self
                .session
                .as_ref()
                .map(|s| s.picker_uri.as_str())
                .unwrap_or_default();
            warn!("failed to open picker: {}", e);
            eprintln!("Open this URL to pick photos:\n\n  {uri}\n");
        }
        match self.poll().await? {
            PickerState::Completed => self.list_items().await,
            _ => Ok(Vec::new()),
        }
    }

    /// Deletes the remote session and closes the picker window. Failures are
    /// logged only.
    pub async fn close(&mut self) {
        if let Some(mut window) = self.window.take() {
            window.close();
        }
        let Some(session) = self.session.take() else {
            return;
        };
        let url = self.picker_url(&format!("sessions/{}", urlencoding::encode(&session.id)));
        match self
            .client
            .request_with_retry::<serde_json::Value>(Method::DELETE, &url, None)
            .await
        {
            Ok(_) => debug!("deleted picker session {}", session.id),
            Err(e) => warn!("failed to delete picker session {}: {}", session.id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::config::{AuthStrategy, GoogleConfig, GoogleEndpoints, OAuthCredentials};
    use crate::google::oauth::AuthEngine;
    use crate::google::tokens::{Credentials, TokenStore};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct TrackingBrowser {
        opened: Mutex<Vec<String>>,
        closed: Arc<AtomicBool>,
    }

    struct TrackedWindow(Arc<AtomicBool>);
    impl BrowserWindow for TrackedWindow {
        fn close(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    impl BrowserLauncher for TrackingBrowser {
        fn open(&self, url: &str) -> ProviderResult<Box<dyn BrowserWindow>> {
            self.opened.lock().unwrap().push(url.to_string());
            Ok(Box::new(TrackedWindow(self.closed.clone())))
        }
    }

    fn client(server: &MockServer) -> Arc<PhotosClient> {
        let config = GoogleConfig::new(OAuthCredentials::new("id", "secret"))
            .with_strategy(AuthStrategy::Proxy {
                redirect_uri: "https://relay.example/".into(),
                exchange_url: None,
            })
            .with_picker_scope()
            .with_endpoints(GoogleEndpoints::rooted_at(&server.uri()))
            .in_memory_tokens();
        let tokens = Arc::new(TokenStore::in_memory(Credentials {
            access_token: Some("ok".into()),
            refresh_token: None,
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        }));
        let auth = AuthEngine::new(config, tokens).unwrap();
        Arc::new(PhotosClient::new(Arc::new(auth)).unwrap())
    }

    fn session_json(set: bool) -> serde_json::Value {
        serde_json::json!({
            "id": "sess-1",
            "pickerUri": "https://photos.google.com/picker/sess-1",
            "pollingConfig": {"pollInterval": "0.01s", "timeoutIn": "60s"},
            "mediaItemsSet": set
        })
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("0.5s"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("5"), None);
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("-1s"), None);
    }

    #[test]
    fn unparseable_interval_defaults_to_five_seconds() {
        let session: PickerSession = serde_json::from_value(serde_json::json!({
            "id": "x", "pickerUri": "u", "pollingConfig": {"pollInterval": "later"}
        }))
        .unwrap();
        assert_eq!(session.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert!(session.timeout_in().is_none());
        assert!(!session.media_items_set);
    }

    #[test]
    fn picked_item_defaults() {
        let item: PickedItem = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "mediaFile": {"baseUrl": "https://lh3/p1"}
        }))
        .unwrap();
        let media = item.into_media_item().unwrap();
        assert_eq!(media.mime_type, "image/jpeg");
        assert_eq!(media.source, MediaSource::Picker);
        assert_eq!(media.product_url, FALLBACK_PRODUCT_URL);

        let bare: PickedItem = serde_json::from_value(serde_json::json!({"id": "p2"})).unwrap();
        assert!(bare.into_media_item().is_none());
    }

    #[tokio::test]
    async fn runs_until_selection_and_deletes_on_close() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/picker/v1/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json(false)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/picker/v1/sessions/sess-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json(false)))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/picker/v1/sessions/sess-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json(true)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/picker/v1/mediaItems"))
            .and(query_param("sessionId", "sess-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "mediaItems": [{
                    "id": "p1",
                    "createTime": "2024-03-01T08:30:00Z",
                    "type": "PHOTO",
                    "mediaFile": {"baseUrl": "https://lh3/p1", "mimeType": "image/png", "filename": "IMG_1.png"}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/picker/v1/sessions/sess-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let browser = Arc::new(TrackingBrowser::default());
        let mut engine = PickerSessionEngine::new(client(&server), browser.clone());
        let items = engine.run().await.unwrap();

        assert_eq!(engine.state(), PickerState::Completed);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].original_filename.as_deref(), Some("IMG_1.png"));
        assert_eq!(
            *browser.opened.lock().unwrap(),
            vec!["https://photos.google.com/picker/sess-1"]
        );

        engine.close().await;
        assert!(browser.closed.load(Ordering::SeqCst));
        assert!(engine.session().is_none());
    }

    #[tokio::test]
    async fn expires_when_budget_runs_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/picker/v1/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json(false)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/picker/v1/sessions/sess-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json(false)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/picker/v1/mediaItems"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/picker/v1/sessions/sess-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut engine =
            PickerSessionEngine::new(client(&server), Arc::new(TrackingBrowser::default()))
                .with_max_wait(Duration::from_millis(100));
        let items = engine.run().await.unwrap();
        assert!(items.is_empty());
        assert_eq!(engine.state(), PickerState::Expired);
        engine.close().await;
    }

    #[tokio::test]
    async fn poll_error_fails_session_but_close_still_deletes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/picker/v1/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json(false)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/picker/v1/sessions/sess-1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/picker/v1/sessions/sess-1"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let mut engine =
            PickerSessionEngine::new(client(&server), Arc::new(TrackingBrowser::default()));
        assert!(engine.run().await.is_err());
        assert_eq!(engine.state(), PickerState::Failed);
        engine.close().await;
    }

    #[tokio::test]
    async fn picked_items_are_paginated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/picker/v1/mediaItems"))
            .and(query_param("pageToken", "t2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "mediaItems": [{"id": "b", "mediaFile": {"baseUrl": "https://lh3/b"}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/picker/v1/mediaItems"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "mediaItems": [{"id": "a", "mediaFile": {"baseUrl": "https://lh3/a"}}],
                "nextPageToken": "t2"
            })))
            .mount(&server)
            .await;

        let mut engine =
            PickerSessionEngine::new(client(&server), Arc::new(TrackingBrowser::default()));
        engine.session = Some(serde_json::from_value(session_json(true)).unwrap());
        let ids: Vec<_> = engine
            .list_items()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
