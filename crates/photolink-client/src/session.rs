//! The thumbnail fetch loop.
//!
//! A [`FetchSession`] pages through a [`PhotoSource`] and appends results to
//! a [`RenderSink`] while the viewport is close to the end of the grid.
//!
//! - Only one loop runs at a time. [`FetchSession::fetch_more`] while a loop
//!   is in flight returns [`FetchOutcome::Busy`] immediately; callers
//!   re-trigger on the next scroll event instead of queueing.
//! - [`FetchSession::reset`] bumps a generation counter. A loop that started
//!   under an older generation drops whatever it receives afterwards, so a
//!   late page can never land in the new grid.
//! - `active == false` is terminal until the next reset.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use photolink_core::SearchQuery;
use photolink_providers::{Attempt, PhotoSource, ProviderErrorCode};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::host::{Notifier, RenderSink, Viewport};

/// Fetch once the remaining scroll distance drops below this many rows.
pub const NEAR_BOTTOM_ROWS: f64 = 5.0;

pub const NO_RESULTS_MESSAGE: &str = "No photos found for this query.";
pub const AUTH_FAILED_MESSAGE: &str = "Failed to authenticate";

/// Result of one [`FetchSession::fetch_more`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The loop ran; this many pages were rendered.
    Fetched(usize),
    /// Another loop was in flight.
    Busy,
    /// Deactivated, or no more results.
    Idle,
    /// The session was reset while the loop was waiting on the network.
    Superseded,
}

#[derive(Debug)]
struct SessionState {
    query: SearchQuery,
    next_page_token: Option<String>,
    fetching: bool,
    more_results: bool,
    active: bool,
    generation: u64,
    rendered: usize,
}

impl SessionState {
    fn new(query: SearchQuery) -> Self {
        Self {
            query,
            next_page_token: None,
            fetching: false,
            more_results: true,
            active: true,
            generation: 0,
            rendered: 0,
        }
    }
}

/// Per-view paging state over a photo source.
pub struct FetchSession {
    source: Arc<dyn PhotoSource>,
    viewport: Arc<dyn Viewport>,
    sink: Arc<dyn RenderSink>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for FetchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchSession")
            .field("source", &self.source.name())
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl FetchSession {
    pub fn new(
        source: Arc<dyn PhotoSource>,
        query: SearchQuery,
        viewport: Arc<dyn Viewport>,
        sink: Arc<dyn RenderSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            source,
            viewport,
            sink,
            notifier,
            state: Mutex::new(SessionState::new(query)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn has_more_results(&self) -> bool {
        self.lock().more_results
    }

    pub fn is_fetching(&self) -> bool {
        self.lock().fetching
    }

    pub fn rendered(&self) -> usize {
        self.lock().rendered
    }

    pub fn query(&self) -> SearchQuery {
        self.lock().query.clone()
    }

    /// Stops all further fetching until the next reset.
    pub fn deactivate(&self) {
        let mut state = self.lock();
        if state.active {
            debug!("deactivating fetch session");
        }
        state.active = false;
    }

    /// Starts over, optionally with a new query. Results of a loop that is
    /// still in flight are discarded.
    pub fn reset(&self, query: Option<SearchQuery>) {
        let mut state = self.lock();
        state.generation += 1;
        if let Some(query) = query {
            state.query = query;
        }
        state.next_page_token = None;
        state.more_results = true;
        state.active = true;
        state.fetching = false;
        state.rendered = 0;
        self.sink.clear();
        self.sink.set_loading(true);
        debug!("fetch session reset to generation {}", state.generation);
    }

    fn near_bottom(&self) -> bool {
        self.viewport.remaining_distance() < NEAR_BOTTOM_ROWS
    }

    /// Fetches pages while the grid needs more content.
    ///
    /// Visibility and scroll position are ignored until something has been
    /// rendered, so the first page always loads.
    pub async fn fetch_more(&self) -> FetchOutcome {
        let generation = {
            let mut state = self.lock();
            if state.fetching {
                return FetchOutcome::Busy;
            }
            if !state.active || !state.more_results {
                return FetchOutcome::Idle;
            }
            state.fetching = true;
            state.generation
        };

        let mut pages = 0;
        let mut attempt = Attempt::First;

        loop {
            let query = {
                let state = self.lock();
                if state.generation != generation {
                    return FetchOutcome::Superseded;
                }
                if !state.active || !state.more_results {
                    break;
                }
                let first_load = state.rendered == 0;
                if !first_load && !(self.near_bottom() && self.viewport.is_visible()) {
                    break;
                }
                state.query.page(state.next_page_token.as_deref())
            };

            let result = self.source.search(query, attempt).await;

            let mut state = self.lock();
            if state.generation != generation {
                debug!("discarding page from superseded generation {}", generation);
                return FetchOutcome::Superseded;
            }

            match result {
                Ok(page) => {
                    attempt = Attempt::First;
                    pages += 1;
                    self.sink.render_items(&page.items);
                    state.rendered += page.items.len();
                    state.more_results = page.has_more();
                    state.next_page_token = page.next_page_token.filter(|t| !t.is_empty());
                    debug!(
                        "rendered {} items ({} total), more: {}",
                        page.items.len(),
                        state.rendered,
                        state.more_results
                    );
                    if state.rendered == 0 && !state.more_results {
                        self.sink.render_message(NO_RESULTS_MESSAGE);
                    }
                }
                Err(e) if e.code() == ProviderErrorCode::Retry && attempt == Attempt::First => {
                    debug!("retrying page after re-authentication");
                    attempt = Attempt::Retried;
                }
                Err(e) if e.code() == ProviderErrorCode::Unauthenticated => {
                    warn!("fetch stopped: {}", e);
                    state.active = false;
                    self.notifier.notice(AUTH_FAILED_MESSAGE);
                    break;
                }
                Err(e) => {
                    warn!("fetch failed: {}", e);
                    state.more_results = false;
                    state.next_page_token = None;
                    self.sink.render_message(e.message());
                    break;
                }
            }
        }

        let mut state = self.lock();
        if state.generation != generation {
            return FetchOutcome::Superseded;
        }
        state.fetching = false;
        self.sink.set_loading(state.active && state.more_results);
        if !state.more_results && state.rendered > 0 {
            self.sink.render_end();
        }
        FetchOutcome::Fetched(pages)
    }

    /// Runs [`FetchSession::fetch_more`] for every scroll event received
    /// on `events` until the subscription is dropped.
    pub fn subscribe(self: &Arc<Self>, mut events: mpsc::Receiver<()>) -> ScrollSubscription {
        let session = Arc::clone(self);
        let (handled_tx, handled) = watch::channel(0usize);
        let handle = tokio::spawn(async move {
            while events.recv().await.is_some() {
                if !session.is_active() {
                    break;
                }
                let outcome = session.fetch_more().await;
                debug!("scroll event handled: {:?}", outcome);
                handled_tx.send_modify(|count| *count += 1);
            }
        });
        ScrollSubscription {
            session: Arc::clone(self),
            handle: Some(handle),
            handled,
        }
    }
}

/// Keeps scroll events flowing into a session. Dropping it stops the
/// listener and deactivates the session.
#[derive(Debug)]
pub struct ScrollSubscription {
    session: Arc<FetchSession>,
    handle: Option<JoinHandle<()>>,
    handled: watch::Receiver<usize>,
}

impl ScrollSubscription {
    pub fn session(&self) -> &Arc<FetchSession> {
        &self.session
    }

    /// Waits until the listener has handled a scroll event not yet waited
    /// for. `false` once the listener has stopped.
    pub async fn settled(&mut self) -> bool {
        self.handled.changed().await.is_ok()
    }
}

impl Drop for ScrollSubscription {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.session.deactivate();
        info!("scroll subscription disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use photolink_core::{MediaItem, MediaPage, MediaSource};
    use photolink_providers::{BoxFuture, ProviderError, ProviderResult};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn item(id: &str) -> MediaItem {
        MediaItem {
            id: id.to_string(),
            description: None,
            product_url: format!("https://photos.google.com/lr/photo/{id}"),
            base_url: format!("https://lh3.example/{id}"),
            mime_type: "image/jpeg".to_string(),
            creation_time: Utc::now(),
            original_filename: None,
            source: MediaSource::Library,
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> ProviderResult<MediaPage> {
        Ok(MediaPage {
            items: ids.iter().map(|id| item(id)).collect(),
            next_page_token: next.map(str::to_string),
        })
    }

    /// Serves scripted responses and records every request.
    #[derive(Default)]
    struct ScriptedSource {
        responses: Mutex<VecDeque<ProviderResult<MediaPage>>>,
        requests: Mutex<Vec<(Option<String>, Attempt)>>,
        gate: Option<Arc<Notify>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(responses: Vec<ProviderResult<MediaPage>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Default::default()
            }
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl PhotoSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        fn search(
            &self,
            query: SearchQuery,
            attempt: Attempt,
        ) -> BoxFuture<'_, ProviderResult<MediaPage>> {
            Box::pin(async move {
                self.requests.lock().unwrap().push((query.page_token, attempt));
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                self.responses
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| page(&[], None))
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        items: Mutex<Vec<String>>,
        messages: Mutex<Vec<String>>,
        loading: AtomicBool,
        ended: AtomicBool,
    }

    impl RenderSink for RecordingSink {
        fn clear(&self) {
            self.items.lock().unwrap().clear();
            self.messages.lock().unwrap().clear();
            self.ended.store(false, Ordering::SeqCst);
        }
        fn render_items(&self, items: &[MediaItem]) {
            self.items
                .lock()
                .unwrap()
                .extend(items.iter().map(|i| i.id.clone()));
        }
        fn render_message(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
        fn set_loading(&self, loading: bool) {
            self.loading.store(loading, Ordering::SeqCst);
        }
        fn render_end(&self) {
            self.ended.store(true, Ordering::SeqCst);
        }
    }

    /// Viewport that is always at the bottom of the grid.
    struct Bottom;
    impl Viewport for Bottom {
        fn remaining_distance(&self) -> f64 {
            0.0
        }
        fn is_visible(&self) -> bool {
            true
        }
    }

    /// Viewport scrolled far away from the end.
    struct Top;
    impl Viewport for Top {
        fn remaining_distance(&self) -> f64 {
            1000.0
        }
        fn is_visible(&self) -> bool {
            true
        }
    }

    /// At the bottom of the grid, but the grid is not on screen.
    struct Hidden;
    impl Viewport for Hidden {
        fn remaining_distance(&self) -> f64 {
            0.0
        }
        fn is_visible(&self) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct Notices(Mutex<Vec<String>>);
    impl Notifier for Notices {
        fn notice(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    struct Fixture {
        source: Arc<ScriptedSource>,
        sink: Arc<RecordingSink>,
        notices: Arc<Notices>,
        session: Arc<FetchSession>,
    }

    fn fixture(source: ScriptedSource, viewport: Arc<dyn Viewport>) -> Fixture {
        let source = Arc::new(source);
        let sink = Arc::new(RecordingSink::default());
        let notices = Arc::new(Notices::default());
        let session = Arc::new(FetchSession::new(
            source.clone(),
            SearchQuery::all(),
            viewport,
            sink.clone(),
            notices.clone(),
        ));
        Fixture {
            source,
            sink,
            notices,
            session,
        }
    }

    #[tokio::test]
    async fn pages_until_token_is_absent() {
        let f = fixture(
            ScriptedSource::new(vec![
                page(&["a", "b", "c"], Some("p2")),
                page(&["d", "e", "f"], None),
            ]),
            Arc::new(Bottom),
        );

        assert_eq!(f.session.fetch_more().await, FetchOutcome::Fetched(2));
        assert_eq!(*f.sink.items.lock().unwrap(), ["a", "b", "c", "d", "e", "f"]);
        assert!(f.sink.ended.load(Ordering::SeqCst));
        assert!(!f.sink.loading.load(Ordering::SeqCst));
        assert!(!f.session.has_more_results());

        assert_eq!(f.session.fetch_more().await, FetchOutcome::Idle);
        assert_eq!(f.source.request_count(), 2);
        let tokens: Vec<_> = f
            .source
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect();
        assert_eq!(tokens, vec![None, Some("p2".to_string())]);
    }

    #[tokio::test]
    async fn stops_when_far_from_bottom() {
        let f = fixture(
            ScriptedSource::new(vec![page(&["a"], Some("p2")), page(&["b"], None)]),
            Arc::new(Top),
        );

        assert_eq!(f.session.fetch_more().await, FetchOutcome::Fetched(1));
        assert_eq!(f.source.request_count(), 1);
        assert!(f.session.has_more_results());
        assert!(f.sink.loading.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn hidden_grid_loads_first_page_only() {
        let f = fixture(
            ScriptedSource::new(vec![
                page(&["a", "b"], Some("p2")),
                page(&["c"], Some("p3")),
                page(&["d"], None),
            ]),
            Arc::new(Hidden),
        );

        assert_eq!(f.session.fetch_more().await, FetchOutcome::Fetched(1));
        assert_eq!(f.source.request_count(), 1);
        assert_eq!(*f.sink.items.lock().unwrap(), ["a", "b"]);
        assert!(f.session.has_more_results());
        assert!(!f.sink.ended.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn concurrent_calls_keep_one_request_in_flight() {
        let gate = Arc::new(Notify::new());
        let f = fixture(
            ScriptedSource::new(vec![page(&["a"], None)]).gated(gate.clone()),
            Arc::new(Bottom),
        );

        let first = tokio::spawn({
            let session = f.session.clone();
            async move { session.fetch_more().await }
        });
        while f.source.request_count() == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(f.session.fetch_more().await, FetchOutcome::Busy);
        gate.notify_one();
        assert_eq!(first.await.unwrap(), FetchOutcome::Fetched(1));
        assert_eq!(f.source.request_count(), 1);
        assert_eq!(f.source.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reset_discards_late_page() {
        let gate = Arc::new(Notify::new());
        let f = fixture(
            ScriptedSource::new(vec![page(&["stale"], Some("old")), page(&["fresh"], None)])
                .gated(gate.clone()),
            Arc::new(Bottom),
        );

        let abandoned = tokio::spawn({
            let session = f.session.clone();
            async move { session.fetch_more().await }
        });
        while f.source.request_count() == 0 {
            tokio::task::yield_now().await;
        }

        f.session.reset(None);
        assert!(!f.session.is_fetching());
        gate.notify_one();
        assert_eq!(abandoned.await.unwrap(), FetchOutcome::Superseded);
        assert!(f.sink.items.lock().unwrap().is_empty());

        let second = tokio::spawn({
            let session = f.session.clone();
            async move { session.fetch_more().await }
        });
        while f.source.request_count() < 2 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();
        assert_eq!(second.await.unwrap(), FetchOutcome::Fetched(1));
        assert_eq!(*f.sink.items.lock().unwrap(), ["fresh"]);
        assert_eq!(f.source.requests.lock().unwrap()[1].0, None);
    }

    #[tokio::test]
    async fn retry_repeats_the_page_once() {
        let f = fixture(
            ScriptedSource::new(vec![
                Err(ProviderError::retry("token renewed")),
                page(&["a"], None),
            ]),
            Arc::new(Bottom),
        );

        assert_eq!(f.session.fetch_more().await, FetchOutcome::Fetched(1));
        let requests = f.source.requests.lock().unwrap().clone();
        assert_eq!(
            requests,
            vec![(None, Attempt::First), (None, Attempt::Retried)]
        );
    }

    #[tokio::test]
    async fn second_retry_is_treated_as_failure() {
        let f = fixture(
            ScriptedSource::new(vec![
                Err(ProviderError::retry("renewed")),
                Err(ProviderError::retry("renewed again")),
            ]),
            Arc::new(Bottom),
        );

        f.session.fetch_more().await;
        assert_eq!(f.source.request_count(), 2);
        assert!(!f.session.has_more_results());
    }

    #[tokio::test]
    async fn unauthenticated_deactivates_and_notifies() {
        let f = fixture(
            ScriptedSource::new(vec![Err(ProviderError::unauthenticated("no token"))]),
            Arc::new(Bottom),
        );

        f.session.fetch_more().await;
        assert!(!f.session.is_active());
        assert_eq!(*f.notices.0.lock().unwrap(), [AUTH_FAILED_MESSAGE]);
        assert_eq!(f.session.fetch_more().await, FetchOutcome::Idle);
        assert_eq!(f.source.request_count(), 1);
    }

    #[tokio::test]
    async fn malformed_query_renders_inline_message() {
        let f = fixture(
            ScriptedSource::new(vec![Err(ProviderError::malformed_input("Invalid album ID"))]),
            Arc::new(Bottom),
        );

        f.session.fetch_more().await;
        assert!(f.session.is_active());
        assert!(!f.session.has_more_results());
        assert_eq!(*f.sink.messages.lock().unwrap(), ["Invalid album ID"]);
        assert!(f.notices.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_first_page_shows_no_results() {
        let f = fixture(ScriptedSource::new(vec![page(&[], None)]), Arc::new(Bottom));
        f.session.fetch_more().await;
        assert_eq!(*f.sink.messages.lock().unwrap(), [NO_RESULTS_MESSAGE]);
        assert!(!f.sink.ended.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn reset_with_new_query_fetches_again() {
        let f = fixture(
            ScriptedSource::new(vec![page(&["a"], None), page(&["b"], None)]),
            Arc::new(Bottom),
        );
        f.session.fetch_more().await;
        assert_eq!(f.session.fetch_more().await, FetchOutcome::Idle);

        f.session.reset(Some(SearchQuery::for_album("album-1")));
        assert_eq!(f.session.query().album_id.as_deref(), Some("album-1"));
        assert_eq!(f.session.fetch_more().await, FetchOutcome::Fetched(1));
        assert_eq!(*f.sink.items.lock().unwrap(), ["b"]);
    }

    #[tokio::test]
    async fn scroll_events_drive_fetches_until_dropped() {
        let f = fixture(
            ScriptedSource::new(vec![page(&["a"], Some("p2")), page(&["b"], Some("p3"))]),
            Arc::new(Top),
        );
        let (tx, rx) = mpsc::channel(4);
        let mut subscription = f.session.subscribe(rx);

        tx.send(()).await.unwrap();
        assert!(subscription.settled().await);
        assert_eq!(f.source.request_count(), 1);
        assert_eq!(*f.sink.items.lock().unwrap(), ["a"]);

        drop(subscription);
        assert!(!f.session.is_active());
        assert_eq!(f.session.fetch_more().await, FetchOutcome::Idle);
        assert_eq!(f.source.request_count(), 1);
    }

    #[tokio::test]
    async fn listener_stops_once_session_is_inactive() {
        let f = fixture(ScriptedSource::new(vec![page(&["a"], Some("p2"))]), Arc::new(Bottom));
        let (tx, rx) = mpsc::channel(4);
        let mut subscription = f.session.subscribe(rx);

        f.session.deactivate();
        tx.send(()).await.unwrap();
        assert!(!subscription.settled().await);
        assert_eq!(f.source.request_count(), 0);
    }
}
