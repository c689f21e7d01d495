//! The terminal as host surface: a numbered list instead of a thumbnail
//! grid, stdin instead of clicks.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Local;
use photolink_core::MediaItem;
use photolink_providers::BoxFuture;
use photolink_providers::google::{BrowserLauncher, ConsentPrompt, SystemBrowser};
use tracing::debug;

use crate::host::{Notifier, RenderSink, SelectionDialog, Viewport};

/// Renders fetched items as numbered lines and remembers them for selection.
///
/// One rendered item is one row; the user "scrolls" to the end of the list
/// with [`TerminalView::scroll_to_end`].
#[derive(Debug, Default)]
pub struct TerminalView {
    items: Mutex<Vec<MediaItem>>,
    scrolled_to: AtomicUsize,
    closed: AtomicBool,
}

impl TerminalView {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> MutexGuard<'_, Vec<MediaItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn scroll_to_end(&self) {
        self.scrolled_to.store(self.items().len(), Ordering::SeqCst);
    }

    /// The item shown with number `number` (1-based).
    pub fn item(&self, number: usize) -> Option<MediaItem> {
        number
            .checked_sub(1)
            .and_then(|index| self.items().get(index).cloned())
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub fn describe(number: usize, item: &MediaItem) -> String {
    let taken = item
        .creation_time
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M");
    let name = item.original_filename.as_deref().unwrap_or(&item.id);
    match item.description.as_deref().filter(|d| !d.is_empty()) {
        Some(desc) => format!("{number:>4}. {taken}  {name}  {desc}"),
        None => format!("{number:>4}. {taken}  {name}"),
    }
}

impl Viewport for TerminalView {
    fn remaining_distance(&self) -> f64 {
        let rendered = self.items().len();
        rendered.saturating_sub(self.scrolled_to.load(Ordering::SeqCst)) as f64
    }

    fn is_visible(&self) -> bool {
        !self.is_closed()
    }
}

impl RenderSink for TerminalView {
    fn clear(&self) {
        self.items().clear();
        self.scrolled_to.store(0, Ordering::SeqCst);
    }

    fn render_items(&self, items: &[MediaItem]) {
        let mut shown = self.items();
        for item in items {
            shown.push(item.clone());
            println!("{}", describe(shown.len(), item));
        }
    }

    fn render_message(&self, message: &str) {
        println!("  {message}");
    }

    fn set_loading(&self, loading: bool) {
        debug!("loading: {}", loading);
    }

    fn render_end(&self) {
        println!("  No more results.");
    }
}

impl SelectionDialog for TerminalView {
    fn clear(&self) {
        RenderSink::clear(self);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Notices go to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notice(&self, message: &str) {
        eprintln!("photolink: {message}");
    }
}

/// Reads one trimmed line from stdin. `None` at end of input.
///
/// Goes through the process-wide buffered `std` handle so that piped input
/// is not lost between calls.
pub async fn read_line() -> Option<String> {
    let read = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|n| (n, line))
    })
    .await;
    match read {
        Ok(Ok((0, _))) | Ok(Err(_)) | Err(_) => None,
        Ok(Ok((_, line))) => Some(line.trim().to_string()),
    }
}

/// Shows the consent URL in the terminal (and the browser, if possible) and
/// reads back the URL the browser was redirected to.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConsent;

impl ConsentPrompt for TerminalConsent {
    fn prompt<'a>(&'a self, consent_url: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            if let Err(e) = SystemBrowser.open(consent_url) {
                debug!("could not open browser: {}", e);
            }
            eprintln!("Authorize photolink in your browser:\n\n  {consent_url}\n");
            eprintln!("Then paste the address of the page you were redirected to (empty to cancel):");
            read_line().await.filter(|line| !line.is_empty())
        })
    }
}
