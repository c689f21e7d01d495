//! The `PhotoSource` abstraction consumed by the fetch loop.

use std::future::Future;
use std::pin::Pin;

use photolink_core::{MediaItem, MediaPage, SearchQuery};

use crate::error::ProviderResult;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Whether a request is the original call or its single permitted re-send.
///
/// A `401` on a [`Attempt::Retried`] request is reported as unauthenticated
/// without another re-authentication, so one logical call can trigger at most
/// one token refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retried,
}

/// Something that can serve pages of media items for a query.
///
/// Implemented by the Google Photos client for library searches and by
/// [`StaticSource`] for an already-known list (picker results).
pub trait PhotoSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetches one page. `query.page_token` selects the page.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ProviderError`](crate::ProviderError); the
    /// caller decides whether to retry, stop, or deactivate.
    fn search(&self, query: SearchQuery, attempt: Attempt)
    -> BoxFuture<'_, ProviderResult<MediaPage>>;
}

/// A source that serves a fixed list of items as a single page.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    items: Vec<MediaItem>,
}

impl StaticSource {
    pub fn new(items: Vec<MediaItem>) -> Self {
        Self { items }
    }
}

impl PhotoSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    fn search(
        &self,
        query: SearchQuery,
        _attempt: Attempt,
    ) -> BoxFuture<'_, ProviderResult<MediaPage>> {
        // Any page token means the single page was already served.
        let items = if query.page_token.is_some() {
            Vec::new()
        } else {
            self.items.clone()
        };
        Box::pin(async move {
            Ok(MediaPage {
                items,
                next_page_token: None,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use photolink_core::MediaSource;

    fn item(id: &str) -> MediaItem {
        MediaItem {
            id: id.to_string(),
            description: None,
            product_url: format!("https://photos.google.com/{id}"),
            base_url: format!("https://lh3.example/{id}"),
            mime_type: "image/jpeg".to_string(),
            creation_time: Utc::now(),
            original_filename: None,
            source: MediaSource::Picker,
        }
    }

    #[tokio::test]
    async fn static_source_serves_one_page() {
        let source = StaticSource::new(vec![item("a"), item("b")]);
        let page = source
            .search(SearchQuery::all(), Attempt::First)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(!page.has_more());

        let next = source
            .search(SearchQuery::all().page(Some("x")), Attempt::First)
            .await
            .unwrap();
        assert!(next.items.is_empty());
    }
}
