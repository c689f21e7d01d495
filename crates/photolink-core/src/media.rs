//! Media items, albums and search queries.
//!
//! These are the provider-agnostic shapes that flow between the Google
//! client, the fetch loop and the insertion handler. Wire-level structs live
//! in `photolink-providers`; this module only holds what the rest of the
//! application needs to know about a photo.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::moment::MomentFormat;

/// Which API generation a media item was obtained from.
///
/// Picker items need the bearer token when their bytes are fetched; library
/// items carry a self-authorising capability URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaSource {
    /// Photos Library API (`mediaItems:search`).
    #[default]
    Library,
    /// Photos Picker API session.
    Picker,
}

/// A single photo or video returned by the remote API.
///
/// `base_url` is a capability URL whose signature expires after a short,
/// server-defined window. It must never be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Remote identifier.
    pub id: String,
    /// Caption entered by the user in Google Photos.
    pub description: Option<String>,
    /// Link to the item in the Google Photos web UI.
    pub product_url: String,
    /// Short-lived capability URL for the item's bytes.
    pub base_url: String,
    /// MIME type reported by the API.
    pub mime_type: String,
    /// When the photo was taken.
    pub creation_time: DateTime<Utc>,
    /// The filename the item had when it was uploaded, if known.
    pub original_filename: Option<String>,
    /// API generation this item came from.
    #[serde(default)]
    pub source: MediaSource,
}

impl MediaItem {
    /// Returns the capability URL sized to fit within `width` x `height`.
    pub fn sized_url(&self, width: u32, height: u32) -> String {
        format!("{}=w{}-h{}", self.base_url, width, height)
    }

    /// Derives the local filename from the creation time, in local time.
    pub fn filename(&self, format: &MomentFormat) -> String {
        self.filename_in(&Local, format)
    }

    /// Derives the local filename from the creation time in the given zone.
    pub fn filename_in<Tz: TimeZone>(&self, tz: &Tz, format: &MomentFormat) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        format.format(&self.creation_time.with_timezone(tz))
    }

    /// Whether fetching the bytes needs an `Authorization` header.
    pub fn requires_bearer(&self) -> bool {
        self.source == MediaSource::Picker
    }
}

/// A page of media items plus the continuation token, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaPage {
    pub items: Vec<MediaItem>,
    pub next_page_token: Option<String>,
}

impl MediaPage {
    /// Returns true if the server indicated more results are available.
    pub fn has_more(&self) -> bool {
        self.next_page_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// An album in the user's library (owned or shared).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub title: String,
    pub product_url: Option<String>,
    pub media_items_count: Option<u64>,
    pub cover_photo_base_url: Option<String>,
    /// True when the album came from the shared-albums list.
    #[serde(default)]
    pub shared: bool,
}

/// A calendar date in the Photos Library API shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl From<NaiveDate> for ApiDate {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }
}

/// An inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: ApiDate,
    pub end_date: ApiDate,
}

/// Date filter: any number of single dates and ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dates: Vec<ApiDate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<DateRange>,
}

impl DateFilter {
    /// A filter matching exactly one day.
    pub fn single(date: NaiveDate) -> Self {
        Self {
            dates: vec![date.into()],
            ranges: Vec::new(),
        }
    }

    /// A filter matching `past_days` before through `future_days` after `date`.
    ///
    /// Ranges reaching past the representable calendar are clamped to it.
    pub fn around(date: NaiveDate, past_days: u32, future_days: u32) -> Self {
        let start = date
            .checked_sub_signed(Duration::days(i64::from(past_days)))
            .unwrap_or(NaiveDate::MIN);
        let end = date
            .checked_add_signed(Duration::days(i64::from(future_days)))
            .unwrap_or(NaiveDate::MAX);
        Self {
            dates: Vec::new(),
            ranges: vec![DateRange {
                start_date: start.into(),
                end_date: end.into(),
            }],
        }
    }
}

/// The `filters` object of a search request.
///
/// Only the date filter is modelled; any other filter keys supplied by the
/// user (content, media type, feature filters) are carried through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_filter: Option<DateFilter>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of a `mediaItems:search` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SearchQuery {
    /// An unfiltered query (the whole library, newest first).
    pub fn all() -> Self {
        Self::default()
    }

    /// A query limited to the given date filter.
    pub fn with_date_filter(filter: DateFilter) -> Self {
        Self {
            filters: Some(Filters {
                date_filter: Some(filter),
                extra: Map::new(),
            }),
            ..Self::default()
        }
    }

    /// A query listing the contents of one album.
    pub fn for_album(album_id: impl Into<String>) -> Self {
        Self {
            album_id: Some(album_id.into()),
            ..Self::default()
        }
    }

    /// Returns a copy of this query continuing from `token`.
    pub fn page(&self, token: Option<&str>) -> Self {
        let mut query = self.clone();
        query.page_token = token.filter(|t| !t.is_empty()).map(str::to_string);
        query
    }
}
