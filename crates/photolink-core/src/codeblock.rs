//! `photos` fenced code blocks embedded in notes.
//!
//! A block body is either one of the keywords `today` / `notedate`, or a JSON
//! object `{"title": "...", "query": {...}}` where `query` is a search request
//! body. Older notes put the search request at the top level; that form is
//! still accepted. Anything unparseable shows the whole library.

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

use crate::media::{DateFilter, SearchQuery};

/// Fence info string of the code block.
pub const CODEBLOCK_LANGUAGE: &str = "photos";

#[derive(Debug, Error)]
pub enum CodeblockError {
    #[error("code block query is not a valid search request: {0}")]
    InvalidQuery(#[source] serde_json::Error),

    #[error("failed to encode code block: {0}")]
    Encode(#[source] serde_json::Error),
}

/// What a code block asks to show.
#[derive(Debug, Clone, PartialEq)]
pub enum Codeblock {
    Today,
    NoteDate,
    Search {
        title: Option<String>,
        query: SearchQuery,
    },
    All,
}

impl Codeblock {
    pub fn parse(source: &str) -> Result<Self, CodeblockError> {
        let source = source.trim();
        match source {
            "" => return Ok(Self::All),
            "today" => return Ok(Self::Today),
            "notedate" => return Ok(Self::NoteDate),
            _ => {}
        }

        let Ok(Value::Object(mut object)) = serde_json::from_str::<Value>(source) else {
            tracing::debug!("code block is not a JSON object, showing all photos");
            return Ok(Self::All);
        };

        let (title, raw_query) = match object.remove("query") {
            Some(query) if !query.is_null() => {
                let title = object
                    .get("title")
                    .and_then(Value::as_str)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string);
                (title, query)
            }
            _ => (None, Value::Object(object)),
        };

        let query = serde_json::from_value(raw_query).map_err(CodeblockError::InvalidQuery)?;
        Ok(Self::Search { title, query })
    }

    /// The title shown above the photo grid, if any.
    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Search { title, .. } => title.as_deref(),
            _ => None,
        }
    }

    /// Turns the block into a search request.
    pub fn to_query(&self, today: NaiveDate, note_date: NaiveDate) -> SearchQuery {
        match self {
            Self::Today => SearchQuery::with_date_filter(DateFilter::single(today)),
            Self::NoteDate => SearchQuery::with_date_filter(DateFilter::single(note_date)),
            Self::Search { query, .. } => query.clone(),
            Self::All => SearchQuery::all(),
        }
    }
}

/// Renders the code block that embeds an album into a note.
pub fn album_codeblock(title: &str, album_id: &str) -> Result<String, CodeblockError> {
    let body = serde_json::json!({
        "title": title,
        "query": { "albumId": album_id },
    });
    let json = serde_json::to_string(&body).map_err(CodeblockError::Encode)?;
    Ok(format!("\n```{CODEBLOCK_LANGUAGE}\n{json}\n```\n"))
}
