//! Core types: media items, queries, date formats, templates, thumbnail locations

pub mod codeblock;
pub mod dates;
pub mod location;
pub mod media;
pub mod moment;
pub mod template;
pub mod tracing;

pub use codeblock::{Codeblock, CodeblockError, album_codeblock};
pub use dates::{DateSettings, DateSource, NoteContext, NoteDate};
pub use location::{LocationOption, LocationPolicy, ResolvedLocation};
pub use media::{
    Album, ApiDate, DateFilter, DateRange, Filters, MediaItem, MediaPage, MediaSource, SearchQuery,
};
pub use moment::{FormatError, MomentFormat};
pub use template::{DEFAULT_TEMPLATE, InsertionFields};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
