//! Terminal host for linking Google Photos into Markdown notes.
//!
//! This crate provides the `photolink` command-line interface, plus the
//! host-side pieces any frontend needs: the paging fetch session, the
//! insertion handler, and the browsing modes.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod host;
pub mod insert;
pub mod modes;
pub mod secret;
pub mod session;
pub mod terminal;
pub mod vault;

pub use cli::Cli;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use host::{ActiveNote, Cursor, Editor, Notifier, RenderSink, SelectionDialog, Vault, Viewport};
pub use insert::{Inserted, InsertionHandler, ThumbnailFetcher};
pub use modes::{DailyPhotos, PickerMode};
pub use session::{FetchOutcome, FetchSession, ScrollSubscription};
