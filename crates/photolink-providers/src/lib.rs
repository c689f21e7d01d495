//! Photo sources for photolink.
//!
//! - [`PhotoSource`] - paged media search, implemented by the Google client
//!   and by [`StaticSource`] for already-known items
//! - [`ProviderError`] - classified failures (`Unauthenticated`, `Retry`,
//!   `MalformedInput`, `UnknownStatus`, ...)
//! - [`google`] - OAuth, Library API client and Picker sessions
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐
//! │ Library API  │   │  Picker API  │
//! └──────┬───────┘   └──────┬───────┘
//!        │                  │
//!        ▼                  ▼
//! ┌──────────────┐   ┌─────────────────────┐
//! │ PhotosClient │◀──│ PickerSessionEngine │
//! └──────┬───────┘   └──────────┬──────────┘
//!        │ PhotoSource          │ picked items
//!        ▼                      ▼
//!  ┌───────────┐         ┌──────────────┐
//!  │ MediaPage │         │ StaticSource │
//!  └───────────┘         └──────────────┘
//! ```

pub mod error;
pub mod google;
pub mod provider;

pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use provider::{Attempt, BoxFuture, PhotoSource, StaticSource};
