//! Saving a selected photo into the vault and linking it from the note.

use std::sync::Arc;

use chrono::SecondsFormat;
use photolink_core::{InsertionFields, LocationPolicy, MediaItem, MomentFormat};
use photolink_providers::google::PhotosClient;
use photolink_providers::{BoxFuture, ProviderResult};
use tracing::{debug, error, info};

use crate::config::ThumbnailSettings;
use crate::error::{ClientError, ClientResult};
use crate::host::{Editor, SelectionDialog, Vault};

/// Downloads thumbnail bytes for an item.
pub trait ThumbnailFetcher: Send + Sync {
    fn fetch(&self, item: &MediaItem, width: u32, height: u32)
    -> BoxFuture<'_, ProviderResult<Vec<u8>>>;
}

impl ThumbnailFetcher for PhotosClient {
    fn fetch(
        &self,
        item: &MediaItem,
        width: u32,
        height: u32,
    ) -> BoxFuture<'_, ProviderResult<Vec<u8>>> {
        let item = item.clone();
        Box::pin(async move { self.download(&item, width, height).await })
    }
}

/// What an insertion produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inserted {
    /// Vault-relative path of the written thumbnail.
    pub file_path: String,
    /// Text inserted into the note.
    pub text: String,
}

pub struct InsertionHandler {
    vault: Arc<dyn Vault>,
    editor: Arc<dyn Editor>,
    fetcher: Arc<dyn ThumbnailFetcher>,
    thumbnails: ThumbnailSettings,
    location: LocationPolicy,
}

impl InsertionHandler {
    pub fn new(
        vault: Arc<dyn Vault>,
        editor: Arc<dyn Editor>,
        fetcher: Arc<dyn ThumbnailFetcher>,
        thumbnails: ThumbnailSettings,
        location: LocationPolicy,
    ) -> Self {
        Self {
            vault,
            editor,
            fetcher,
            thumbnails,
            location,
        }
    }

    /// Inserts `item` into the active note and closes `dialog`.
    ///
    /// The dialog is closed whether or not the insertion worked. Nothing is
    /// rolled back on failure: a folder created before a failed download
    /// stays.
    pub async fn insert(
        &self,
        item: &MediaItem,
        dialog: &dyn SelectionDialog,
    ) -> ClientResult<Inserted> {
        dialog.clear();
        let result = self.save_and_link(item).await;
        if let Err(e) = &result {
            error!("failed to insert {}: {}", item.id, e);
        }
        dialog.close();
        result
    }

    async fn save_and_link(&self, item: &MediaItem) -> ClientResult<Inserted> {
        let note = self
            .editor
            .active_note()
            .ok_or_else(|| ClientError::Host("no active note".to_string()))?;

        let filename = item.filename(&MomentFormat::new(&self.thumbnails.filename_format));
        let location = self.location.resolve(&note.path, &filename);
        debug!("saving {} to {}", item.id, location.file_path);

        if !location.folder.is_empty() && !self.vault.exists(&location.folder) {
            self.vault.create_folder(&location.folder)?;
        }

        let bytes = self
            .fetcher
            .fetch(item, self.thumbnails.width, self.thumbnails.height)
            .await?;
        self.vault.write_binary(&location.file_path, &bytes)?;

        let fields = InsertionFields {
            local_thumbnail_link: location.link_path,
            google_photo_url: item.product_url.clone(),
            google_photo_id: item.id.clone(),
            google_base_url: item.base_url.clone(),
            google_photo_desc: item.description.clone().unwrap_or_default(),
            taken_date: item
                .creation_time
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        let text = fields.render(&self.thumbnails.template);

        let cursor = self.editor.cursor();
        self.editor.insert_at(&text, cursor)?;
        self.editor.set_cursor(cursor.advanced_by(&text));

        info!("inserted {} ({} bytes)", location.file_path, bytes.len());
        Ok(Inserted {
            file_path: location.file_path,
            text,
        })
    }
}
