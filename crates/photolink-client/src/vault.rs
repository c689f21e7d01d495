//! A directory of Markdown notes acting as the host.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::host::{ActiveNote, Cursor, Editor, Vault};

/// File operations rooted at the vault directory.
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a vault-relative path onto the filesystem, refusing to leave
    /// the vault.
    fn full_path(&self, path: &str) -> ClientResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(ClientError::Host(format!("path escapes the vault: {path}")));
        }
        Ok(self.root.join(relative))
    }

    /// The vault-relative, `/`-separated form of a filesystem path.
    pub fn relative(&self, path: &Path) -> ClientResult<String> {
        let relative = path.strip_prefix(&self.root).map_err(|_| {
            ClientError::Host(format!("{} is not inside the vault", path.display()))
        })?;
        Ok(relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/"))
    }
}

impl Vault for FsVault {
    fn exists(&self, path: &str) -> bool {
        self.full_path(path).map(|p| p.exists()).unwrap_or(false)
    }

    fn create_folder(&self, path: &str) -> ClientResult<()> {
        let full = self.full_path(path)?;
        fs::create_dir_all(&full)?;
        debug!("created folder {}", full.display());
        Ok(())
    }

    fn write_binary(&self, path: &str, bytes: &[u8]) -> ClientResult<()> {
        let full = self.full_path(path)?;
        fs::write(&full, bytes)?;
        debug!("wrote {} bytes to {}", bytes.len(), full.display());
        Ok(())
    }
}

/// Edits one note file in place. Every insertion is written back at once.
#[derive(Debug)]
pub struct MarkdownEditor {
    file: PathBuf,
    note: ActiveNote,
    content: Mutex<String>,
    cursor: Mutex<Cursor>,
}

impl MarkdownEditor {
    /// Opens `file` (inside `vault`) with the cursor at the end of the note.
    /// A missing file starts out empty and is created on first insert.
    pub fn open(vault: &FsVault, file: &Path) -> ClientResult<Self> {
        let file = if file.is_absolute() {
            file.to_path_buf()
        } else {
            vault.root().join(file)
        };
        let content = if file.exists() {
            fs::read_to_string(&file)?
        } else {
            String::new()
        };

        let note = ActiveNote {
            path: vault.relative(&file)?,
            title: file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            front_matter: parse_front_matter(&content),
        };
        let cursor = end_of(&content);

        Ok(Self {
            file,
            note,
            content: Mutex::new(content),
            cursor: Mutex::new(cursor),
        })
    }

    pub fn with_cursor(self, cursor: Cursor) -> Self {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner) = cursor;
        self
    }

    fn content(&self) -> MutexGuard<'_, String> {
        self.content.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn text(&self) -> String {
        self.content().clone()
    }
}

impl Editor for MarkdownEditor {
    fn active_note(&self) -> Option<ActiveNote> {
        Some(self.note.clone())
    }

    fn cursor(&self) -> Cursor {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_cursor(&self, cursor: Cursor) {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner) = cursor;
    }

    fn insert_at(&self, text: &str, at: Cursor) -> ClientResult<()> {
        let mut content = self.content();
        let offset = byte_offset(&content, at);
        content.insert_str(offset, text);
        if let Some(parent) = self.file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.file, content.as_bytes())?;
        debug!("inserted {} bytes into {}", text.len(), self.file.display());
        Ok(())
    }
}

/// Byte offset of `cursor`, clamped to the document and to the line.
fn byte_offset(content: &str, cursor: Cursor) -> usize {
    let mut offset = 0;
    for (index, line) in content.split_inclusive('\n').enumerate() {
        let body = line.strip_suffix('\n').unwrap_or(line);
        if index == cursor.line {
            return offset
                + body
                    .char_indices()
                    .nth(cursor.ch)
                    .map_or(body.len(), |(i, _)| i);
        }
        offset += line.len();
    }
    content.len()
}

fn end_of(content: &str) -> Cursor {
    let line = content.matches('\n').count();
    let last = content.rsplit('\n').next().unwrap_or_default();
    Cursor::new(line, last.chars().count())
}

/// Flat `key: value` pairs of a leading `---` block.
pub fn parse_front_matter(content: &str) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    let mut lines = content.lines();
    if lines.next().map(str::trim_end) != Some("---") {
        return values;
    }
    for line in lines {
        if line.trim_end() == "---" {
            return values;
        }
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            if !key.starts_with(' ') && !value.is_empty() {
                values.insert(key.trim().to_string(), value.to_string());
            }
        }
    }
    // Unterminated block: not front matter.
    BTreeMap::new()
}
