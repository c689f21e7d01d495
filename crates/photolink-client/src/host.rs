//! Collaborators provided by the hosting application.
//!
//! The fetch loop and the insertion handler only talk to the host through
//! these traits. The `photolink` binary implements them over a directory of
//! Markdown notes and the terminal; tests implement them with in-memory fakes.

use std::collections::BTreeMap;

use photolink_core::MediaItem;

use crate::error::ClientResult;

/// Vault-relative file operations. Paths are `/`-separated.
pub trait Vault: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    /// Creates `path` and any missing parents.
    fn create_folder(&self, path: &str) -> ClientResult<()>;

    fn write_binary(&self, path: &str, bytes: &[u8]) -> ClientResult<()>;
}

/// A position in the active document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor {
    pub line: usize,
    /// Character (not byte) offset within the line.
    pub ch: usize,
}

impl Cursor {
    pub fn new(line: usize, ch: usize) -> Self {
        Self { line, ch }
    }

    /// The cursor position after `text` has been inserted at `self`.
    pub fn advanced_by(self, text: &str) -> Self {
        let mut lines = text.split('\n');
        let first = lines.next().unwrap_or_default();
        match lines.last() {
            Some(last) => Self {
                line: self.line + text.matches('\n').count(),
                ch: last.chars().count(),
            },
            None => Self {
                line: self.line,
                ch: self.ch + first.chars().count(),
            },
        }
    }
}

/// What the host knows about the note being edited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveNote {
    /// Vault-relative path, e.g. `Journal/Daily/2024-01-01.md`.
    pub path: String,
    /// File name without extension.
    pub title: String,
    pub front_matter: BTreeMap<String, String>,
}

/// The active document and its cursor.
pub trait Editor: Send + Sync {
    fn active_note(&self) -> Option<ActiveNote>;

    fn cursor(&self) -> Cursor;

    fn set_cursor(&self, cursor: Cursor);

    fn insert_at(&self, text: &str, at: Cursor) -> ClientResult<()>;
}

/// Transient messages for the user.
pub trait Notifier: Send + Sync {
    fn notice(&self, message: &str);
}

/// Scroll geometry of the thumbnail grid.
pub trait Viewport: Send + Sync {
    /// Distance between the bottom of the visible area and the end of the
    /// rendered content, in thumbnail rows.
    fn remaining_distance(&self) -> f64;

    /// Whether the grid is currently shown to the user.
    fn is_visible(&self) -> bool;
}

/// Where fetched items are rendered.
pub trait RenderSink: Send + Sync {
    /// Removes everything rendered so far.
    fn clear(&self);

    /// Appends items in the order given.
    fn render_items(&self, items: &[MediaItem]);

    /// Shows an inline message in place of (further) results.
    fn render_message(&self, message: &str);

    fn set_loading(&self, loading: bool);

    /// Marks the end of the result list.
    fn render_end(&self);
}

/// The dialog an item was picked from.
pub trait SelectionDialog: Send + Sync {
    /// Clears the grid while the selection is processed.
    fn clear(&self);

    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_advances_within_line() {
        let cursor = Cursor::new(3, 4).advanced_by("[![](a.jpg)](x) ");
        assert_eq!(cursor, Cursor::new(3, 20));
    }

    #[test]
    fn cursor_advances_across_lines() {
        let cursor = Cursor::new(1, 7).advanced_by("\n```photos\n{}\n```\n");
        assert_eq!(cursor, Cursor::new(5, 0));

        let cursor = Cursor::new(0, 0).advanced_by("ab\ncdé");
        assert_eq!(cursor, Cursor::new(1, 3));
    }
}
