//! `albums` and `insert-album`.

use photolink_core::{Album, album_codeblock};

use crate::app;
use crate::cli::NoteTarget;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::host::Editor;
use crate::terminal::read_line;
use crate::vault::{FsVault, MarkdownEditor};

fn describe(number: usize, album: &Album) -> String {
    let mut line = format!("{number:>4}. {}", album.title);
    if let Some(count) = album.media_items_count {
        line.push_str(&format!(" ({count} items)"));
    }
    if album.shared {
        line.push_str(" [shared]");
    }
    line
}

async fn fetch(config: &ClientConfig) -> ClientResult<Vec<Album>> {
    let client = app::connect(config)?;
    let albums = client.list_albums().await?;
    for (index, album) in albums.iter().enumerate() {
        println!("{}", describe(index + 1, album));
    }
    if albums.is_empty() {
        println!("No albums found.");
    }
    Ok(albums)
}

/// `photolink albums`.
pub async fn list(config: &ClientConfig) -> ClientResult<()> {
    fetch(config).await.map(|_| ())
}

/// `photolink insert-album`: lets the user choose an album and inserts a
/// `photos` code block for it into the note.
pub async fn insert(config: &ClientConfig, target: NoteTarget) -> ClientResult<()> {
    let vault = FsVault::new(config.vault_root());
    let mut editor = MarkdownEditor::open(&vault, &target.note)?;
    if let Some(at) = target.at {
        editor = editor.with_cursor(at);
    }

    let albums = fetch(config).await?;
    if albums.is_empty() {
        return Ok(());
    }

    eprint!("album number (empty to cancel) > ");
    let choice = read_line().await.filter(|line| !line.is_empty());
    let album = choose(&albums, choice.as_deref())?;

    let text = insert_codeblock(&editor, album)?;
    println!("Inserted album `{}` ({} bytes)", album.title, text.len());
    Ok(())
}

fn choose<'a>(albums: &'a [Album], choice: Option<&str>) -> ClientResult<&'a Album> {
    let choice = choice.ok_or(ClientError::Cancelled)?;
    choice
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| albums.get(index))
        .ok_or_else(|| ClientError::Config(format!("no album numbered `{choice}`")))
}

fn insert_codeblock(editor: &dyn Editor, album: &Album) -> ClientResult<String> {
    let text = album_codeblock(&album.title, &album.id)
        .map_err(|e| ClientError::Config(e.to_string()))?;
    let cursor = editor.cursor();
    editor.insert_at(&text, cursor)?;
    editor.set_cursor(cursor.advanced_by(&text));
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn album(id: &str, title: &str, shared: bool) -> Album {
        Album {
            id: id.to_string(),
            title: title.to_string(),
            product_url: None,
            media_items_count: Some(12),
            cover_photo_base_url: None,
            shared,
        }
    }

    #[test]
    fn describes_albums() {
        assert_eq!(describe(1, &album("a", "Alps", false)), "   1. Alps (12 items)");
        assert_eq!(
            describe(2, &album("b", "Family", true)),
            "   2. Family (12 items) [shared]"
        );
    }

    #[test]
    fn choice_is_one_based() {
        let albums = vec![album("a", "Alps", false), album("b", "Family", true)];
        assert_eq!(choose(&albums, Some("2")).unwrap().id, "b");
        assert!(matches!(choose(&albums, None), Err(ClientError::Cancelled)));
        assert!(choose(&albums, Some("0")).is_err());
        assert!(choose(&albums, Some("3")).is_err());
        assert!(choose(&albums, Some("x")).is_err());
    }

    #[test]
    fn codeblock_lands_at_cursor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Trip.md"), "# Trip\n").unwrap();
        let vault = FsVault::new(dir.path());
        let editor = MarkdownEditor::open(&vault, Path::new("Trip.md")).unwrap();

        let text = insert_codeblock(&editor, &album("A1", "Alps", false)).unwrap();
        assert!(text.contains(r#""albumId":"A1""#));

        let saved = std::fs::read_to_string(dir.path().join("Trip.md")).unwrap();
        assert!(saved.starts_with("# Trip\n\n```photos\n"));
        assert!(saved.ends_with("```\n"));
        assert_eq!(editor.cursor(), crate::host::Cursor::new(1, 0).advanced_by(&text));
    }
}
