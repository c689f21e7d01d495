//! Where thumbnails are written and how the note links to them.

use serde::{Deserialize, Serialize};

/// Folder policy for saved thumbnails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationOption {
    /// Next to the note.
    #[default]
    Note,
    /// In a subfolder of the note's folder.
    Subfolder,
    /// In one fixed vault folder.
    Specified,
}

/// A folder policy plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationPolicy {
    pub option: LocationOption,
    /// Used by [`LocationOption::Subfolder`].
    pub subfolder: String,
    /// Used by [`LocationOption::Specified`].
    pub folder: String,
}

impl Default for LocationPolicy {
    fn default() -> Self {
        Self {
            option: LocationOption::Note,
            subfolder: "photos".to_string(),
            folder: String::new(),
        }
    }
}

/// Where one thumbnail goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    /// Vault-relative folder, no leading or trailing separator. Empty means
    /// the vault root.
    pub folder: String,
    /// Vault-relative path of the file.
    pub file_path: String,
    /// Link text for the note, URI-encoded per segment.
    pub link_path: String,
}

impl LocationPolicy {
    /// Resolves the destination of `filename` for the note at `note_path`
    /// (vault-relative, `/`-separated).
    pub fn resolve(&self, note_path: &str, filename: &str) -> ResolvedLocation {
        let note_folder = parent_folder(note_path);
        let (folder, link) = match self.option {
            LocationOption::Note => (note_folder.to_string(), filename.to_string()),
            LocationOption::Subfolder => {
                let sub = trim_separators(&self.subfolder);
                (join(note_folder, sub), join(sub, filename))
            }
            LocationOption::Specified => {
                let fixed = trim_separators(&self.folder);
                (fixed.to_string(), join(fixed, filename))
            }
        };
        let folder = trim_separators(&folder).to_string();

        ResolvedLocation {
            file_path: join(&folder, filename),
            link_path: encode_path(&link),
            folder,
        }
    }
}

fn parent_folder(path: &str) -> &str {
    let path = trim_separators(path);
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

fn trim_separators(path: &str) -> &str {
    path.trim_matches(['/', '\\'])
}

fn join(folder: &str, name: &str) -> String {
    if folder.is_empty() {
        name.to_string()
    } else if name.is_empty() {
        folder.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

/// Left as-is in link paths besides ASCII alphanumerics, like `encodeURI`.
const LINK_SAFE: &str = "-_.!~*'();,/?:@&=+$#";

fn encode_path(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    let mut buf = [0; 4];
    for c in path.chars() {
        if c.is_ascii_alphanumeric() || LINK_SAFE.contains(c) {
            encoded.push(c);
        } else {
            encoded.push_str(&urlencoding::encode(c.encode_utf8(&mut buf)));
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(option: LocationOption, subfolder: &str, folder: &str) -> LocationPolicy {
        LocationPolicy {
            option,
            subfolder: subfolder.into(),
            folder: folder.into(),
        }
    }

    #[test]
    fn subfolder_of_note_folder() {
        let loc = policy(LocationOption::Subfolder, "photos", "")
            .resolve("Journal/Daily/2024-01-01.md", "a.jpg");
        assert_eq!(loc.folder, "Journal/Daily/photos");
        assert_eq!(loc.file_path, "Journal/Daily/photos/a.jpg");
        assert_eq!(loc.link_path, "photos/a.jpg");
    }

    #[test]
    fn note_folder() {
        let loc = LocationPolicy::default().resolve("Trips/Rome.md", "b.jpg");
        assert_eq!(loc.folder, "Trips");
        assert_eq!(loc.file_path, "Trips/b.jpg");
        assert_eq!(loc.link_path, "b.jpg");
    }

    #[test]
    fn note_at_vault_root() {
        let loc = LocationPolicy::default().resolve("Inbox.md", "c.jpg");
        assert_eq!(loc.folder, "");
        assert_eq!(loc.file_path, "c.jpg");
    }

    #[test]
    fn specified_folder_strips_separators() {
        let loc = policy(LocationOption::Specified, "", "/Assets/Photos\\")
            .resolve("Journal/2024-01-01.md", "d.jpg");
        assert_eq!(loc.folder, "Assets/Photos");
        assert_eq!(loc.file_path, "Assets/Photos/d.jpg");
        assert_eq!(loc.link_path, "Assets/Photos/d.jpg");
    }

    #[test]
    fn link_path_is_encoded_per_segment() {
        let loc = policy(LocationOption::Subfolder, "/my photos/", "")
            .resolve("Notes/Day one.md", "2024 01 01.jpg");
        assert_eq!(loc.folder, "Notes/my photos");
        assert_eq!(loc.link_path, "my%20photos/2024%2001%2001.jpg");
    }

    #[test]
    fn link_path_keeps_uri_punctuation() {
        assert_eq!(encode_path("a(1).jpg"), "a(1).jpg");
        assert_eq!(encode_path("it's!*;,.png"), "it's!*;,.png");
        assert_eq!(encode_path("50% off [x].jpg"), "50%25%20off%20%5Bx%5D.jpg");
        assert_eq!(encode_path("caf\u{e9}/a b.jpg"), "caf%C3%A9/a%20b.jpg");
    }

    #[test]
    fn partial_policy_fills_defaults() {
        let json = r#"{"option":"subfolder","subfolder":"img"}"#;
        let parsed: LocationPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.option, LocationOption::Subfolder);
        assert_eq!(parsed.subfolder, "img");
        assert_eq!(parsed.folder, "");
    }
}
