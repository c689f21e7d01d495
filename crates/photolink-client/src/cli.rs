//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::host::Cursor;

/// photolink - link Google Photos into your Markdown notes
#[derive(Debug, Parser)]
#[command(name = "photolink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "PHOTOLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Vault root directory (overrides `vault` in config.toml)
    #[arg(long, env = "PHOTOLINK_VAULT")]
    pub vault: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in to Google Photos
    Auth(AuthArgs),

    /// Browse the library and insert a photo into a note
    Browse {
        #[command(flatten)]
        target: NoteTarget,

        /// Start with the whole library instead of the note's date
        #[arg(long)]
        all: bool,

        /// A `photos` code block body: `today`, `notedate`, or a JSON search
        #[arg(long, conflicts_with = "all")]
        query: Option<String>,
    },

    /// Select photos in the Google Photos picker and insert one into a note
    Pick {
        #[command(flatten)]
        target: NoteTarget,
    },

    /// List albums
    Albums,

    /// Insert a `photos` code block for an album into a note
    InsertAlbum {
        #[command(flatten)]
        target: NoteTarget,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Args)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub action: Option<AuthAction>,

    /// OAuth client ID (from Google Cloud Console)
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth client secret (from Google Cloud Console)
    #[arg(long, env = "GOOGLE_CLIENT_SECRET")]
    pub client_secret: Option<String>,

    /// Path to the Google Cloud Console credentials JSON file
    #[arg(long, env = "GOOGLE_CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,

    /// Sign in again even if the stored tokens are still valid
    #[arg(long, short)]
    pub force: bool,
}

#[derive(Debug, Subcommand)]
pub enum AuthAction {
    /// Finish a proxy sign-in with the code (or redirect URL) handed back
    /// by the relay page
    Callback { response: String },

    /// Forget stored tokens
    Logout,
}

/// The note to insert into.
#[derive(Debug, Args)]
pub struct NoteTarget {
    /// Note file, relative to the vault root
    pub note: PathBuf,

    /// Insert position as LINE:CH (0-based); defaults to the end of the note
    #[arg(long, value_parser = parse_cursor)]
    pub at: Option<Cursor>,
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

fn parse_cursor(value: &str) -> Result<Cursor, String> {
    let (line, ch) = value.split_once(':').unwrap_or((value, "0"));
    let line = line
        .trim()
        .parse()
        .map_err(|_| format!("invalid line in `{value}`"))?;
    let ch = ch
        .trim()
        .parse()
        .map_err(|_| format!("invalid character offset in `{value}`"))?;
    Ok(Cursor::new(line, ch))
}
