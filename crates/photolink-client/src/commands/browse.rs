//! `browse` and `pick`: show photos page by page and insert the chosen one.

use std::sync::Arc;

use chrono::Local;
use photolink_core::SearchQuery;
use photolink_providers::PhotoSource;
use photolink_providers::google::{PhotosClient, PickerSessionEngine, SystemBrowser};
use tokio::sync::mpsc;
use tracing::debug;

use crate::app;
use crate::cli::NoteTarget;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::host::{Editor, Notifier};
use crate::insert::InsertionHandler;
use crate::modes::{DailyPhotos, PickerMode};
use crate::session::{FetchSession, ScrollSubscription};
use crate::terminal::{StderrNotifier, TerminalView, read_line};
use crate::vault::{FsVault, MarkdownEditor};

/// The note being inserted into, opened in the vault.
struct Target {
    vault: Arc<FsVault>,
    editor: Arc<MarkdownEditor>,
}

impl Target {
    fn open(config: &ClientConfig, target: &NoteTarget) -> ClientResult<Self> {
        let vault = Arc::new(FsVault::new(config.vault_root()));
        let mut editor = MarkdownEditor::open(&vault, &target.note)?;
        if let Some(at) = target.at {
            editor = editor.with_cursor(at);
        }
        Ok(Self {
            vault,
            editor: Arc::new(editor),
        })
    }

    fn handler(&self, config: &ClientConfig, client: Arc<PhotosClient>) -> InsertionHandler {
        InsertionHandler::new(
            self.vault.clone(),
            self.editor.clone(),
            client,
            config.thumbnails.clone(),
            config.location.clone(),
        )
    }
}

/// `photolink browse`.
pub async fn browse(
    config: &ClientConfig,
    target: NoteTarget,
    all: bool,
    codeblock: Option<String>,
) -> ClientResult<()> {
    let note = Target::open(config, &target)?;
    let notifier: Arc<dyn Notifier> = Arc::new(StderrNotifier);
    let today = Local::now().date_naive();

    let active = note.editor.active_note();
    let mut daily =
        DailyPhotos::for_note(config.dates.clone(), active.as_ref(), today, notifier.as_ref());

    let (title, query, toggles) = match codeblock {
        Some(body) => {
            let (title, query) = daily.codeblock_query(&body, today)?;
            (title, query, false)
        }
        None => {
            if all == daily.is_filtered() {
                daily.toggle();
            }
            (daily.label(), daily.query(), true)
        }
    };

    let client = app::connect(config)?;
    let handler = note.handler(config, client.clone());
    println!("{title}");

    let mut grid = Grid::new(client, query, notifier);
    grid.run(&handler, toggles.then_some(&mut daily)).await
}

/// `photolink pick`.
pub async fn pick(config: &ClientConfig, target: NoteTarget) -> ClientResult<()> {
    let note = Target::open(config, &target)?;
    let notifier: Arc<dyn Notifier> = Arc::new(StderrNotifier);

    let google = config.google.to_provider_config()?.with_picker_scope();
    let client = app::photos_client(google)?;
    let handler = note.handler(config, client.clone());

    let mut picker = PickerMode::new(PickerSessionEngine::new(client, Arc::new(SystemBrowser)));
    let result = match picker.pick(notifier.as_ref()).await {
        Ok(source) => {
            let mut grid = Grid::new(Arc::new(source), SearchQuery::all(), notifier);
            grid.run(&handler, None).await
        }
        Err(e) => Err(e),
    };
    picker.close().await;
    result
}

/// A fetch session rendered into the terminal. `m` scrolls to the end and
/// reports it as a scroll event.
struct Grid {
    view: Arc<TerminalView>,
    scrolls: mpsc::Sender<()>,
    subscription: ScrollSubscription,
}

impl Grid {
    fn new(source: Arc<dyn PhotoSource>, query: SearchQuery, notifier: Arc<dyn Notifier>) -> Self {
        let view = Arc::new(TerminalView::new());
        let session = Arc::new(FetchSession::new(
            source,
            query,
            view.clone(),
            view.clone(),
            notifier,
        ));
        let (scrolls, events) = mpsc::channel(1);
        let subscription = session.subscribe(events);
        Self {
            view,
            scrolls,
            subscription,
        }
    }

    fn session(&self) -> &FetchSession {
        self.subscription.session()
    }

    async fn scroll_to_end(&mut self) {
        self.view.scroll_to_end();
        if self.scrolls.send(()).await.is_ok() {
            self.subscription.settled().await;
        }
    }

    /// Reads commands until a photo is inserted or the user quits.
    async fn run(
        &mut self,
        handler: &InsertionHandler,
        mut daily: Option<&mut DailyPhotos>,
    ) -> ClientResult<()> {
        self.session().fetch_more().await;
        self.check_signed_in()?;

        loop {
            let toggle = if daily.is_some() { ", f: toggle date filter" } else { "" };
            eprint!("number: insert, m: more{toggle}, q: quit > ");

            let Some(line) = read_line().await else {
                return Err(ClientError::Cancelled);
            };
            match line.as_str() {
                "q" => return Err(ClientError::Cancelled),
                "" | "m" => {
                    if !self.session().has_more_results() {
                        println!("  No more results.");
                        continue;
                    }
                    self.scroll_to_end().await;
                    self.check_signed_in()?;
                }
                "f" => match daily.as_deref_mut() {
                    Some(mode) => {
                        let query = mode.toggle();
                        println!("{}", mode.label());
                        self.session().reset(Some(query));
                        self.session().fetch_more().await;
                        self.check_signed_in()?;
                    }
                    None => println!("  No date filter here."),
                },
                other => match other.parse::<usize>().ok().and_then(|n| self.view.item(n)) {
                    Some(item) => {
                        self.session().deactivate();
                        let inserted = handler.insert(&item, self.view.as_ref()).await?;
                        println!("Saved {}", inserted.file_path);
                        return Ok(());
                    }
                    None => println!("  No photo numbered `{other}`."),
                },
            }
        }
    }

    fn check_signed_in(&self) -> ClientResult<()> {
        if self.session().is_active() {
            return Ok(());
        }
        debug!("fetch session stopped for lack of credentials");
        Err(ClientError::AuthRequired(
            "sign in with `photolink auth`".to_string(),
        ))
    }
}
