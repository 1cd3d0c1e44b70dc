use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use doc_model::Note;
use pdf_engine::{default_engine, PdfEngine};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};
use storage::ConfigStore;
use viewer_core::load::{DEFAULT_LOAD_TIMEOUT, DEFAULT_POLL_INTERVAL};
use viewer_core::status::STATUS_REFRESH_INTERVAL;
use viewer_core::tree::EntryKind;
use viewer_core::{FileTree, LoadOptions, LoadProgress, NoteStore, Session, ViewerError, Viewport};

/// When set, `reveal` and `launch` print their target instead of spawning.
pub const NO_SPAWN_ENV: &str = "DATASHEET_EXPLORER_NO_SPAWN";

#[cfg(target_os = "macos")]
const SYSTEM_OPENER: &str = "open";
#[cfg(target_os = "windows")]
const SYSTEM_OPENER: &str = "explorer";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const SYSTEM_OPENER: &str = "xdg-open";

#[derive(Debug, Parser)]
#[command(name = "datasheet-explorer")]
#[command(about = "Browse a folder of datasheets and keep page notes per PDF")]
pub struct Cli {
    /// Config file to use instead of the per-user one.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(flatten)]
    load: LoadArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct LoadArgs {
    /// Give up on a document that is still loading after this long.
    #[arg(long, global = true, value_name = "MS")]
    timeout_ms: Option<u64>,
    /// Interval between load status checks.
    #[arg(long, global = true, value_name = "MS")]
    poll_ms: Option<u64>,
}

impl LoadArgs {
    fn options(&self) -> LoadOptions {
        LoadOptions {
            poll_interval: self.poll_ms.map(Duration::from_millis).unwrap_or(DEFAULT_POLL_INTERVAL),
            timeout: self.timeout_ms.map(Duration::from_millis).unwrap_or(DEFAULT_LOAD_TIMEOUT),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show or change the root folder.
    Root {
        #[command(subcommand)]
        action: RootAction,
    },
    /// List folders and PDFs under the root folder.
    Tree,
    /// Load a PDF and print the status line.
    Open {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Jump to the page of this note (1-based, as listed by `notes list`).
        #[arg(long, value_name = "N")]
        note: Option<usize>,
        /// Scroll to this fraction of the document, 0.0 to 1.0.
        #[arg(long, value_name = "F")]
        scroll: Option<f64>,
        /// Zoom in (positive) or out (negative) this many steps.
        #[arg(long, value_name = "K", default_value_t = 0, allow_hyphen_values = true)]
        zoom_steps: i32,
    },
    /// Manage the notes of a PDF.
    Notes {
        #[command(subcommand)]
        action: NotesAction,
    },
    /// Open the root folder in the system file manager.
    Reveal,
    /// Open a PDF in the system viewer.
    Launch {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Subcommand)]
enum RootAction {
    Show,
    Set {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    Clear,
}

#[derive(Debug, Subcommand)]
enum NotesAction {
    List {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    Add {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        page: u32,
        #[arg(long)]
        text: String,
    },
    Edit {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        index: usize,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        text: Option<String>,
    },
    Remove {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        index: usize,
    },
}

#[derive(Debug, Serialize)]
struct NotesOutput {
    key: String,
    page_count: Option<u32>,
    notes: Vec<NoteOutput>,
}

#[derive(Debug, Serialize)]
struct NoteOutput {
    index: usize,
    page: u32,
    text: String,
}

type ViewerSession = Session<Box<dyn PdfEngine>, Viewport>;

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match &cli.command {
        Commands::Root { action } => run_root(&cli, action),
        Commands::Tree => run_tree(&cli),
        Commands::Open { file, note, scroll, zoom_steps } => {
            run_open(&cli, file, *note, *scroll, *zoom_steps)
        }
        Commands::Notes { action } => run_notes(&cli, action),
        Commands::Reveal => run_reveal(&cli),
        Commands::Launch { file } => run_launch(file),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn config_store(cli: &Cli) -> Result<ConfigStore> {
    match &cli.config {
        Some(path) => Ok(ConfigStore::at(path)),
        None => ConfigStore::from_env_or_default().context("failed to locate config file"),
    }
}

fn note_store(cli: &Cli) -> Result<NoteStore> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    Ok(NoteStore::open(config_store(cli)?, &cwd))
}

fn session(cli: &Cli) -> Result<ViewerSession> {
    let engine =
        default_engine().map_err(|err| ViewerError::EngineUnavailable(err.to_string()))?;
    Ok(Session::new(engine, Viewport::new(), note_store(cli)?, cli.load.options()))
}

/// Opens `file` and drives the poll timer until the load settles.
fn open_and_wait(session: &mut ViewerSession, file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut progress = session.open_document(file)?;
    let mut next_refresh = Instant::now() + STATUS_REFRESH_INTERVAL;

    while progress == LoadProgress::Pending {
        thread::sleep(session.poll_interval());
        progress = session.poll()?;

        if Instant::now() >= next_refresh {
            log::debug!("{}", session.status_text());
            next_refresh += STATUS_REFRESH_INTERVAL;
        }
    }

    Ok(())
}

fn report_warning(session: &mut ViewerSession) {
    if let Some(warning) = session.take_warning() {
        eprintln!("warning: {warning}");
    }
}

fn run_root(cli: &Cli, action: &RootAction) -> Result<()> {
    let mut store = note_store(cli)?;

    match action {
        RootAction::Show => match store.root() {
            Some(root) => println!("{}", root.display()),
            None => println!("Welcome. Select a root folder."),
        },
        RootAction::Set { dir } => {
            store.set_root(dir)?;
            if let Some(root) = store.root() {
                println!("{}", root.display());
            }
        }
        RootAction::Clear => store.clear_root(),
    }

    if let Some(warning) = store.take_warning() {
        eprintln!("warning: {warning}");
    }

    Ok(())
}

fn run_tree(cli: &Cli) -> Result<()> {
    let store = note_store(cli)?;
    let root = store
        .root()
        .context("no root folder set; run `datasheet-explorer root set <DIR>` first")?;
    let tree = FileTree::scan(root)?;

    println!("{}", tree.root().display());
    for entry in tree.entries() {
        let indent = "  ".repeat(entry.depth + 1);
        match entry.kind {
            EntryKind::Directory => println!("{indent}{}/", entry.name),
            EntryKind::Document => println!("{indent}{}", entry.name),
        }
    }

    Ok(())
}

fn run_open(
    cli: &Cli,
    file: &Path,
    note: Option<usize>,
    scroll: Option<f64>,
    zoom_steps: i32,
) -> Result<()> {
    let mut session = session(cli)?;
    open_and_wait(&mut session, file)?;

    for _ in 0..zoom_steps.unsigned_abs() {
        if zoom_steps > 0 {
            session.zoom_in();
        } else {
            session.zoom_out();
        }
    }

    if let Some(fraction) = scroll {
        session.scroll_to_fraction(fraction);
    }

    if let Some(number) = note {
        let index = note_index(number, session.notes()?.len())?;
        session.jump_to_note(index)?;
    }

    println!("{}", session.status_text());
    for (index, note) in session.notes()?.iter().enumerate() {
        println!("  {}. {}", index + 1, note.label());
    }

    report_warning(&mut session);
    session.shutdown();
    Ok(())
}

fn run_notes(cli: &Cli, action: &NotesAction) -> Result<()> {
    let mut session = session(cli)?;

    match action {
        NotesAction::List { file, json } => {
            open_and_wait(&mut session, file)?;
            let notes = session.notes()?;

            if *json {
                let payload = NotesOutput {
                    key: notes_key(&session),
                    page_count: session.page_count(),
                    notes: notes
                        .iter()
                        .enumerate()
                        .map(|(index, note)| NoteOutput {
                            index: index + 1,
                            page: note.page.get(),
                            text: note.text.clone(),
                        })
                        .collect(),
                };
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else if notes.is_empty() {
                println!("No notes for {}.", notes_key(&session));
            } else {
                for (index, note) in notes.iter().enumerate() {
                    println!("{}. {}", index + 1, note.label());
                }
            }
        }
        NotesAction::Add { file, page, text } => {
            open_and_wait(&mut session, file)?;
            let note = session.add_note(*page, text)?;
            println!("added: {}", note.label());
        }
        NotesAction::Edit { file, index, page, text } => {
            open_and_wait(&mut session, file)?;
            let index = note_index(*index, session.notes()?.len())?;
            let current: Option<Note> = session.notes()?.get(index).cloned();

            let page = page.or(current.as_ref().map(|note| note.page.get())).unwrap_or(1);
            let text = text.as_deref().or(current.as_ref().map(|note| note.text.as_str()));
            let text = text.unwrap_or_default().to_owned();

            session.edit_note(index, page, &text)?;
            let edited = session.notes()?.get(index).map(Note::label).unwrap_or_default();
            println!("edited: {edited}");
        }
        NotesAction::Remove { file, index } => {
            open_and_wait(&mut session, file)?;
            let index = note_index(*index, session.notes()?.len())?;
            let removed = session.remove_note(index)?;
            println!("removed: {}", removed.label());
        }
    }

    report_warning(&mut session);
    session.shutdown();
    Ok(())
}

fn notes_key(session: &ViewerSession) -> String {
    session
        .current_document()
        .map(|path| session.note_store().key_for(path).to_string())
        .unwrap_or_default()
}

/// Command-line note numbers are 1-based; `0` selects nothing.
fn note_index(number: usize, len: usize) -> Result<usize, ViewerError> {
    number.checked_sub(1).ok_or(ViewerError::NoteIndexInvalid { index: 0, len })
}

/// Reveals the root folder, or the working directory when no root is set.
fn run_reveal(cli: &Cli) -> Result<()> {
    let store = note_store(cli)?;
    let target = match store.root() {
        Some(root) => root.to_path_buf(),
        None => std::env::current_dir().context("failed to read current directory")?,
    };

    system_open("reveal", &target)
}

fn run_launch(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;
    let file = std::path::absolute(file).unwrap_or_else(|_| file.to_path_buf());

    system_open("launch", &file)
}

fn system_open(action: &str, target: &Path) -> Result<()> {
    if std::env::var_os(NO_SPAWN_ENV).is_some() {
        println!("{action}:{}", target.display());
        return Ok(());
    }

    Command::new(SYSTEM_OPENER)
        .arg(target)
        .spawn()
        .with_context(|| format!("failed to launch {SYSTEM_OPENER} for {}", target.display()))?;

    Ok(())
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
