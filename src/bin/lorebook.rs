//! Lorebook CLI: build and inspect wikis.
//!
//! Usage:
//!   lorebook build --config lotm.yaml --books ./books [--db path]
//!   lorebook flush --config lotm.yaml [--all]
//!   lorebook status [name]
//!   lorebook export <name> <dir> [--snapshot file]
//!   lorebook import <name> <dir>
//!   lorebook delete <name>

use clap::{Parser, Subcommand, ValueEnum};
use lorebook::agent::CommandAgent;
use lorebook::processor::{ChunkError, ChunkId};
use lorebook::wiki::render;
use lorebook::{
    BuildConfig, CancellationToken, Chunk, ChunkProcessor, FailureDecision, KnowledgeTree,
    OpenStore, SessionState, SqliteStore, WikiBuilder, WikiStore,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "lorebook", version, about = "Incrementally build a wiki from a book series")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum OnFailure {
    /// Stop the build at the failed chunk
    Halt,
    /// Record the chunk as skipped and continue
    Skip,
}

#[derive(Subcommand)]
enum Commands {
    /// Process books into the wiki, resuming a stored session if present
    Build {
        /// Build configuration (YAML)
        #[arg(long)]
        config: PathBuf,
        /// Directory of .txt books
        #[arg(long)]
        books: PathBuf,
        /// Discard any stored wiki of the same name first
        #[arg(long)]
        fresh: bool,
        /// Extra passes over a chunk whose extraction failed
        #[arg(long, default_value_t = 0)]
        chunk_retries: u32,
        /// What to do once a chunk's retries are spent
        #[arg(long, value_enum, default_value = "halt")]
        on_failure: OnFailure,
    },
    /// Consolidate pending buffers
    Flush {
        /// Build configuration (YAML)
        #[arg(long)]
        config: PathBuf,
        /// Consolidate every non-empty buffer, not only those due
        #[arg(long)]
        all: bool,
    },
    /// Show stored wikis, or one wiki's progress
    Status {
        /// Wiki name
        name: Option<String>,
    },
    /// Write a wiki as markdown pages
    Export {
        /// Wiki name
        name: String,
        /// Output directory
        dir: PathBuf,
        /// Also write a JSON snapshot of tree and session
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Restore attribute data from markdown pages
    Import {
        /// Wiki name
        name: String,
        /// Directory written by `export`
        dir: PathBuf,
    },
    /// Delete a stored wiki
    Delete {
        /// Wiki name
        name: String,
    },
}

/// Get the default database path (~/.local/share/lorebook/lorebook.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("lorebook").join("lorebook.db")
}

fn open_store(db: Option<PathBuf>) -> Result<SqliteStore, String> {
    let db_path = db.unwrap_or_else(default_db_path);
    SqliteStore::open(&db_path)
        .map_err(|e| format!("Failed to open database {}: {}", db_path.display(), e))
}

fn load_wiki(store: &SqliteStore, name: &str) -> Result<(KnowledgeTree, SessionState), String> {
    match store.load(name) {
        Ok(Some(wiki)) => Ok(wiki),
        Ok(None) => Err(format!("wiki '{}' not found", name)),
        Err(e) => Err(e.to_string()),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn block_on<F: std::future::Future<Output = i32>>(fut: F) -> i32 {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(fut),
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            1
        }
    }
}

fn processor_for(config: &BuildConfig) -> Result<ChunkProcessor, String> {
    if config.agent.command.is_empty() {
        return Err("agent.command is not set in the config".to_string());
    }
    let agent = CommandAgent::new(&config.agent.command, config.agent.args.clone());
    Ok(ChunkProcessor::new(Arc::new(agent), config.retry_policy()))
}

async fn cmd_build(
    store: SqliteStore,
    config: &BuildConfig,
    books: &Path,
    fresh: bool,
    chunk_retries: u32,
    on_failure: OnFailure,
) -> i32 {
    let processor = match processor_for(config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let chunks: Vec<Chunk> = match lorebook::ingest::load_chunks(books, config.ingest.chunk_words) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    if fresh {
        if let Err(e) = store.delete(&config.wiki_name) {
            eprintln!("Error: {}", e);
            return 1;
        }
    }

    let (mut tree, mut session) = match store.load(&config.wiki_name) {
        Ok(Some((tree, session))) => {
            println!(
                "Resuming '{}' (session {}, {} chunks done)",
                tree.name, session.id, session.chunks_done
            );
            let context = session
                .context
                .clone()
                .with_limits(config.context.window, config.context.max_summary_chars);
            (tree, SessionState { context, ..session })
        }
        Ok(None) => match config.build_tree() {
            Ok(tree) => (tree, SessionState::new(config.running_context())),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let cancel = CancellationToken::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling after the current stage...");
            handle.cancel();
        }
    });

    let builder = WikiBuilder::new(processor.with_cancellation(cancel))
        .with_store(Arc::new(store), config.checkpoint_every);

    let mut failures: HashMap<ChunkId, u32> = HashMap::new();
    let policy = |chunk: &Chunk, err: &ChunkError| {
        let count = failures.entry(chunk.id()).or_insert(0);
        *count += 1;
        if *count <= chunk_retries {
            return FailureDecision::Retry;
        }
        eprintln!("Chunk failed: {}", err);
        match on_failure {
            OnFailure::Halt => FailureDecision::Halt,
            OnFailure::Skip => FailureDecision::Skip,
        }
    };

    match builder.run(&mut tree, &mut session, chunks, policy).await {
        Ok(summary) => {
            println!(
                "Processed {} chunks ({} already done, {} skipped), {} operations, {} rejected, \
                 {} consolidations ({} failed)",
                summary.processed,
                summary.already_done,
                summary.skipped.len(),
                summary.operations_applied,
                summary.rejections,
                summary.consolidations,
                summary.consolidation_failures
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_flush(store: SqliteStore, config: &BuildConfig, all: bool) -> i32 {
    let processor = match processor_for(config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let (mut tree, session) = match load_wiki(&store, &config.wiki_name) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let report = WikiBuilder::new(processor).flush(&mut tree, all).await;
    for (path, err) in &report.failures {
        eprintln!("Warning: {}: {}", path, err);
    }
    if let Err(e) = store.save(&tree, &session) {
        eprintln!("Error: {}", e);
        return 1;
    }
    println!(
        "Consolidated {} attributes ({} failed)",
        report.consolidated.len(),
        report.failures.len()
    );
    if report.failures.is_empty() {
        0
    } else {
        1
    }
}

fn cmd_status(store: &SqliteStore, name: Option<&str>) -> i32 {
    let Some(name) = name else {
        return match store.list() {
            Ok(names) if names.is_empty() => {
                println!("No wikis stored.");
                0
            }
            Ok(names) => {
                for name in names {
                    println!("{}", name);
                }
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        };
    };

    let (tree, session) = match load_wiki(store, name) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    println!("Wiki:        {}", tree.name);
    println!("Session:     {} (started {})", session.id, session.started_at.to_rfc3339());
    match session.cursor {
        Some(cursor) => println!("Cursor:      {}", cursor),
        None => println!("Cursor:      (nothing processed)"),
    }
    println!("Chunks done: {}", session.chunks_done);
    if !session.skipped.is_empty() {
        let skipped: Vec<String> = session.skipped.iter().map(ToString::to_string).collect();
        println!("Skipped:     {}", skipped.join(", "));
    }
    println!("Context:     {} of {} summaries", session.context.len(), session.context.window());
    println!();
    println!("{:<24}  {:>8}  {:>8}", "SECTION", "ENTITIES", "PENDING");
    println!("{}", "-".repeat(44));
    for section in tree.sections() {
        let pending: u32 = section.entities().map(|e| e.pending_total()).sum();
        println!("{:<24}  {:>8}  {:>8}", section.name(), section.entity_count(), pending);
    }
    0
}

fn cmd_export(store: &SqliteStore, name: &str, dir: &Path, snapshot: Option<&Path>) -> i32 {
    let (tree, session) = match load_wiki(store, name) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let pages = match render::export_markdown(&tree, dir) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    println!("Wrote {} pages to {}", pages, dir.display());

    if let Some(path) = snapshot {
        let written = lorebook::to_blob(&tree, &session)
            .map_err(|e| e.to_string())
            .and_then(|blob| std::fs::write(path, blob).map_err(|e| e.to_string()));
        if let Err(e) = written {
            eprintln!("Error: cannot write snapshot {}: {}", path.display(), e);
            return 1;
        }
        println!("Wrote snapshot to {}", path.display());
    }
    0
}

fn cmd_import(store: &SqliteStore, name: &str, dir: &Path) -> i32 {
    let (mut tree, session) = match load_wiki(store, name) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let restored = match render::import_markdown(&mut tree, dir) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if let Err(e) = store.save(&tree, &session) {
        eprintln!("Error: {}", e);
        return 1;
    }
    println!("Restored {} pages into '{}'", restored, name);
    0
}

fn cmd_delete(store: &SqliteStore, name: &str) -> i32 {
    match store.delete(name) {
        Ok(true) => {
            println!("Deleted wiki '{}'", name);
            0
        }
        Ok(false) => {
            eprintln!("Error: wiki '{}' not found", name);
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn load_config(path: &Path) -> Result<BuildConfig, i32> {
    BuildConfig::load(path).map_err(|e| {
        eprintln!("Error: {}", e);
        1
    })
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let store = match open_store(cli.db) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Build {
            config,
            books,
            fresh,
            chunk_retries,
            on_failure,
        } => match load_config(&config) {
            Ok(config) => block_on(cmd_build(
                store,
                &config,
                &books,
                fresh,
                chunk_retries,
                on_failure,
            )),
            Err(code) => code,
        },
        Commands::Flush { config, all } => match load_config(&config) {
            Ok(config) => block_on(cmd_flush(store, &config, all)),
            Err(code) => code,
        },
        Commands::Status { name } => cmd_status(&store, name.as_deref()),
        Commands::Export { name, dir, snapshot } => {
            cmd_export(&store, &name, &dir, snapshot.as_deref())
        }
        Commands::Import { name, dir } => cmd_import(&store, &name, &dir),
        Commands::Delete { name } => cmd_delete(&store, &name),
    };
    std::process::exit(code);
}
