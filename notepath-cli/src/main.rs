//! notepath CLI: index a Markdown vault and explain how two notes connect.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use notepath_core::{EmbeddingSettings, PathFindingSettings, Settings};
use notepath_graph::repository::DocumentRepository;
use notepath_graph::{
    Embedder, EmbeddingClient, FindPathRequest, PathFinder, PathStores, ResponseFormat,
    SqliteStore, index_vault,
};

#[derive(Parser)]
#[command(name = "notepath")]
#[command(author, version, about = "Find and explain paths between notes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index (or re-index) a Markdown vault
    Index {
        /// Vault root directory
        vault: PathBuf,
        /// Skip embeddings; only semantic-free strategies will work
        #[arg(long)]
        no_embed: bool,
    },

    /// Find paths between two notes, given as vault-relative paths
    Find {
        start: String,
        end: String,
        /// Maximum number of paths
        #[arg(short, long)]
        limit: Option<usize>,
        /// Only follow explicit links
        #[arg(long)]
        no_semantic: bool,
        #[arg(long, value_enum, default_value = "narrative")]
        format: OutputFormat,
        /// Skip notes under this folder (repeatable)
        #[arg(long = "exclude-folder")]
        exclude_folders: Vec<String>,
        /// Only cross notes under this folder (repeatable)
        #[arg(long = "include-folder")]
        include_folders: Vec<String>,
        /// Skip this note (repeatable)
        #[arg(long = "exclude")]
        exclude_ids: Vec<String>,
    },

    /// Record that a note was opened; recent notes score higher
    Open { path: String },

    /// Show the configuration file and resolved settings
    Config,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Narrative,
    Structured,
}

impl From<OutputFormat> for ResponseFormat {
    fn from(value: OutputFormat) -> Self {
        match value {
            OutputFormat::Narrative => ResponseFormat::Narrative,
            OutputFormat::Structured => ResponseFormat::Structured,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    notepath_core::load_dotenv();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    init_tracing(&settings.logging.level);

    match cli.command {
        Commands::Index { vault, no_embed } => run_index(&settings, &vault, no_embed).await,
        Commands::Find {
            start,
            end,
            limit,
            no_semantic,
            format,
            exclude_folders,
            include_folders,
            exclude_ids,
        } => {
            let mut request = FindPathRequest::new(start, end);
            request.limit = limit;
            request.include_semantic_paths = no_semantic.then_some(false);
            request.response_format = format.into();
            request.filters.exclude_folders = exclude_folders;
            request.filters.include_folders = include_folders;
            request.filters.exclude_ids = exclude_ids;
            run_find(&settings, request).await
        }
        Commands::Open { path } => run_open(&settings, &path).await,
        Commands::Config => {
            println!("# {}", Settings::config_path()?.display());
            println!("# database: {}", settings.db_path()?.display());
            print!("{}", settings.to_toml()?);
            Ok(())
        }
    }
}

/// `RUST_LOG` wins over the configured level. Logs go to stderr so
/// structured output on stdout stays parseable.
fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn open_store(settings: &Settings) -> Result<SqliteStore, Box<dyn std::error::Error>> {
    let embedding = EmbeddingSettings::from(&settings.embedding);
    let db_path = settings.db_path()?;
    info!(path = %db_path.display(), "opening graph store");
    Ok(SqliteStore::open(&db_path, embedding.dim).await?)
}

async fn run_index(
    settings: &Settings,
    vault: &Path,
    no_embed: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let embedding = EmbeddingSettings::from(&settings.embedding);
    let store = open_store(settings).await?;
    let client = (!no_embed).then(|| EmbeddingClient::new(&embedding));
    let embedder = client.as_ref().map(|c| c as &dyn Embedder);

    let report = index_vault(&embedding, &store, embedder, vault).await?;
    println!(
        "Indexed {} of {} note(s): {} unchanged, {} removed, {} failed, {} embedded, {} unresolved link(s).",
        report.indexed,
        report.scanned,
        report.unchanged,
        report.removed,
        report.failed,
        report.embedded,
        report.unresolved_links
    );
    if report.embedding_failures > 0 {
        println!(
            "{} note(s) could not be embedded; semantic strategies will skip them.",
            report.embedding_failures
        );
    }
    Ok(())
}

async fn run_find(
    settings: &Settings,
    request: FindPathRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(open_store(settings).await?);
    let finder = PathFinder::new(
        PathStores::from_backend(store),
        PathFindingSettings::from(&settings.pathfinding),
    );
    let response = finder.find_path(request).await?;
    println!("{}", response.render()?);
    Ok(())
}

async fn run_open(settings: &Settings, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(settings).await?;
    let Some(meta) = store.get_by_path(path).await? else {
        return Err(format!("note `{path}` is not in the index").into());
    };
    store
        .record_open(&meta.id, Utc::now().timestamp_millis())
        .await?;
    println!("Recorded open of {}", meta.path);
    Ok(())
}
