//! CLI command definitions, routing, and tracing setup.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use pagewright_core::{
    CachedEmbedder, IndexLoader, LoadProgress, Pipeline, PromptStore, VectorIndex,
};
use pagewright_llm::{Embedder, OpenAiClient};
use pagewright_notion::NotionClient;
use pagewright_shared::{
    AppConfig, DatabaseKind, init_config, load_config, load_config_from, read_secret,
    validate_credentials,
};
use pagewright_storage::Storage;

use crate::server::{self, ServerState};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Pagewright: LLM page completion for Notion.
#[derive(Parser)]
#[command(
    name = "pagewright",
    version,
    about = "Complete and edit Notion pages from webhook triggers.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.pagewright/pagewright.toml).
    #[arg(long, global = true, env = "PAGEWRIGHT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Load the vector index and start the webhook listener.
    Serve {
        /// Bind address (overrides `[server] host`).
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides `[server] port`).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Scan the source databases and warm the embedding cache.
    Index {
        /// Drop cached vectors for the configured embedding model first.
        #[arg(long)]
        rebuild: bool,
    },

    /// Embedding cache management.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Show cached vector counts per embedding model.
    Stats,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "pagewright=info",
        1 => "pagewright=debug,tower_http=debug",
        _ => "pagewright=trace,tower_http=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Serve { host, port } => cmd_serve(config_path, host, port).await,
        Command::Index { rebuild } => cmd_index(config_path, rebuild).await,
        Command::Cache { action } => match action {
            CacheAction::Stats => cmd_cache_stats(config_path).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Shared service graph for `serve` and `index`.
struct Services {
    notion: Arc<NotionClient>,
    llm: Arc<OpenAiClient>,
    storage: Arc<Storage>,
    index: Arc<VectorIndex>,
}

impl Services {
    async fn build(config: &AppConfig) -> Result<Self> {
        validate_credentials(config)?;

        let notion_token = read_secret(&config.notion.api_key_env, "Notion API key")?;
        let llm_key = read_secret(&config.llm.api_key_env, "LLM API key")?;

        let notion = Arc::new(NotionClient::new(
            &config.notion,
            config.properties.clone(),
            notion_token,
        )?);
        let llm = Arc::new(OpenAiClient::new(&config.llm, llm_key)?);

        let cache_path = config.storage.resolved_cache_path()?;
        let storage = Arc::new(Storage::open(&cache_path).await?);
        info!(path = %cache_path.display(), "embedding cache opened");

        let embedder = Arc::new(CachedEmbedder::new(llm.clone(), storage.clone()));
        let index = Arc::new(VectorIndex::new(embedder));

        Ok(Self {
            notion,
            llm,
            storage,
            index,
        })
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(config_path: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let services = Services::build(&config).await?;

    let prompts_dir = config.assistant.prompts_dir.as_deref().map(Path::new);
    let prompts = Arc::new(PromptStore::load(prompts_dir)?);

    let loader = IndexLoader::new(services.notion.clone(), &config.notion);
    match loader.load(&services.index, &LogProgress).await {
        Ok(count) => info!(pages = count, "vector index ready"),
        Err(e) => error!(error = %e, "index load failed, related-page context is unavailable"),
    }

    let pipeline = Pipeline::new(
        &config,
        services.notion,
        services.llm,
        services.index,
        prompts,
    )?;
    let state = ServerState::new(Arc::new(pipeline), config.properties.clone());

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| eyre!("invalid bind address '{host}:{port}': {e}"))?;

    server::serve(addr, state).await?;
    Ok(())
}

async fn cmd_index(config_path: Option<&Path>, rebuild: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    let services = Services::build(&config).await?;
    let start = Instant::now();

    if rebuild {
        let removed = services.storage.clear_model(services.llm.model_id()).await?;
        info!(removed, model = services.llm.model_id(), "cleared cached vectors");
    }

    let loader = IndexLoader::new(services.notion.clone(), &config.notion);
    let reporter = CliProgress::new();
    let count = loader.load(&services.index, &reporter).await?;

    println!();
    println!("  Index warmed!");
    println!("  Pages:  {count}");
    println!("  Model:  {}", services.llm.model_id());
    println!("  Time:   {:.1}s", start.elapsed().as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_cache_stats(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let path = config.storage.resolved_cache_path()?;
    let storage = Storage::open_readonly(&path).await?;
    let stats = storage.stats().await?;

    println!("  Cache: {}", path.display());
    if stats.is_empty() {
        println!("  (empty)");
    }
    for entry in stats {
        println!("  {:<32} {:>8}", entry.model_id, entry.entries);
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress reporters
// ---------------------------------------------------------------------------

/// Logs scan progress; used by `serve`, where stdout belongs to the log stream.
struct LogProgress;

impl LoadProgress for LogProgress {
    fn database_listed(&self, kind: DatabaseKind, pages: usize) {
        info!(database = kind.label(), pages, "scanning database");
    }

    fn page_loaded(&self, _title: &str, _current: usize, _total: usize) {}

    fn done(&self, _indexed: usize) {}
}

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        match ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            Ok(style) => spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            ),
            Err(e) => warn!(error = %e, "invalid progress template"),
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl LoadProgress for CliProgress {
    fn database_listed(&self, kind: DatabaseKind, pages: usize) {
        self.spinner
            .set_message(format!("Listed {pages} {} pages", kind.label()));
    }

    fn page_loaded(&self, title: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Reading [{current}/{total}] {title}"));
    }

    fn done(&self, _indexed: usize) {
        self.spinner.finish_and_clear();
    }
}
