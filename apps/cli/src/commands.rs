//! CLI command definitions, routing, and tracing setup.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use doki_core::{
    Answer, ChatPipeline, IngestConfig, IngestReport, ProgressReporter, build_embedder, ingest,
};
use doki_crawler::Crawler;
use doki_shared::{
    AppConfig, ChatRequest, ChatTurn, CrawlConfig, DokiError, init_config, load_config,
    load_config_from,
};
use doki_storage::{ContentStore, VectorIndex};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{info, warn};
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Doki: ask questions about crawled documentation.
#[derive(Parser)]
#[command(
    name = "doki",
    version,
    about = "Crawl documentation, index it, and answer questions grounded in it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.doki/doki.toml).
    #[arg(long, env = "DOKI_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
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
    /// Crawl a documentation site into the content store.
    Crawl {
        /// Seed URL.
        url: String,

        /// Content store directory (defaults to [paths].content_dir).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Maximum link depth from the seed.
        #[arg(short, long)]
        depth: Option<u32>,
    },

    /// Rebuild the vector index from the content store.
    Ingest {
        /// Content store directory (defaults to [paths].content_dir).
        #[arg(long)]
        source: Option<PathBuf>,

        /// Vector index directory (defaults to [paths].index_dir).
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Answer a single question.
    Ask {
        /// The question. Omit with --json.
        question: Option<String>,

        /// Read a chat request (`{"question", "chat_history"}`) from stdin and
        /// print the JSON response.
        #[arg(long)]
        json: bool,

        /// Number of chunks to retrieve.
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Interactive conversation; history is kept for the session only.
    Chat {
        /// Number of chunks to retrieve.
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Show what the vector index holds.
    Stats {
        /// Vector index directory (defaults to [paths].index_dir).
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
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

const LOG_TARGETS: &[&str] = &[
    "doki_cli",
    "doki_core",
    "doki_crawler",
    "doki_extract",
    "doki_shared",
    "doki_storage",
];

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
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
        Command::Crawl { url, out, depth } => {
            cmd_crawl(&resolve_config(config_path)?, &url, out, depth).await
        }
        Command::Ingest { source, index } => {
            cmd_ingest(&resolve_config(config_path)?, source, index).await
        }
        Command::Ask { question, json, k } => {
            cmd_ask(resolve_config(config_path)?, question, json, k).await
        }
        Command::Chat { k } => cmd_chat(resolve_config(config_path)?, k).await,
        Command::Stats { index } => cmd_stats(&resolve_config(config_path)?, index).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
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

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_crawl(
    config: &AppConfig,
    url: &str,
    out: Option<PathBuf>,
    depth: Option<u32>,
) -> Result<()> {
    let seed = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;

    let mut crawl_config = CrawlConfig::from(config);
    if let Some(depth) = depth {
        crawl_config.depth = depth;
    }
    let out_dir = out.unwrap_or_else(|| config.paths.content_dir.clone());
    let store = ContentStore::new(&out_dir);

    info!(url, depth = crawl_config.depth, out = %out_dir.display(), "starting crawl");

    let spinner = spinner();
    spinner.set_message(format!("Crawling {seed}"));
    let crawler = Crawler::new(crawl_config)?;
    let result = crawler.crawl(&seed, &store).await;
    spinner.finish_and_clear();
    let result = result?;

    for (url, error) in &result.errors {
        warn!(url = %url, error = %error, "page failed");
    }

    println!();
    println!("  Crawl finished.");
    println!("  Saved:   {}", result.pages_saved());
    println!("  Skipped: {}", result.pages_skipped);
    println!("  Errors:  {}", result.errors.len());
    println!("  Store:   {}", out_dir.display());
    println!("  Time:    {:.1}s", result.duration.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_ingest(
    config: &AppConfig,
    source: Option<PathBuf>,
    index: Option<PathBuf>,
) -> Result<()> {
    let mut ingest_config = IngestConfig::from_app_config(config)?;
    if let Some(source) = source {
        ingest_config.content_dir = source;
    }
    if let Some(index) = index {
        ingest_config.index_dir = index;
    }

    let embedder = build_embedder(&config.embedding)?;
    info!(
        source = %ingest_config.content_dir.display(),
        index = %ingest_config.index_dir.display(),
        model = embedder.model_id(),
        "starting ingestion"
    );

    let reporter = CliProgress::new();
    let result = ingest(&ingest_config, embedder.as_ref(), &reporter).await;
    reporter.spinner.finish_and_clear();
    let report = result?;

    println!();
    println!("  Vector index rebuilt.");
    println!("  Pages:     {}", report.pages_found);
    println!("  Documents: {}", report.documents);
    println!("  Skipped:   {}", report.pages_skipped.len());
    println!("  Chunks:    {}", report.chunks);
    println!("  Model:     {}", report.index.model_id.as_deref().unwrap_or("-"));
    println!("  Index:     {}", ingest_config.index_dir.display());
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn open_pipeline(mut config: AppConfig, k: Option<usize>) -> Result<ChatPipeline> {
    if let Some(k) = k {
        config.retrieval.k = k;
    }
    ChatPipeline::open(&config).await.map_err(|e| {
        if e.is_unavailable() {
            eyre!("{e}\n\nThe knowledge base is not available. Run `doki crawl <url>` and `doki ingest` first.")
        } else {
            e.into()
        }
    })
}

async fn cmd_ask(
    config: AppConfig,
    question: Option<String>,
    json: bool,
    k: Option<usize>,
) -> Result<()> {
    if json {
        let mut input = String::new();
        tokio::io::stdin()
            .read_to_string(&mut input)
            .await
            .wrap_err("failed to read chat request from stdin")?;
        let request: ChatRequest =
            serde_json::from_str(&input).wrap_err("invalid chat request JSON")?;

        let pipeline = open_pipeline(config, k).await?;
        let response = pipeline.handle(&request).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let question = question.ok_or_else(|| eyre!("a question is required (or pass --json)"))?;
    let pipeline = open_pipeline(config, k).await?;
    let answer = pipeline.answer(&question, &[]).await?;
    print_answer(&answer);
    Ok(())
}

async fn cmd_chat(config: AppConfig, k: Option<usize>) -> Result<()> {
    let pipeline = open_pipeline(config, k).await?;
    let mut history: Vec<ChatTurn> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Ask about the documentation. Type `exit` or press Ctrl-D to quit.");
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        match pipeline.answer(question, &history).await {
            Ok(answer) => {
                print_answer(&answer);
                history.push(ChatTurn::human(question));
                history.push(ChatTurn::ai(answer.answer));
            }
            Err(e @ DokiError::Generation(_)) => {
                warn!(error = %e, "answer generation failed");
                println!("Sorry, an error occurred while generating the answer. Please try again.");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!();
    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        println!();
        println!("  Sources: {}", answer.sources.join(", "));
    }
}

async fn cmd_stats(config: &AppConfig, index: Option<PathBuf>) -> Result<()> {
    let index_dir = index.unwrap_or_else(|| config.paths.index_dir.clone());
    let index = VectorIndex::open_readonly(&index_dir).await?;
    let stats = index.stats().await?;

    println!();
    println!("  Index:       {}", index.path().display());
    println!("  Records:     {}", stats.record_count);
    println!("  Model:       {}", stats.model_id.as_deref().unwrap_or("-"));
    println!(
        "  Dimension:   {}",
        stats.dimension.map_or_else(|| "-".to_string(), |d| d.to_string())
    );
    println!(
        "  Built:       {}",
        stats.built_at.map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
    );
    println!("  Fingerprint: {}", stats.fingerprint);
    println!();
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    spinner.set_style(style);
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}

/// Ingestion progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self { spinner: spinner() }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_extracted(&self, source: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Extracting [{current}/{total}] {source}"));
    }

    fn chunks_embedded(&self, done: usize, total: usize) {
        self.spinner
            .set_message(format!("Embedding [{done}/{total}] chunks"));
    }

    fn done(&self, _report: &IngestReport) {
        self.spinner.finish_and_clear();
    }
}
