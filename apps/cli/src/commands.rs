//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use leizilla_connectors::{Connector, ConnectorRegistry};
use leizilla_core::{
    CancelFlag, CrawlSummary, Orchestrator, Pipeline, PipelineOptions, PipelineSummary,
    ProgressReporter, StageSummary,
};
use leizilla_publisher::Publisher;
use leizilla_shared::{
    AppConfig, CrawlConfig, ExportFormat, LawFilter, ProcessingStage, init_config, load_config,
    load_config_from,
};
use leizilla_storage::Storage;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Leizilla — crawl, archive and publish Brazilian legislation.
#[derive(Parser)]
#[command(
    name = "leizilla",
    version,
    about = "Crawl Brazilian legal portals, archive the PDFs and publish open datasets.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.leizilla/leizilla.toml).
    #[arg(long, global = true)]
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
    /// Discover laws from a source and store their metadata.
    Discover {
        #[arg(long, default_value = "rondonia")]
        origin: String,

        /// First document to visit (overrides the saved resume marker).
        #[arg(long)]
        start: Option<u64>,

        /// Last document to visit (inclusive).
        #[arg(long)]
        end: Option<u64>,

        /// Maximum pages to visit in this run.
        #[arg(long)]
        max_pages: Option<u32>,
    },

    /// Download PDFs of discovered laws.
    Download {
        #[arg(long, default_value = "rondonia")]
        origin: String,

        #[arg(long, default_value_t = 100)]
        limit: u32,
    },

    /// Upload downloaded PDFs to the Internet Archive.
    Upload {
        #[arg(long, default_value = "rondonia")]
        origin: String,

        #[arg(long, default_value_t = 50)]
        limit: u32,
    },

    /// Fetch OCR text for archived laws.
    FetchText {
        #[arg(long, default_value = "rondonia")]
        origin: String,

        #[arg(long, default_value_t = 100)]
        limit: u32,
    },

    /// Export a dataset file, optionally publishing it.
    Export {
        #[arg(long, default_value = "rondonia")]
        origin: String,

        /// Restrict to one year (defaults to the complete dataset).
        #[arg(long)]
        year: Option<i32>,

        /// parquet or jsonl.
        #[arg(long, default_value = "parquet")]
        format: ExportFormat,

        /// Upload the dataset and write its manifest.
        #[arg(long)]
        publish: bool,
    },

    /// Discover, download, archive, fetch text and export in one run.
    Pipeline {
        #[arg(long, default_value = "rondonia")]
        origin: String,

        #[arg(long)]
        start: Option<u64>,

        #[arg(long)]
        end: Option<u64>,

        #[arg(long)]
        max_pages: Option<u32>,

        /// Per-stage item limit.
        #[arg(long, default_value_t = 100)]
        limit: u32,

        #[arg(long, default_value = "parquet")]
        format: ExportFormat,

        /// Skip Internet Archive upload and OCR text.
        #[arg(long)]
        no_archive: bool,

        /// Skip the dataset export.
        #[arg(long)]
        no_export: bool,
    },

    /// Search stored laws.
    Search {
        #[arg(long)]
        origin: Option<String>,

        #[arg(long)]
        year: Option<i32>,

        /// Text to look for in the law body (accent and case insensitive).
        #[arg(long)]
        text: Option<String>,

        #[arg(long)]
        stage: Option<ProcessingStage>,

        #[arg(long, default_value_t = 20)]
        limit: u32,

        /// Print one JSON object per line.
        #[arg(long)]
        json: bool,
    },

    /// Show database statistics.
    Stats,

    /// Show crawl state (resume marker, last run) per origin.
    State {
        #[arg(long)]
        origin: Option<String>,
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

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leizilla=info",
        1 => "leizilla=debug",
        _ => "leizilla=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
        command => {
            let config = resolve_config(config_path.as_deref())?;
            dispatch(command, &config).await
        }
    }
}

async fn dispatch(command: Command, config: &AppConfig) -> Result<()> {
    match command {
        Command::Discover {
            origin,
            start,
            end,
            max_pages,
        } => cmd_discover(config, &origin, crawl_config(config, start, end, max_pages)).await,
        Command::Download { origin, limit } => cmd_download(config, &origin, limit).await,
        Command::Upload { origin, limit } => cmd_upload(config, &origin, limit).await,
        Command::FetchText { origin, limit } => cmd_fetch_text(config, &origin, limit).await,
        Command::Export {
            origin,
            year,
            format,
            publish,
        } => cmd_export(config, &origin, year, format, publish).await,
        Command::Pipeline {
            origin,
            start,
            end,
            max_pages,
            limit,
            format,
            no_archive,
            no_export,
        } => {
            let options = PipelineOptions {
                limit,
                archive: !no_archive,
                fetch_text: !no_archive,
                export: (!no_export).then_some(format),
            };
            cmd_pipeline(config, &origin, crawl_config(config, start, end, max_pages), &options).await
        }
        Command::Search {
            origin,
            year,
            text,
            stage,
            limit,
            json,
        } => {
            let filter = LawFilter {
                origin,
                year,
                text,
                stage,
                limit: Some(limit),
                ..LawFilter::default()
            };
            cmd_search(config, &filter, json).await
        }
        Command::Stats => cmd_stats(config).await,
        Command::State { origin } => cmd_state(config, origin.as_deref()).await,
        Command::Config { .. } => Err(eyre!("config is handled before loading")),
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

fn crawl_config(
    config: &AppConfig,
    start: Option<u64>,
    end: Option<u64>,
    max_pages: Option<u32>,
) -> CrawlConfig {
    let mut crawl = CrawlConfig::from(config);
    crawl.start = start;
    crawl.end = end;
    if let Some(max_pages) = max_pages {
        crawl.max_pages = max_pages;
    }
    crawl
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let storage = Storage::open_with(&config.paths.db_path, &config.storage).await?;
    Ok(storage)
}

async fn open_storage_readonly(config: &AppConfig) -> Result<Storage> {
    let storage = Storage::open_readonly(&config.paths.db_path).await?;
    Ok(storage)
}

fn connector_for(config: &AppConfig, origin: &str) -> Result<Arc<dyn Connector>> {
    let registry = ConnectorRegistry::with_defaults(config)?;
    Ok(registry.require(origin)?)
}

/// Cancel flag tripped by the first Ctrl-C.
fn install_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current step");
            flag.cancel();
        }
    });
    cancel
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_discover(config: &AppConfig, origin: &str, crawl: CrawlConfig) -> Result<()> {
    let connector = connector_for(config, origin)?;
    let storage = open_storage(config).await?;
    let cancel = install_ctrl_c();

    info!(origin, "discovering laws");
    let reporter = CliProgress::new();
    let summary = Orchestrator::new(&storage, crawl, cancel)
        .run(connector.as_ref(), &reporter)
        .await;
    reporter.finish();

    let summary = summary?;
    print_crawl(&summary);
    Ok(())
}

async fn cmd_download(config: &AppConfig, origin: &str, limit: u32) -> Result<()> {
    let connector = connector_for(config, origin)?;
    let storage = open_storage(config).await?;
    let publisher = Publisher::from_config(config)?;
    let reporter = CliProgress::new();

    let summary = Pipeline::new(
        &storage,
        &publisher,
        &config.paths.downloads_dir,
        config.text.clone(),
        install_ctrl_c(),
        &reporter,
    )
    .download_pending(connector, limit, config.crawler.download_concurrency)
    .await;
    reporter.finish();

    print_stage("Downloads", &summary?);
    Ok(())
}

async fn cmd_upload(config: &AppConfig, origin: &str, limit: u32) -> Result<()> {
    let storage = open_storage(config).await?;
    let publisher = Publisher::from_config(config)?;
    let reporter = CliProgress::new();

    let summary = Pipeline::new(
        &storage,
        &publisher,
        &config.paths.downloads_dir,
        config.text.clone(),
        install_ctrl_c(),
        &reporter,
    )
    .archive_pending(origin, limit)
    .await;
    reporter.finish();

    print_stage("Uploads", &summary?);
    Ok(())
}

async fn cmd_fetch_text(config: &AppConfig, origin: &str, limit: u32) -> Result<()> {
    let storage = open_storage(config).await?;
    let publisher = Publisher::from_config(config)?;
    let reporter = CliProgress::new();

    let summary = Pipeline::new(
        &storage,
        &publisher,
        &config.paths.downloads_dir,
        config.text.clone(),
        install_ctrl_c(),
        &reporter,
    )
    .extract_text_pending(origin, limit)
    .await;
    reporter.finish();

    print_stage("OCR text", &summary?);
    Ok(())
}

async fn cmd_export(
    config: &AppConfig,
    origin: &str,
    year: Option<i32>,
    format: ExportFormat,
    publish: bool,
) -> Result<()> {
    let storage = open_storage_readonly(config).await?;
    let publisher = Publisher::from_config(config)?;

    let outcome = publisher.export_dataset(&storage, origin, year, format).await?;
    println!();
    println!("  Dataset exported");
    println!("  Rows:  {}", outcome.rows);
    println!("  Path:  {}", outcome.path.display());

    if publish {
        let item = publisher.upload_dataset(&outcome.path, origin, year).await?;
        let manifest = publisher.write_manifest(origin, year, publisher.exports_dir())?;
        println!("  Item:      {}", item.details_url);
        println!("  Download:  {}", item.download_url);
        println!("  Manifest:  {}", manifest.display());
    }
    println!();
    Ok(())
}

async fn cmd_pipeline(
    config: &AppConfig,
    origin: &str,
    crawl: CrawlConfig,
    options: &PipelineOptions,
) -> Result<()> {
    let connector = connector_for(config, origin)?;
    let storage = open_storage(config).await?;
    let publisher = Publisher::from_config(config)?;
    let reporter = CliProgress::new();

    let summary = Pipeline::new(
        &storage,
        &publisher,
        &config.paths.downloads_dir,
        config.text.clone(),
        install_ctrl_c(),
        &reporter,
    )
    .run(connector, crawl, options)
    .await;
    reporter.finish();

    print_pipeline(&summary?);
    Ok(())
}

async fn cmd_search(config: &AppConfig, filter: &LawFilter, json: bool) -> Result<()> {
    let storage = open_storage_readonly(config).await?;
    let laws = storage.query_laws(filter).await?;

    if json {
        for law in &laws {
            println!("{}", serde_json::to_string(law)?);
        }
        return Ok(());
    }

    if laws.is_empty() {
        println!("No laws found.");
        return Ok(());
    }
    for law in &laws {
        let date = law
            .publication_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "----------".into());
        println!("{date}  {:<32} [{}] {}", law.id, law.stage, law.title);
    }
    println!("\n{} result(s)", laws.len());
    Ok(())
}

async fn cmd_stats(config: &AppConfig) -> Result<()> {
    let storage = open_storage_readonly(config).await?;
    let stats = storage.stats().await?;

    println!();
    println!("  Laws:       {}", stats.total);
    println!("  With text:  {}", stats.with_text);
    println!();
    println!("  By origin:");
    for (origin, n) in &stats.by_origin {
        println!("    {origin:<16} {n}");
    }
    println!("  By stage:");
    for (stage, n) in &stats.by_stage {
        println!("    {stage:<16} {n}");
    }
    println!("  By status:");
    for (status, n) in &stats.by_status {
        println!("    {status:<16} {n}");
    }
    println!("  By year:");
    for (year, n) in &stats.by_year {
        println!("    {year:<16} {n}");
    }
    println!();
    Ok(())
}

async fn cmd_state(config: &AppConfig, origin: Option<&str>) -> Result<()> {
    let storage = open_storage_readonly(config).await?;
    let states = match origin {
        Some(origin) => storage.get_crawl_state(origin).await?.into_iter().collect(),
        None => storage.list_crawl_states().await?,
    };

    if states.is_empty() {
        println!("No crawl state recorded.");
        return Ok(());
    }
    for state in states {
        println!();
        println!("  Origin:     {}", state.origin);
        println!("  Status:     {}", state.status);
        println!("  Marker:     {}", state.resume_marker.as_deref().unwrap_or("-"));
        println!(
            "  Last run:   {}",
            state
                .last_successful_run_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".into())
        );
        println!("  Discovered: {}", state.last_items_discovered);
        if let Some(err) = &state.last_error {
            println!("  Last error: {err}");
        }
    }
    println!();
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_crawl(summary: &CrawlSummary) {
    println!();
    println!("  Crawl {} ({})", summary.phase, summary.origin);
    println!("  Batches:    {}", summary.batches);
    println!("  Pages:      {} visited, {} failed", summary.pages_visited, summary.failed_pages);
    println!("  Discovered: {}", summary.discovered);
    println!("  Persisted:  {}", summary.persisted);
    println!("  Skipped:    {}", summary.skipped);
    println!("  Marker:     {}", summary.marker.as_deref().unwrap_or("-"));
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

fn print_stage(label: &str, summary: &StageSummary) {
    println!();
    println!(
        "  {label}: {} processed, {} ok, {} failed, {} skipped",
        summary.processed, summary.succeeded, summary.failed, summary.skipped
    );
    println!();
}

fn print_pipeline(summary: &PipelineSummary) {
    print_crawl(&summary.crawl);
    println!("  Downloaded: {}", summary.downloaded());
    println!("  Archived:   {}", summary.archived());
    println!("  With text:  {}", summary.text.succeeded);
    println!("  Failed:     {}", summary.failed());
    println!("  Skipped:    {}", summary.skipped());
    if let Some(export) = &summary.export {
        println!("  Dataset:    {} ({} rows)", export.path.display(), export.rows);
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn batch_persisted(&self, persisted_total: u64, marker: Option<&str>) {
        self.spinner.set_message(format!(
            "Persisted {persisted_total} laws (marker {})",
            marker.unwrap_or("-")
        ));
    }

    fn item_done(&self, id: &str, current: usize, total: usize) {
        self.spinner.set_message(format!("[{current}/{total}] {id}"));
    }
}
