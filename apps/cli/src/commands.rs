//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use mediaqa_cache::FileCache;
use mediaqa_core::describer::{DescriberConfig, MediaDescriber};
use mediaqa_core::pipeline::{Capabilities, Pipeline, ProgressReporter, RunReport};
use mediaqa_fetch::Fetcher;
use mediaqa_shared::{
    AppConfig, LlmSettings, MediaKind, MediaReference, PipelineConfig, init_config, load_config,
    load_config_from,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// mediaqa: answer questions about an article and its images and recordings.
#[derive(Parser)]
#[command(
    name = "mediaqa",
    version,
    about = "Describe the media in an article, answer questions about it and submit the report.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file to use instead of ~/.mediaqa/mediaqa.toml.
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
    /// Run the full pipeline and submit the answers.
    Run {
        /// Answer the questions but do not submit them.
        #[arg(long)]
        dry_run: bool,

        /// Override the cache directory.
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },

    /// Describe a single image or transcribe a single recording.
    Describe {
        /// Absolute URL of the asset.
        url: String,

        /// Asset kind: image or audio.
        #[arg(short, long, default_value = "image")]
        kind: MediaKind,

        /// Override the cache directory.
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },

    /// Fetch and print the question feed.
    Questions,

    /// Description cache management.
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
    /// Print the cache directory and entry count.
    Path,
    /// Delete every cached description.
    Clear,
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
        0 => "mediaqa=info",
        1 => "mediaqa=debug",
        _ => "mediaqa=trace",
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
    let config_path = cli.config;
    match cli.command {
        Command::Run { dry_run, cache_dir } => {
            cmd_run(config_path.as_deref(), dry_run, cache_dir).await
        }
        Command::Describe {
            url,
            kind,
            cache_dir,
        } => cmd_describe(config_path.as_deref(), url, kind, cache_dir).await,
        Command::Questions => cmd_questions(config_path.as_deref()).await,
        Command::Cache { action } => match action {
            CacheAction::Path => cmd_cache_path(config_path.as_deref()).await,
            CacheAction::Clear => cmd_cache_clear(config_path.as_deref()).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

/// Load the explicit config file if given, else the default one.
fn load(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>, dry_run: bool, cache_dir: Option<PathBuf>) -> Result<()> {
    let config = load(config_path)?;
    let llm = LlmSettings::resolve(&config.llm)?;
    let mut pipeline_config = PipelineConfig::resolve(&config)?;
    pipeline_config.dry_run = dry_run;
    if let Some(dir) = cache_dir {
        pipeline_config.cache_dir = dir;
    }

    info!(
        task = %pipeline_config.task_name,
        document = %pipeline_config.document_url,
        dry_run,
        "starting pipeline"
    );

    let pipeline = Pipeline::from_settings(pipeline_config, &llm).await?;
    let reporter = CliProgress::new();
    let report = pipeline.run(&reporter).await?;

    print_report(&report);

    match report.submission {
        None => Ok(()),
        Some(Ok(verdict)) if verdict.is_accepted() => Ok(()),
        Some(Ok(verdict)) => Err(eyre!(
            "report rejected (code {}): {}",
            verdict.code.map_or_else(|| "-".to_string(), |c| c.to_string()),
            verdict.message.as_deref().unwrap_or("no message")
        )),
        Some(Err(e)) => Err(e.into()),
    }
}

fn print_report(report: &RunReport) {
    println!();
    println!("  Run:       {}", report.run_id);
    println!(
        "  Media:     {} found, {} described, {} skipped",
        report.media_found,
        report.media.descriptions.len(),
        report.media.skipped.len()
    );
    println!(
        "  Cache:     {} hits, {} misses",
        report.media.cache_hits, report.media.cache_misses
    );
    for skipped in &report.media.skipped {
        println!("  Skipped:   {} ({})", skipped.reference.url, skipped.reason);
    }
    println!();
    for question in &report.questions {
        let key = mediaqa_shared::ordinal_key(question.ordinal);
        println!("  {key}. {}", question.text);
        println!("      {}", report.answers.get(question.ordinal).unwrap_or("-"));
    }
    println!();
    match &report.submission {
        None => println!("  Submission: skipped (dry run)"),
        Some(Ok(verdict)) => println!("  Submission: {}", verdict.raw),
        Some(Err(e)) => println!("  Submission: failed: {e}"),
    }
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

async fn cmd_describe(
    config_path: Option<&Path>,
    url: String,
    kind: MediaKind,
    cache_dir: Option<PathBuf>,
) -> Result<()> {
    let config = load(config_path)?;
    let llm = LlmSettings::resolve(&config.llm)?;
    let cache_dir = cache_dir.unwrap_or_else(|| PathBuf::from(&config.cache.dir));

    let fetcher = Fetcher::with_timeout(Duration::from_secs(config.task.timeout_secs))?;
    let cache = FileCache::open(&cache_dir).await?;
    let capabilities = Capabilities::openai(&llm)?;
    let describer = MediaDescriber::new(
        &fetcher,
        &cache,
        capabilities.vision.as_ref(),
        capabilities.transcription.as_ref(),
        DescriberConfig {
            max_tokens: Some(llm.description_max_tokens),
            ..Default::default()
        },
    );

    let reference = MediaReference {
        url,
        kind,
        caption: None,
    };
    let outcome = describer.describe(&reference).await?;

    info!(cached = outcome.cached, "description ready");
    println!("{}", outcome.description.text);
    Ok(())
}

async fn cmd_questions(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let pipeline_config = PipelineConfig::resolve(&config)?;
    let fetcher = Fetcher::with_timeout(Duration::from_secs(pipeline_config.fetch_timeout_secs))?;

    let raw = fetcher
        .fetch_text(pipeline_config.questions_url.as_str())
        .await?;
    let questions = mediaqa_shared::parse_questions(&raw);
    if questions.is_empty() {
        return Err(eyre!("question feed is empty"));
    }

    for question in &questions {
        let key = mediaqa_shared::ordinal_key(question.ordinal);
        let hint = if pipeline_config.hints.contains_key(&question.ordinal) {
            "  [hint]"
        } else {
            ""
        };
        println!("{key}. {}{hint}", question.text);
    }
    Ok(())
}

async fn cmd_cache_path(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let cache = FileCache::open(Path::new(&config.cache.dir)).await?;
    println!("{} ({} entries)", cache.dir().display(), cache.len().await?);
    Ok(())
}

async fn cmd_cache_clear(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let cache = FileCache::open(Path::new(&config.cache.dir)).await?;
    let removed = cache.clear().await?;
    println!("Removed {removed} cached descriptions from {}", cache.dir().display());
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
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
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn media_described(&self, url: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Describing [{current}/{total}] {url}"));
    }

    fn question_answered(&self, key: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Answering [{current}/{total}] question {key}"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}
