use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use intake_cli::app;
use intake_core::config;
use intake_core::config::AppConfig;
use intake_core::rules;
use intake_core::scheduler;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = config::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Commands::Run => run_poller(cfg).await,
        Commands::Scan { json } => run_scan(cfg, json).await,
        Commands::Rules { json } => run_rules(cfg, json).await,
        Commands::Classify { names } => run_classify(cfg, names).await,
        Commands::SeedRules { file } => run_seed(cfg, file).await,
    }
}

#[derive(Parser)]
#[command(name = "intake")]
#[command(about = "Polls a directory tree and records newly arrived files by type", long_about = None)]
struct Cli {
    /// Path to config file (TOML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan on the configured interval until interrupted
    Run,
    /// Run a single scan cycle
    Scan {
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// List the current prefix rules in match order
    Rules {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which type id each filename would be assigned
    Classify {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Insert or update prefix rules from a TOML file of [[rule]] tables
    SeedRules { file: PathBuf },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_poller(cfg: AppConfig) -> Result<()> {
    let store = app::open_store(&cfg).await?;
    let orchestrator = app::build_orchestrator(&cfg, store.clone())?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            return;
        }
        signal_token.cancel();
    });

    info!(
        root = %cfg.scan.root,
        interval_secs = cfg.scan.interval_secs,
        "Watching for new files"
    );
    let cycles = scheduler::run_periodic(&orchestrator, cfg.scan.interval(), shutdown).await;
    store.pool().close().await;
    info!(cycles, "Poller stopped");
    Ok(())
}

async fn run_scan(cfg: AppConfig, json: bool) -> Result<()> {
    let store = app::open_store(&cfg).await?;
    let orchestrator = app::build_orchestrator(&cfg, store.clone())?;
    let result = orchestrator.run_cycle().await;
    store.pool().close().await;
    let summary = result?;
    println!("{}", app::render_summary(&summary, json)?);
    Ok(())
}

async fn run_rules(cfg: AppConfig, json: bool) -> Result<()> {
    let store = app::open_store(&cfg).await?;
    let rules = rules::load_rules(store.as_ref()).await?;
    println!("{}", app::render_rules(&rules, json)?);
    Ok(())
}

async fn run_classify(cfg: AppConfig, names: Vec<String>) -> Result<()> {
    let store = app::open_store(&cfg).await?;
    let rules = rules::load_rules(store.as_ref()).await?;
    for name in names {
        println!("{}", app::render_classification(&name, rules.classify(&name)));
    }
    Ok(())
}

async fn run_seed(cfg: AppConfig, file: PathBuf) -> Result<()> {
    let seed = rules::load_seed_file(&file)
        .with_context(|| format!("Failed to read rules from {}", file.display()))?;
    let store = app::open_store(&cfg).await?;
    let inserted = rules::seed_rules(store.as_ref(), &seed).await?;
    println!(
        "seeded {} rule(s): {} new, {} updated",
        seed.len(),
        inserted,
        seed.len() - inserted
    );
    Ok(())
}
