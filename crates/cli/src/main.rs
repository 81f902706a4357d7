mod args;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docketeer_core::{
    import_legacy_csv, load_config, validate_config, verify_ledger, CommandTrigger, Config,
    ExtractionTrigger, HttpDiscoverySource, HttpFetcher, LedgerStore, LogFormat, NoopTrigger,
    RunOptions, RunOrchestrator, SqliteLedgerStore, LEGACY_METADATA_FILENAME,
};

use args::{Cli, Command};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if tracing::dispatcher::has_been_set() {
            error!("Fatal error: {:#}", e);
        } else {
            eprintln!("Fatal error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    let config_path = cli.paths.config_file(&cwd);
    let mut config = load_config(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("Failed to load config from {:?}", path),
        None => "Failed to load config".to_string(),
    })?;
    cli.paths.apply(&mut config);
    config.paths.make_absolute(&cwd);
    validate_config(&config).context("Configuration validation failed")?;

    init_logging(config.logging.format);
    if let Some(path) = &config_path {
        info!("Configuration loaded from {:?}", path);
    }

    let ledger_path = config.paths.ledger_path();
    let ledger: Arc<dyn LedgerStore> = Arc::new(
        SqliteLedgerStore::open(&ledger_path)
            .with_context(|| format!("Failed to open ledger at {:?}", ledger_path))?,
    );
    info!("Ledger: {:?}", ledger_path);

    match cli.command {
        Command::Run {
            limit,
            skip_extraction,
        } => {
            let options = RunOptions {
                limit,
                skip_extraction,
            };
            run_pipeline(config, ledger, options).await
        }
        Command::ImportLegacy { csv } => {
            let csv = csv
                .map(|path| cwd.join(path))
                .unwrap_or_else(|| config.paths.download_dir.join(LEGACY_METADATA_FILENAME));
            import_legacy(&csv, &config, ledger.as_ref())
        }
        Command::Verify => verify(ledger.as_ref()).await,
        Command::Status => status(ledger.as_ref()),
    }
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let (pretty, json) = match format {
        LogFormat::Pretty => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .init();
}

async fn run_pipeline(config: Config, ledger: Arc<dyn LedgerStore>, options: RunOptions) -> Result<()> {
    let discovery = Arc::new(
        HttpDiscoverySource::new(config.discovery.clone())
            .context("Failed to create discovery client")?,
    );
    let fetcher = Arc::new(HttpFetcher::new(&config.download).context("Failed to create download client")?);

    let trigger: Arc<dyn ExtractionTrigger> = if config.extraction.command.is_empty() {
        Arc::new(NoopTrigger)
    } else {
        info!("Extraction command: {:?}", config.extraction.command);
        Arc::new(CommandTrigger::from_config(
            &config.extraction,
            &config.paths.output_dir,
        ))
    };

    let orchestrator = RunOrchestrator::new(config, ledger, discovery, fetcher, trigger);
    let summary = orchestrator.run(&options).await.context("Run aborted")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn import_legacy(csv: &Path, config: &Config, ledger: &dyn LedgerStore) -> Result<()> {
    let import = import_legacy_csv(csv, &config.paths.download_dir, ledger)
        .with_context(|| format!("Failed to import {:?}", csv))?;
    println!("{}", serde_json::to_string_pretty(&import)?);
    Ok(())
}

async fn verify(ledger: &dyn LedgerStore) -> Result<()> {
    let report = verify_ledger(ledger).await.context("Verification failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_clean() {
        bail!(
            "{} checksum mismatches, {} missing files",
            report.mismatched.len(),
            report.missing.len()
        );
    }
    Ok(())
}

fn status(ledger: &dyn LedgerStore) -> Result<()> {
    let stats = ledger.stats().context("Failed to read ledger")?;
    let latest = ledger.latest_run().context("Failed to read runs")?;

    let latest = latest.map(|run| {
        serde_json::json!({
            "run_id": run.run_id,
            "started_at": run.started_at,
            "finished_at": run.finished_at,
            "download_limit": run.download_limit,
            "downloaded": run.delta.downloaded_count(),
            "backfilled": run.delta.backfilled_count(),
            "failed": run.failed_downloads,
        })
    });
    let out = serde_json::json!({ "ledger": stats, "latest_run": latest });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
