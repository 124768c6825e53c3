//! sanctions-screen - name screening against locally cached sanctions lists
//!
//! Module structure:
//! - `domain/` - Sanctions document and screening types
//! - `io/` - External interfaces (list sources, HTTP API)
//! - `services/` - Business logic (ListStore, name matching, refresh cycle)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::{Parser, Subcommand};
use sanctions_screen::domain::DateOfBirth;
use sanctions_screen::infra::{Config, Metrics};
use sanctions_screen::io::{http_api, CompositeSource};
use sanctions_screen::services::{NameQuery, Screener, UpdateCoordinator};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Screen names against sanctions lists
#[derive(Parser, Debug)]
#[command(name = "sanctions-screen", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Screen one name; exits 1 on a match
    Check {
        #[arg(long, default_value = "")]
        first: String,
        #[arg(long, default_value = "")]
        last: String,
        /// Date of birth (epoch seconds or a date such as 1980-04-12)
        #[arg(long)]
        dob: Option<String>,
    },
    /// Run one refresh cycle against the configured sources
    Refresh,
    /// Show stored lists and their last update time
    Lists,
    /// Serve the HTTP API and refresh on the configured interval
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Default: INFO, use RUST_LOG=debug for per-entry match logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load_from_path(&args.config).with_env_overrides();

    info!(
        version = %env!("CARGO_PKG_VERSION"),
        git_hash = %env!("GIT_HASH"),
        config_file = %config.config_file(),
        store_path = %config.store_path().display(),
        verdict_policy = %config.verdict_policy().as_str(),
        sources = %config.sources().len(),
        "config_loaded"
    );

    let result = match args.command {
        Command::Check { first, last, dob } => run_check(&config, first, last, dob).await,
        Command::Refresh => run_refresh(&config).await.map(|_| ExitCode::SUCCESS),
        Command::Lists => run_lists(&config).await.map(|_| ExitCode::SUCCESS),
        Command::Serve => run_serve(config).await.map(|_| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "command_failed");
            ExitCode::from(2)
        }
    }
}

async fn run_check(
    config: &Config,
    first: String,
    last: String,
    dob: Option<String>,
) -> anyhow::Result<ExitCode> {
    let screener = Screener::from_config(config, Arc::new(Metrics::new()));
    let mut query = NameQuery::new(first, last);
    query.dob = dob.map(parse_dob_arg);

    let result = tokio::task::spawn_blocking(move || screener.check(&query))
        .await
        .context("Screening task panicked")??;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if result.matched { ExitCode::from(1) } else { ExitCode::SUCCESS })
}

/// Integers are epoch seconds, anything else is a date string
fn parse_dob_arg(raw: String) -> DateOfBirth {
    match raw.trim().parse::<i64>() {
        Ok(epoch) => DateOfBirth::Epoch(epoch),
        Err(_) => DateOfBirth::Text(raw),
    }
}

fn build_coordinator(
    config: &Config,
    screener: &Screener,
    metrics: Arc<Metrics>,
) -> anyhow::Result<Option<UpdateCoordinator>> {
    let source = CompositeSource::from_config(config.sources())?;
    if source.is_empty() {
        return Ok(None);
    }
    Ok(Some(UpdateCoordinator::new(screener.store().clone(), Arc::new(source), metrics)))
}

async fn run_refresh(config: &Config) -> anyhow::Result<()> {
    let metrics = Arc::new(Metrics::new());
    let screener = Screener::from_config(config, metrics.clone());
    let Some(coordinator) = build_coordinator(config, &screener, metrics)? else {
        anyhow::bail!("No sources configured in {}", config.config_file());
    };

    let outcome = coordinator.refresh().await?;
    println!(
        "fetched {} lists, replaced {:?}{}",
        outcome.fetched,
        outcome.lists_replaced,
        if outcome.changed() { "" } else { " (store unchanged)" }
    );
    Ok(())
}

async fn run_lists(config: &Config) -> anyhow::Result<()> {
    let screener = Screener::from_config(config, Arc::new(Metrics::new()));
    let store = screener.store().clone();
    let doc = tokio::task::spawn_blocking(move || store.current_data())
        .await
        .context("Store read task panicked")??;

    if doc.is_empty() {
        println!("no lists stored at {}", config.store_path().display());
    }
    for (list_id, list) in doc.iter() {
        println!(
            "{list_id}\t{}\t{} entries\tupdated {}",
            list.kind().as_str(),
            list.entries.len(),
            list.updated
        );
    }
    Ok(())
}

async fn run_serve(config: Config) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());
    let screener = Arc::new(Screener::from_config(&config, metrics.clone()));

    // Scheduled refresh (if sources are configured and interval > 0)
    let refresh_interval = config.refresh_interval_secs();
    match build_coordinator(&config, &screener, metrics.clone())? {
        Some(coordinator) if refresh_interval > 0 => {
            let refresh_shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                coordinator
                    .run_periodic(Duration::from_secs(refresh_interval), refresh_shutdown)
                    .await;
            });
        }
        Some(_) => info!("refresh_scheduler_disabled"),
        None => warn!("refresh_no_sources"),
    }

    // Periodic metrics summary
    let report_metrics = metrics.clone();
    let report_store = screener.store().clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            let store = report_store.clone();
            let lists = tokio::task::spawn_blocking(move || {
                store.current_data().map(|doc| doc.len()).unwrap_or(0)
            })
            .await
            .unwrap_or(0);
            report_metrics.report(lists, report_store.load_count()).log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let listener = http_api::bind(config.api_bind_address(), config.api_port())
        .await
        .with_context(|| {
            format!("Failed to bind {}:{}", config.api_bind_address(), config.api_port())
        })?;
    http_api::serve(listener, screener, metrics, shutdown_rx).await?;

    info!("sanctions-screen shutdown complete");
    Ok(())
}
