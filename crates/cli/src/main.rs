mod args;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use args::{Action, Cli};
use jobstarter_core::{
    count_pending, count_scripts, list_scripts, load_config, load_config_from_env,
    validate_config, Config, RunReport, ScriptStarter,
};

/// Config file used when `JOBSTARTER_CONFIG` is not set.
const DEFAULT_CONFIG_FILE: &str = "jobstarter.toml";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        eprintln!("jobstarter: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let (action, directory) = Cli::parse().into_parts();

    init_logging();

    let mut config = load()?;
    if let Some(directory) = directory {
        config.starter.directory = directory;
    }
    validate_config(&config).context("Configuration validation failed")?;

    let starter = &config.starter;
    info!("Script directory: {:?}", starter.directory);
    info!(
        "Backend: {:?} (pattern {:?}, command {:?}, chdir {})",
        starter.backend,
        starter.pattern(),
        starter.command(),
        starter.chdir()
    );

    match action {
        Action::Run => run_scripts(config).await,
        Action::Status => print_status(&config),
        Action::Count => print_count(&config),
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let json = std::env::var("JOBSTARTER_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Loads the config file if there is one, else defaults plus environment.
fn load() -> Result<Config> {
    let explicit = std::env::var("JOBSTARTER_CONFIG").ok().map(PathBuf::from);
    let config_path = explicit
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if explicit.is_some() || config_path.exists() {
        info!("Loading configuration from {:?}", config_path);
        return load_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path));
    }

    info!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
    load_config_from_env().context("Failed to load config from environment")
}

async fn run_scripts(config: Config) -> Result<()> {
    let starter = ScriptStarter::new(config.starter).context("Failed to create script starter")?;
    info!(
        "Concurrency: {:?}, rerun: {}",
        starter.config().parallel,
        starter.config().rerun
    );

    tokio::select! {
        report = starter.run() => {
            print_report(&report);
        }
        _ = shutdown_signal() => {
            warn!("Interrupted, no further scripts will be started; running children are left alone");
        }
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    println!(
        "{} scripts found, {} eligible, {} started ({} finished, {} failed), {} skipped",
        report.discovered,
        report.eligible,
        report.launched(),
        report.finished(),
        report.failed(),
        report.skipped.len()
    );
}

fn print_status(config: &Config) -> Result<()> {
    let starter = &config.starter;
    let entries = list_scripts(&starter.directory, starter.pattern())?;

    let json = std::env::var("JOBSTARTER_OUTPUT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for entry in &entries {
            println!("{}\t{}", entry.status, entry.path.display());
        }
    }
    Ok(())
}

fn print_count(config: &Config) -> Result<()> {
    let starter = &config.starter;
    let total = count_scripts(&starter.directory, starter.pattern())?;
    let pending = count_pending(&starter.directory, starter.pattern())?;
    println!("{pending}/{total}");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed never
/// resolves.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
