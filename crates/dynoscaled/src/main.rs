//! dynoscaled — the dynoscale daemon.
//!
//! Single binary that assembles the dynoscale subsystems:
//! - Config loading and validation
//! - RabbitMQ management API client (queue backlog)
//! - Heroku Platform API client (formation)
//! - Autoscaler control loop
//!
//! # Usage
//!
//! ```text
//! dynoscaled run --config dynoscale.toml
//! dynoscaled run --config dynoscale.toml --once --dry-run
//! dynoscaled check --config dynoscale.toml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{Instrument, Span, error, info, info_span};

use dynoscale_autoscale::{
    Controller, ControllerConfig, DryRunMutator, FleetMutator, TargetOutcome,
};
use dynoscale_core::DynoscaleConfig;
use dynoscale_heroku::HerokuClient;
use dynoscale_rabbitmq::RabbitMqClient;

const DEFAULT_LOG_FILTER: &str = "info,dynoscaled=debug,dynoscale=debug";

#[derive(Parser)]
#[command(
    name = "dynoscaled",
    about = "Scale Heroku worker dynos to RabbitMQ queue backlog",
    version
)]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop until interrupted.
    Run {
        /// Path to the config file.
        #[arg(short, long, default_value = "dynoscale.toml")]
        config: PathBuf,

        /// Run a single tick and exit.
        #[arg(long)]
        once: bool,

        /// Log scaling decisions without updating the formation.
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate the config file and print the configured targets.
    Check {
        /// Path to the config file.
        #[arg(short, long, default_value = "dynoscale.toml")]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run {
            config,
            once,
            dry_run,
        } => run(&config, once, dry_run).await,
        Command::Check { config } => check(&config),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

fn load_config(path: &Path) -> anyhow::Result<DynoscaleConfig> {
    DynoscaleConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

async fn run(config_path: &Path, once: bool, dry_run: bool) -> anyhow::Result<()> {
    info!(config = %config_path.display(), dry_run, "dynoscale daemon starting");

    let config = load_config(config_path)?;
    let controller_config = ControllerConfig {
        interval: config.interval()?,
        policies: config.policies()?,
    };

    // ── Collaborators ──────────────────────────────────────────

    let rabbitmq = Arc::new(
        RabbitMqClient::from_config(&config.rabbitmq).context("configuring RabbitMQ client")?,
    );
    let heroku = Arc::new(
        HerokuClient::from_config(&config.heroku).context("configuring Heroku client")?,
    );
    info!(app = %heroku.app(), url = %config.rabbitmq.url, "clients initialized");

    let mutator: Arc<dyn FleetMutator> = if dry_run {
        Arc::new(DryRunMutator)
    } else {
        heroku.clone()
    };

    let span = autoscaler_span(heroku.app());
    let controller = Controller::new(controller_config, rabbitmq, heroku, mutator);

    if once {
        return run_once(&controller).instrument(span).await;
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let result = controller.run(shutdown_rx).instrument(span).await;
    signal_handle.abort();
    result?;

    info!("dynoscale daemon stopped");
    Ok(())
}

/// Span carried by every control loop log line.
fn autoscaler_span(app: &str) -> Span {
    info_span!("autoscaler", heroku_app = %app)
}

async fn run_once(controller: &Controller) -> anyhow::Result<()> {
    controller.verify().await?;
    let report = controller.run_tick().await?;

    for (process_type, outcome) in &report.targets {
        match outcome {
            TargetOutcome::Scaled { from, to } => info!(%process_type, from, to, "scaled"),
            TargetOutcome::Unchanged => info!(%process_type, "unchanged"),
            TargetOutcome::Failed(e) => error!(%process_type, error = %e, "failed"),
        }
    }

    if report.failed() > 0 {
        anyhow::bail!("{} of {} targets failed", report.failed(), report.targets.len());
    }
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn check(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let interval = config.interval()?;

    println!("config:   {}", config_path.display());
    println!("interval: {interval:?}");
    println!("rabbitmq: {}", config.rabbitmq.url);
    println!("heroku:   {}", config.heroku.app);
    println!();
    for policy in config.policies()? {
        println!(
            "{:<24} -> {:<24} {}",
            policy.queue_name, policy.process_type, policy.thresholds
        );
    }
    Ok(())
}
