//! magikcri - pod sandbox and container lifecycle daemon
//!
//! ## Usage
//!
//! ```sh
//! magikcri [--config <path>] run
//! magikcri config            # effective configuration
//! magikcri config --default  # compiled-in defaults
//! ```
//!
//! Logging follows `RUST_LOG`, or `--log-level` when it is given.

use clap::{Parser, Subcommand};
use magikcri::{Config, ReapGate, Server, reaper};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// =============================================================================
// CLI
// =============================================================================

#[derive(Debug, Parser)]
#[command(name = "magikcri", version, about = "Pod sandbox and container lifecycle daemon")]
struct Cli {
    /// Configuration file
    #[arg(long, env = "MAGIKCRI_CONFIG")]
    config: Option<PathBuf>,

    /// Override `storage.root`
    #[arg(long)]
    root: Option<PathBuf>,

    /// Override `storage.run_root`
    #[arg(long)]
    run_root: Option<PathBuf>,

    /// Override `runtime.runtime_path`
    #[arg(long)]
    runtime: Option<PathBuf>,

    /// Log filter, e.g. `info` or `magikcri=debug`
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the daemon (default)
    Run,
    /// Print the configuration as TOML
    Config {
        /// Print the defaults instead of the effective configuration
        #[arg(long)]
        default: bool,
    },
}

impl Cli {
    fn load_config(&self) -> magikcri::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::load_or_default(&Config::default_path())?,
        };
        if let Some(root) = &self.root {
            config.storage.root = root.clone();
        }
        if let Some(run_root) = &self.run_root {
            config.storage.run_root = run_root.clone();
        }
        if let Some(runtime) = &self.runtime {
            config.runtime.runtime_path = runtime.clone();
        }
        Ok(config)
    }
}

// =============================================================================
// Commands
// =============================================================================

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cmd_config(cli: &Cli, default: bool) -> magikcri::Result<()> {
    let config = if default {
        Config::default()
    } else {
        cli.load_config()?
    };
    print!("{}", config.to_toml()?);
    Ok(())
}

async fn cmd_run(cli: &Cli) -> magikcri::Result<()> {
    let config = cli.load_config()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        root = %config.storage.root.display(),
        "magikcri starting"
    );

    if let Err(e) = reaper::set_subreaper() {
        warn!("failed to become child subreaper: {}", e);
    }
    let gate = ReapGate::new();
    let reaper_task = reaper::spawn_reaper(gate.clone())?;

    let server = Server::new(config, gate).await?;
    let restored = server.restored();
    info!(
        sandboxes = restored.sandboxes,
        containers = restored.containers,
        skipped = restored.skipped,
        "restored state"
    );

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }

    reaper_task.abort();
    let (sandboxes, containers) = server.state().counts();
    info!(sandboxes, containers, "shutting down");
    Ok(())
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match &cli.command {
        Some(Command::Config { default }) => cmd_config(&cli, *default),
        Some(Command::Run) | None => {
            init_logging(cli.log_level.as_deref());
            cmd_run(&cli).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
