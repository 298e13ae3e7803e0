//! QRLink command line interface
//!
//! Resolves configuration and drives a transient invite ledger through
//! scripted sessions.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod session;
mod settings;

use session::Session;
use settings::AppConfig;

#[derive(Parser)]
#[command(name = "qrlink")]
#[command(about = "QRLink invite and connection tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to config/qrlink.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved configuration
    Config,
    /// Run an invite session script against a fresh ledger
    Run {
        /// Script file; reads stdin when omitted
        script: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config)?;

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Run { script } => handle_run(&config, script),
    }
}

fn handle_run(config: &AppConfig, script: Option<PathBuf>) -> Result<()> {
    let ledger = config.build_ledger()?;
    let links = config.links();
    let mut session = Session::new(&ledger, &links);

    info!(
        backend = %config.storage_backend,
        origin = links.origin(),
        "Starting invite session"
    );

    let stdout = io::stdout();
    let summary = match script {
        Some(path) => {
            let file = File::open(&path)
                .with_context(|| format!("failed to open script {}", path.display()))?;
            session::run(&mut session, BufReader::new(file), stdout.lock())?
        }
        None => session::run(&mut session, io::stdin().lock(), stdout.lock())?,
    };

    info!(
        commands = summary.commands,
        issued = summary.issued,
        connected = summary.connected,
        failures = summary.failures,
        pending = ledger.pending_invites()?,
        "Session finished"
    );

    Ok(())
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }

    Ok(())
}
