//! coursegrab - concurrent course selection retry engine
//!
//! CLI entry point for selection runs and identity maintenance.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, info};

use coursegrab::cli::{Cli, Command, OutputFormat};
use coursegrab::config::Config;
use coursegrab::domain::Identity;
use coursegrab::engine::{RunCoordinator, cancel_channel};
use coursegrab::store::{ConfigFileStore, ObligationStore};
use coursegrab::transport::HttpConnector;
use coursegrab::verify::SessionVerifier;

/// Exit code for a run stopped by a signal
const EXIT_CANCELLED: u8 = 130;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, log_file: Option<&PathBuf>) -> Result<()> {
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    match log_file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir).context("Failed to create log directory")?;
            }
            let file = fs::File::create(path).context("Failed to create log file")?;
            tracing_subscriber::fmt()
                .with_writer(file)
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load logging settings from config file early (before full config load)
    let logging = Config::load_logging(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), logging.level.as_deref(), logging.file.as_ref())
        .context("Failed to setup logging")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run { format } => cmd_run(&load_config(cli.config.as_ref())?, format).await,
        Command::Verify { format } => cmd_verify(&load_config(cli.config.as_ref())?, format).await,
        Command::List => cmd_list(&load_config(cli.config.as_ref())?),
        // Edits the file directly and may create it
        Command::Add {
            label,
            profile_id,
            course,
        } => cmd_add(cli.config.as_ref(), &label, &profile_id, &course),
    }
}

fn load_config(config_path: Option<&PathBuf>) -> Result<Config> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(identities = config.identities.len(), "coursegrab loaded config");
    Ok(config)
}

fn identities(config: &Config) -> Vec<Identity> {
    config.identities.iter().map(Identity::from_config).collect()
}

/// Flip the cancellation signal on SIGINT/SIGTERM (Ctrl+C elsewhere)
fn spawn_signal_handler(cancel: watch::Sender<bool>) -> Result<tokio::task::JoinHandle<()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        Ok(tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => info!("SIGINT received, stopping after in-flight attempts"),
                _ = sigterm.recv() => info!("SIGTERM received, stopping after in-flight attempts"),
            }
            let _ = cancel.send(true);
        }))
    }

    #[cfg(not(unix))]
    {
        Ok(tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl+C received, stopping after in-flight attempts");
                let _ = cancel.send(true);
            }
        }))
    }
}

/// Run every identity's selections to completion or interruption
async fn cmd_run(config: &Config, format: OutputFormat) -> Result<ExitCode> {
    debug!(?format, "cmd_run: called");
    let identities = identities(config);
    if identities.is_empty() {
        println!("No identities configured. Add one with `cg add LABEL PROFILE_ID COURSE`.");
        return Ok(ExitCode::SUCCESS);
    }

    let connector = Arc::new(HttpConnector::new(&config.portal, config.engine.attempt_timeout()));
    let coordinator = RunCoordinator::from_config(config, connector);

    let (cancel_tx, cancel_rx) = cancel_channel();
    let signals = spawn_signal_handler(cancel_tx)?;

    let summary = coordinator.run(identities, cancel_rx).await.context("Run failed")?;
    signals.abort();

    match format {
        OutputFormat::Text => println!("{}", summary.render_text()),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
        ),
    }

    if summary.cancelled {
        Ok(ExitCode::from(EXIT_CANCELLED))
    } else if summary.is_complete() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Check every identity's session cookies
async fn cmd_verify(config: &Config, format: OutputFormat) -> Result<ExitCode> {
    debug!(?format, "cmd_verify: called");
    let identities = identities(config);
    if identities.is_empty() {
        println!("Cannot find any cookies.");
        return Ok(ExitCode::SUCCESS);
    }

    let connector = Arc::new(HttpConnector::new(&config.portal, config.engine.verify_timeout()));
    let report = SessionVerifier::from_config(config, connector)
        .verify_all(&identities)
        .await;

    match format {
        OutputFormat::Text => println!("{}", report.render_text()),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        ),
    }

    Ok(if report.all_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Print identities and their attempt order
fn cmd_list(config: &Config) -> Result<ExitCode> {
    debug!("cmd_list: called");
    let identities = identities(config);
    if identities.is_empty() {
        println!("No identities configured.");
        return Ok(ExitCode::SUCCESS);
    }

    for identity in &identities {
        match identity.inert_reason() {
            Some(reason) => println!("{} {}", identity.label.bold(), format!("(skipped: {reason})").yellow()),
            None => println!("{}", identity.label.bold()),
        }
        for (i, obligation) in identity.obligations().iter().enumerate() {
            println!("  {:>3}. profile {} course {}", i + 1, obligation.routing_key(), obligation.course());
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Add one course target to the config file
fn cmd_add(config_path: Option<&PathBuf>, label: &str, profile_id: &str, course: &str) -> Result<ExitCode> {
    debug!(%label, %profile_id, %course, "cmd_add: called");
    let path = Config::resolve_path(config_path).unwrap_or_else(|| PathBuf::from("coursegrab.yml"));
    let mut store = ConfigFileStore::new(path);

    if store.add(label, profile_id, course)? {
        println!(
            "Successfully added course {} for user {} ({})",
            course,
            label,
            store.path().display()
        );
    } else {
        println!("Course {} already exists for user {}", course, label);
    }
    Ok(ExitCode::SUCCESS)
}
