#![forbid(unsafe_code)]

//! `workshop-conductor`: session orchestrator binary.
//!
//! Hosts session workers with retention and startup recovery (`serve`),
//! and offers operator commands against the session store.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use workshop_conductor::conductor::Conductor;
use workshop_conductor::config::GlobalConfig;
use workshop_conductor::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "workshop-conductor", about = "Workshop session orchestrator", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Host session workers until ctrl-c or SIGTERM.
    Serve,
    /// Print the stored snapshot of a session as JSON.
    Show {
        /// Session identifier.
        session_id: String,
    },
    /// List every session hosted so far.
    List,
    /// Mark a session deleted; its data is purged after the retention period.
    Delete {
        /// Session identifier.
        session_id: String,
    },
    /// Run the retention purge once.
    Purge,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = GlobalConfig::load_from_path(&args.config)?;
    info!(data_dir = %config.data_dir.display(), "configuration loaded");

    let mut conductor = Conductor::start(config).await?;

    let outcome = match args.command {
        Command::Serve => serve(&mut conductor).await,
        Command::Show { session_id } => show(&conductor, &session_id).await,
        Command::List => list(&conductor).await,
        Command::Delete { session_id } => {
            let existed = conductor.delete_session(&session_id).await;
            existed.map(|existed| {
                if existed {
                    println!("deleted {session_id}");
                } else {
                    println!("no live session {session_id}");
                }
            })
        }
        Command::Purge => conductor.purge().await.map(|removed| {
            println!("purged {removed} session(s)");
        }),
    };

    conductor.shutdown().await;
    outcome
}

async fn serve(conductor: &mut Conductor) -> Result<()> {
    conductor.start_retention();
    conductor.recover().await?;
    info!("workshop-conductor ready");

    shutdown_signal().await;
    info!("shutdown signal received");
    Ok(())
}

async fn show(conductor: &Conductor, session_id: &str) -> Result<()> {
    match conductor.gateway().snapshot(session_id).await? {
        Some(snapshot) => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        None => Err(AppError::UnresolvableSession(format!(
            "no snapshot stored for session '{session_id}'"
        ))),
    }
}

async fn list(conductor: &Conductor) -> Result<()> {
    for record in conductor.sessions().await? {
        let status = record
            .deleted_at
            .map_or_else(|| "live".to_owned(), |at| format!("deleted {}", at.to_rfc3339()));
        println!(
            "{}\t{}\tquorum={}\tcreated {}\t{status}",
            record.session_id,
            record.workshop_id,
            record.required_active_profile_count,
            record.created_at.to_rfc3339(),
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
