//! Session recorder maintenance CLI.
//!
//! Operates on the durable staging store outside a recording session: the
//! on-load drain, inspection of what is still pending, and manual purge.
//!
//! ```bash
//! session-recorder --config recorder.json drain
//! session-recorder list
//! session-recorder purge 6f1c0c6e-...
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use session_recorder::upload::DeliveryMode;
use session_recorder::{dispatcher_from_config, init_tracing, RecorderConfig};

/// Screen recording staging and delivery.
#[derive(Parser, Debug)]
#[command(name = "session-recorder")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a JSON config file. Defaults apply when omitted.
    #[arg(short, long, env = "SESSION_RECORDER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deliver every staged recording to the ingestion service
    Drain,
    /// Print staged recordings as JSON
    List,
    /// Remove a staged recording without delivering it
    Purge {
        /// Staged recording id
        id: String,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => RecorderConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => RecorderConfig::default(),
    }
    .apply_env();
    config.validate().context("invalid configuration")?;

    tracing::info!("Starting session-recorder v{}", env!("CARGO_PKG_VERSION"));

    if let Command::Config = args.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let dispatcher = dispatcher_from_config(&config)
        .await
        .context("opening the delivery stack")?;

    match args.command {
        Command::Drain => {
            let summary = dispatcher.drain_all(DeliveryMode::Background).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if summary.pending > 0 {
                anyhow::bail!("{} recording(s) still pending", summary.pending);
            }
        }
        Command::List => {
            let staged = dispatcher.store().list_all().await?;
            let entries: Vec<_> = staged
                .iter()
                .map(|s| {
                    json!({
                        "id": s.id,
                        "mimeType": s.blob.mime_type,
                        "sizeBytes": s.blob.len(),
                        "metadata": s.metadata,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Command::Purge { id } => {
            dispatcher.store().delete(&id).await?;
            tracing::warn!("Purged staged recording {} without delivery", id);
        }
        Command::Config => {}
    }

    Ok(())
}
