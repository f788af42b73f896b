//! `trackhub`: carrier tracking lookups, mirror pushes and the refresh job.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use trackhub_cli::{App, Config, output};
use trackhub_core::model::{AgentId, CarrierId, CustomerId, TrackingHints};
use trackhub_core::service::TrackingQuery;

/// Aggregate carrier tracking for freight shipments.
#[derive(Parser, Debug)]
#[command(name = "trackhub", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "TRACKHUB_CONFIG", default_value = "config/trackhub.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look tracking numbers up; without arguments they are read from stdin,
    /// one per line, and an empty list means every matching shipment
    Track {
        /// Tracking numbers
        numbers: Vec<String>,
        /// Only shipments of this customer (used when no numbers are given)
        #[arg(long)]
        customer: Option<i64>,
        /// Agent to use for numbers without a shipment record
        #[arg(long)]
        agent: Option<i64>,
        /// Environment carrier to use for numbers without a shipment record
        #[arg(long)]
        carrier: Option<String>,
        /// Push the results to the downstream mirror
        #[arg(long)]
        sync: bool,
    },
    /// Refresh recent shipments periodically until interrupted
    Watch,
    /// Deactivate an agent and unlink its shipments
    DeactivateAgent {
        /// Agent id
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load_from_path(&args.config)?;
    info!(config_file = %args.config.display(), carriers = config.carriers.len(), "config_loaded");
    let app = App::from_config(config)?;

    match args.command {
        Command::Track {
            numbers,
            customer,
            agent,
            carrier,
            sync,
        } => {
            let hints = TrackingHints {
                agent_id: agent.map(AgentId),
                carrier_id: carrier.map(CarrierId),
                customer_id: customer.map(CustomerId),
            };
            let query = if numbers.is_empty() {
                TrackingQuery::from_lines(&read_stdin()?, hints)
            } else {
                TrackingQuery { numbers, hints }
            };

            let report = app.track(&query).await?;
            let mut out = io::stdout().lock();
            output::write_batch(&mut out, &report)?;

            if sync {
                let pushed = app.push(&report).await?;
                output::write_sync(&mut out, &pushed)?;
            }
        }
        Command::Watch => {
            let job = app.refresh_job();
            let (stop, shutdown) = watch::channel(false);
            tokio::spawn(async move {
                if signal::ctrl_c().await.is_ok() && stop.send(true).is_err() {
                    warn!("refresh job already stopped");
                }
            });

            info!("refresh_job_started");
            job.run(shutdown).await;
        }
        Command::DeactivateAgent { id } => {
            let unlinked = app.deactivate_agent(AgentId(id)).await?;
            info!(agent_id = id, unlinked, "agent_deactivated");
        }
    }

    Ok(())
}

/// Tracking numbers piped on stdin; an interactive terminal gives none.
fn read_stdin() -> Result<String> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(String::new());
    }
    let mut text = String::new();
    stdin
        .read_to_string(&mut text)
        .context("Failed to read tracking numbers from stdin")?;
    Ok(text)
}
