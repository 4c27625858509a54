//! Strata command line.
//!
//! Inspect configuration and the nodes-info cache, or run an in-process
//! cluster simulation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use strata_daemon::{logging, simulate, DaemonConfig};
use strata_data::NodesInfoFile;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Strata - replicated cluster state daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = "/etc/strata/strata.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    Config,

    /// Print the nodes-info cache file
    NodesInfo {
        /// Read this file instead of the one under the configured var dir
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Run several nodes over an in-memory network and report convergence
    Simulate {
        /// Number of nodes
        #[arg(short = 'n', long, default_value = "3")]
        nodes: usize,

        /// How long to let the nodes gossip, in milliseconds
        #[arg(short, long, default_value = "2000")]
        duration_ms: u64,

        /// Heartbeat interval override, in milliseconds
        #[arg(long, default_value = "100")]
        interval_ms: u64,

        /// Directory for per-node runtime files
        #[arg(long)]
        var_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = DaemonConfig::load(Some(&cli.config))
        .with_context(|| format!("loading {}", cli.config.display()))?;
    logging::init(&config.log_level, cli.verbose);

    match cli.command {
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }

        Commands::NodesInfo { file } => {
            let file = file.map_or_else(|| config.nodes_info_file(), NodesInfoFile::new);
            let info = file.load()?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Simulate {
            nodes,
            duration_ms,
            interval_ms,
            var_dir,
        } => {
            anyhow::ensure!(nodes > 0, "at least one node is required");
            let scratch = std::env::temp_dir().join(format!("strata-sim-{}", std::process::id()));
            let mut template = config;
            template.var_dir = var_dir.unwrap_or(scratch);
            template.heartbeat.interval_ms = interval_ms;
            template.heartbeat.commit_interval_ms = (interval_ms / 2).max(1);
            template.heartbeat.peer_timeout_ms = interval_ms.saturating_mul(10);
            template.validate()?;

            let report = simulate::run(template, nodes, Duration::from_millis(duration_ms)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.converged {
                anyhow::bail!("nodes did not converge within {duration_ms}ms");
            }
        }
    }

    Ok(())
}
