//! nodefleet — manage node containers across a fleet of Docker hosts.
//!
//! # Usage
//!
//! ```text
//! nodefleet container add big-sibling --image fleet/big-sibling -e LOG=info
//! nodefleet container update big-sibling --pool edge -e EDGE=1
//! nodefleet recreate
//! nodefleet node-added --node http://10.0.0.7:2375
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod config;
mod provisioner;

use commands::App;
use commands::container::ContainerAction;

#[derive(Parser)]
#[command(
    name = "nodefleet",
    about = "Node container manager",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Config file (store path, engine settings, nodes).
    #[arg(short, long, global = true, default_value = "nodefleet.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage node container configurations
    Container {
        #[command(subcommand)]
        action: ContainerAction,
    },
    /// Create and start every node container, replacing existing ones.
    Recreate {
        /// Node address to target (repeatable; default: every node).
        #[arg(short, long = "node")]
        nodes: Vec<String>,
        /// Keep containers that already exist instead of replacing them.
        #[arg(long)]
        keep_existing: bool,
    },
    /// Bring a newly registered node up to date.
    NodeAdded {
        #[arg(short, long)]
        node: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,nodefleet=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let app = App::open(&cli.config)?;

    match cli.command {
        Commands::Container { action } => commands::container::run(&app, action),
        Commands::Recreate {
            nodes,
            keep_existing,
        } => commands::recreate::recreate(&app, &nodes, keep_existing).await,
        Commands::NodeAdded { node } => commands::recreate::node_added(&app, &node).await,
    }
}
