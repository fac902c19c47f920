//! Gossip Ledger CLI application

use anyhow::Context;
use clap::{Parser, Subcommand};
use gossip_ledger::{api::MineRequest, LedgerNode, NodeConfig};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gossip-ledger")]
#[command(about = "A replicated hash-chained ledger kept in sync by peer gossip")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Port for the HTTP API
    #[arg(
        long,
        env = "HTTP_PORT",
        default_value_t = gossip_ledger::DEFAULT_HTTP_PORT,
        global = true
    )]
    http_port: u16,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a ledger node
    Start {
        /// Port for peer WebSocket links
        #[arg(long, env = "P2P_PORT", default_value_t = gossip_ledger::DEFAULT_P2P_PORT)]
        p2p_port: u16,

        /// Interface to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Peer to connect to on start (repeatable)
        #[arg(short, long = "peer")]
        peers: Vec<String>,
    },
    /// Ask a running node to mine a block
    Mine {
        /// Block payload; multiple words are joined with commas
        data: Vec<String>,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Some(Commands::Start {
            p2p_port,
            host,
            peers,
        }) => run_node(host, p2p_port, cli.http_port, peers).await?,
        None => {
            run_node(
                "127.0.0.1".to_string(),
                gossip_ledger::DEFAULT_P2P_PORT,
                cli.http_port,
                Vec::new(),
            )
            .await?
        }
        Some(Commands::Mine { data }) => mine(cli.http_port, data.join(",")).await?,
        Some(Commands::Version) => {
            println!("Gossip Ledger v{}", gossip_ledger::VERSION);
        }
    }

    Ok(())
}

async fn run_node(
    host: String,
    p2p_port: u16,
    http_port: u16,
    peers: Vec<String>,
) -> anyhow::Result<()> {
    let config = NodeConfig {
        host,
        p2p_port,
        http_port,
        http_enabled: true,
        initial_peers: peers,
    };
    let mut node = LedgerNode::builder().with_config(config).build()?;
    node.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("Shutting down node...");
    node.stop().await?;
    Ok(())
}

async fn mine(http_port: u16, data: String) -> anyhow::Result<()> {
    let url = format!("http://localhost:{}/mine-block", http_port);
    let response = reqwest::Client::new()
        .post(&url)
        .json(&MineRequest { data })
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?;
    println!("status: {}", response.status().as_u16());
    Ok(())
}
