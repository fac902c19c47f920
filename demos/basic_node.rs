//! This example starts two ledger nodes on ephemeral ports, links them and
//! shows a mined block reaching the other node.

use gossip_ledger::{error::Result, LedgerNode};
use tokio::time::{sleep, Duration};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for better debugging
    tracing_subscriber::fmt::init();

    let mut first = LedgerNode::builder().p2p_port(0).http_port(0).build()?;
    first.start().await?;

    let first_url = first.p2p_url().unwrap_or_default();
    let mut second = LedgerNode::builder()
        .p2p_port(0)
        .http_enabled(false)
        .peer(first_url)
        .build()?;
    second.start().await?;

    let block = first.propose_block("hello from the first node").await?;
    println!("Mined {} on the first node", block);

    sleep(Duration::from_millis(500)).await;
    println!(
        "Second node tip: {}",
        second.latest_block().await?
    );

    second.stop().await?;
    first.stop().await?;
    println!("Nodes shut down successfully");

    Ok(())
}
