//! Gossip Ledger - a replicated, append-only hash-chained ledger.
//!
//! Nodes hold their chain in memory and converge on the longest valid chain
//! by gossiping blocks over WebSocket links.

// Modules
pub mod api;
pub mod block;
pub mod chain;
pub mod error;
pub mod gossip;
pub mod network;
pub mod node;
pub mod protocol;
pub mod utils;
pub mod validator;

// Re-exports
pub use block::{digest, genesis, structurally_valid, Block};
pub use chain::{Chain, ChainStore};
pub use error::{LedgerError, Rejection, Result};
pub use gossip::{GossipEngine, GossipOutcome, IgnoreReason};
pub use network::{PeerDirection, PeerId, PeerInfo, PeerRegistry};
pub use node::{Ledger, LedgerNode, LedgerNodeBuilder, NodeConfig};
pub use protocol::Message;
pub use validator::{block_valid_against, chain_valid, validate_block_against, validate_chain};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Default port for peer WebSocket links
pub const DEFAULT_P2P_PORT: u16 = 6000;

/// Default port for the HTTP API
pub const DEFAULT_HTTP_PORT: u16 = 3000;
