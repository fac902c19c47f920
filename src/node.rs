//! Ledger node: the shared chain, its peers and the services around them

use crate::{
    api,
    block::Block,
    chain::{Chain, ChainStore},
    error::{LedgerError, NetworkError, Result},
    gossip::GossipEngine,
    network::{PeerId, PeerInfo, PeerRegistry},
    utils::current_time_secs,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Cloneable handle to the chain and its gossip engine.
///
/// This is the surface the request-serving layer talks to.
#[derive(Debug, Clone)]
pub struct Ledger {
    chain: Arc<ChainStore>,
    engine: GossipEngine,
}

impl Ledger {
    pub fn new(chain: ChainStore) -> Self {
        let chain = Arc::new(chain);
        let engine = GossipEngine::new(chain.clone(), Arc::new(PeerRegistry::new()));
        Self { chain, engine }
    }

    /// Mine a block carrying `data` on top of the current tip and broadcast it
    pub async fn propose_block(&self, data: &str) -> Result<Block> {
        let block = self.chain.propose(data, current_time_secs()).await?;
        info!("Mined block {}", block);
        self.engine.broadcast_block(block.clone()).await?;
        Ok(block)
    }

    pub async fn current_chain(&self) -> Chain {
        self.chain.current_chain().await
    }

    pub async fn latest_block(&self) -> Result<Block> {
        self.chain.latest_block().await
    }

    /// Connect to a peer at `address` and register the link
    pub async fn register_outbound_peer(&self, address: &str) -> Result<PeerInfo> {
        self.engine.connect(address).await
    }

    pub async fn peers(&self) -> Vec<PeerInfo> {
        self.engine.peers().all().await
    }

    pub fn engine(&self) -> &GossipEngine {
        &self.engine
    }

    pub fn chain(&self) -> &Arc<ChainStore> {
        &self.chain
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(ChainStore::new())
    }
}

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Interface both listeners bind to
    pub host: String,

    /// Port for peer WebSocket links; 0 picks a free port
    pub p2p_port: u16,

    /// Port for the HTTP API; 0 picks a free port
    pub http_port: u16,

    /// Serve the HTTP API at all
    pub http_enabled: bool,

    /// Peers to connect to on start
    pub initial_peers: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            p2p_port: crate::DEFAULT_P2P_PORT,
            http_port: crate::DEFAULT_HTTP_PORT,
            http_enabled: true,
            initial_peers: Vec::new(),
        }
    }
}

/// A running (or ready to run) ledger node
pub struct LedgerNode {
    /// Identifier used in logs
    pub id: PeerId,

    ledger: Ledger,

    config: NodeConfig,

    p2p_addr: Option<SocketAddr>,

    http_addr: Option<SocketAddr>,

    tasks: Vec<JoinHandle<()>>,

    running: Arc<RwLock<bool>>,
}

impl LedgerNode {
    /// Create a node holding only the genesis block
    pub fn new(config: NodeConfig) -> Self {
        Self::with_ledger(config, Ledger::default())
    }

    fn with_ledger(config: NodeConfig, ledger: Ledger) -> Self {
        Self {
            id: PeerId::new(),
            ledger,
            config,
            p2p_addr: None,
            http_addr: None,
            tasks: Vec::new(),
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub fn builder() -> LedgerNodeBuilder {
        LedgerNodeBuilder::new()
    }

    /// Bind the listeners, start serving and dial the configured peers
    pub async fn start(&mut self) -> Result<()> {
        let p2p_listener = bind(&self.config.host, self.config.p2p_port).await?;
        let p2p_addr = p2p_listener.local_addr()?;
        info!("Node {} listening for peers on ws://{}", self.id, p2p_addr);
        self.tasks
            .push(tokio::spawn(self.ledger.engine().clone().serve(p2p_listener)));
        self.p2p_addr = Some(p2p_addr);

        if self.config.http_enabled {
            let http_listener = bind(&self.config.host, self.config.http_port).await?;
            let http_addr = http_listener.local_addr()?;
            info!("Node {} serving HTTP on http://{}", self.id, http_addr);
            self.tasks
                .push(tokio::spawn(api::serve(http_listener, self.ledger.clone())));
            self.http_addr = Some(http_addr);
        }

        *self.running.write().await = true;

        for peer in &self.config.initial_peers {
            if let Err(e) = self.ledger.register_outbound_peer(peer).await {
                warn!("Connection to initial peer {} failed: {}", peer, e);
            }
        }

        Ok(())
    }

    /// Stop accepting connections, stop serving requests and close every
    /// peer link. Handshakes still in flight are dropped and no link keeps
    /// handling frames afterwards.
    pub async fn stop(&mut self) -> Result<()> {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        let closed = self.ledger.engine().shutdown().await;
        *self.running.write().await = false;
        info!("Node {} stopped, closed {} peer links", self.id, closed);
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub async fn propose_block(&self, data: &str) -> Result<Block> {
        self.ledger.propose_block(data).await
    }

    pub async fn current_chain(&self) -> Chain {
        self.ledger.current_chain().await
    }

    pub async fn latest_block(&self) -> Result<Block> {
        self.ledger.latest_block().await
    }

    pub async fn register_outbound_peer(&self, address: &str) -> Result<PeerInfo> {
        self.ledger.register_outbound_peer(address).await
    }

    pub async fn peers(&self) -> Vec<PeerInfo> {
        self.ledger.peers().await
    }

    /// Bound peer address, once started
    pub fn p2p_addr(&self) -> Option<SocketAddr> {
        self.p2p_addr
    }

    /// `ws://` URL other nodes can dial, once started
    pub fn p2p_url(&self) -> Option<String> {
        self.p2p_addr.map(|addr| format!("ws://{}", addr))
    }

    /// Bound HTTP address, once started
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}

async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let addr = format!("{}:{}", host, port);
    TcpListener::bind(&addr)
        .await
        .map_err(|source| LedgerError::Network(NetworkError::BindFailed { addr, source }))
}

/// Builder for ledger nodes
pub struct LedgerNodeBuilder {
    config: NodeConfig,
    chain: Option<Chain>,
}

impl LedgerNodeBuilder {
    pub fn new() -> Self {
        Self {
            config: NodeConfig::default(),
            chain: None,
        }
    }

    /// Set the node configuration
    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Start from an existing chain instead of genesis alone
    pub fn with_chain(mut self, chain: Chain) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn p2p_port(mut self, port: u16) -> Self {
        self.config.p2p_port = port;
        self
    }

    pub fn http_port(mut self, port: u16) -> Self {
        self.config.http_port = port;
        self
    }

    pub fn http_enabled(mut self, enabled: bool) -> Self {
        self.config.http_enabled = enabled;
        self
    }

    /// Add a peer to dial on start
    pub fn peer(mut self, address: impl Into<String>) -> Self {
        self.config.initial_peers.push(address.into());
        self
    }

    /// Build the node. Fails if a seeded chain is not valid.
    pub fn build(self) -> Result<LedgerNode> {
        let store = match self.chain {
            Some(chain) => ChainStore::from_chain(chain)?,
            None => ChainStore::new(),
        };
        Ok(LedgerNode::with_ledger(self.config, Ledger::new(store)))
    }
}

impl Default for LedgerNodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
