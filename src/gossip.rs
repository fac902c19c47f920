//! Gossip protocol engine: per-link dispatch, chain reconciliation and
//! broadcast, plus the WebSocket plumbing that feeds it.

use crate::block::{structurally_valid, Block};
use crate::chain::ChainStore;
use crate::error::{NetworkError, Rejection, Result};
use crate::network::{PeerDirection, PeerId, PeerInfo, PeerRegistry};
use crate::protocol::Message;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long a closing link's writer gets to flush and send its close frame
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// What the engine did with one inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum GossipOutcome {
    /// Sent our latest block back to the sender
    RepliedLatest,
    /// Sent our whole chain back to the sender
    RepliedChain,
    /// Appended the peer's tip and broadcast it
    Appended(Block),
    /// Adopted the peer's longer chain and broadcast the new tip
    Replaced(Block),
    /// Asked the sender for its whole chain
    RequestedFullChain,
    /// Dropped the message without touching the chain
    Ignored(IgnoreReason),
}

/// Why a message was dropped
#[derive(Debug, Clone, PartialEq)]
pub enum IgnoreReason {
    Malformed,
    EmptyChain,
    StructureInvalid,
    NotAhead { local: u64, remote: u64 },
    Rejected(Rejection),
}

/// Drives the protocol for every link in the registry against one chain
#[derive(Debug, Clone)]
pub struct GossipEngine {
    chain: Arc<ChainStore>,
    peers: Arc<PeerRegistry>,
    /// Cancelled by [`GossipEngine::shutdown`]; every link, accept loop and
    /// pending handshake of the current session watches it
    session: Arc<RwLock<CancellationToken>>,
}

impl GossipEngine {
    pub fn new(chain: Arc<ChainStore>, peers: Arc<PeerRegistry>) -> Self {
        Self {
            chain,
            peers,
            session: Arc::new(RwLock::new(CancellationToken::new())),
        }
    }

    pub fn chain(&self) -> &Arc<ChainStore> {
        &self.chain
    }

    pub fn peers(&self) -> &Arc<PeerRegistry> {
        &self.peers
    }

    /// Decode a raw frame and handle it. Undecodable frames are dropped
    /// without a reply.
    pub async fn handle_frame(&self, from: &PeerId, frame: &str) -> Result<GossipOutcome> {
        match Message::decode(frame) {
            Ok(message) => self.handle_message(from, message).await,
            Err(e) => {
                warn!("Could not parse message from {}: {}", from, e);
                Ok(GossipOutcome::Ignored(IgnoreReason::Malformed))
            }
        }
    }

    /// Handle one decoded message from `from`
    pub async fn handle_message(&self, from: &PeerId, message: Message) -> Result<GossipOutcome> {
        debug!("Received {} from {}", message, from);
        match message {
            Message::QueryLatest => {
                let latest = self.chain.latest_block().await?;
                self.send(from, &Message::ResponseChain(vec![latest])).await?;
                Ok(GossipOutcome::RepliedLatest)
            }
            Message::QueryAll => {
                let chain = self.chain.current_chain().await;
                self.send(from, &Message::ResponseChain(chain)).await?;
                Ok(GossipOutcome::RepliedChain)
            }
            Message::ResponseChain(blocks) => self.reconcile(from, blocks).await,
        }
    }

    /// Decide whether to extend, replace or ignore based on a peer's chain
    /// (or just its tip).
    pub async fn reconcile(&self, from: &PeerId, received: Vec<Block>) -> Result<GossipOutcome> {
        let Some(peer_latest) = received.last() else {
            warn!("Received blockchain of size 0 from {}", from);
            return Ok(GossipOutcome::Ignored(IgnoreReason::EmptyChain));
        };

        if !structurally_valid(peer_latest) {
            warn!("Structure of the latest block from {} is not valid", from);
            return Ok(GossipOutcome::Ignored(IgnoreReason::StructureInvalid));
        }

        let held = self.chain.latest_block().await?;
        if peer_latest.index <= held.index {
            debug!(
                "Received blockchain is not longer than ours ({} <= {}), doing nothing",
                peer_latest.index, held.index
            );
            return Ok(GossipOutcome::Ignored(IgnoreReason::NotAhead {
                local: held.index,
                remote: peer_latest.index,
            }));
        }

        info!(
            "Blockchain possibly behind: we have {}, peer {} has {}",
            held.index, from, peer_latest.index
        );

        if peer_latest.previous_hash.as_deref() == Some(held.hash.as_str()) {
            let block = peer_latest.clone();
            return match self.chain.try_append(block.clone()).await {
                Ok(()) => {
                    info!("Appended block {} from {}", block, from);
                    self.broadcast_block(block.clone()).await?;
                    Ok(GossipOutcome::Appended(block))
                }
                Err(rejection) => {
                    warn!("Rejected block {} from {}: {}", block, from, rejection);
                    Ok(GossipOutcome::Ignored(IgnoreReason::Rejected(rejection)))
                }
            };
        }

        if received.len() == 1 {
            info!("Querying full chain from {}", from);
            self.send(from, &Message::QueryAll).await?;
            return Ok(GossipOutcome::RequestedFullChain);
        }

        info!("Received blockchain from {} is longer than ours, resolving", from);
        match self.chain.try_replace(received).await {
            Ok(tip) => {
                info!("Replaced current blockchain, new tip {}", tip);
                self.broadcast_block(tip.clone()).await?;
                Ok(GossipOutcome::Replaced(tip))
            }
            Err(rejection) => {
                warn!("Received invalid blockchain from {}: {}", from, rejection);
                Ok(GossipOutcome::Ignored(IgnoreReason::Rejected(rejection)))
            }
        }
    }

    /// Send our latest block to every registered peer. Returns how many
    /// links accepted it.
    pub async fn broadcast_latest(&self) -> Result<usize> {
        let latest = self.chain.latest_block().await?;
        self.broadcast_block(latest).await
    }

    /// Send `block` to every registered peer as a one-block chain response
    pub async fn broadcast_block(&self, block: Block) -> Result<usize> {
        let index = block.index;
        let frame = Message::ResponseChain(vec![block]).encode()?;
        let delivered = self.peers.broadcast(&frame).await;
        debug!("Broadcast block #{} to {} peers", index, delivered);
        Ok(delivered)
    }

    /// Queue one message for one peer
    pub async fn send(&self, to: &PeerId, message: &Message) -> Result<()> {
        let frame = message.encode()?;
        self.peers.send_to(to, frame).await?;
        Ok(())
    }

    /// Register an open WebSocket as a peer link, ask it for its latest
    /// block and start its reader and writer tasks.
    pub async fn attach<S>(
        &self,
        ws: WebSocketStream<S>,
        address: String,
        direction: PeerDirection,
    ) -> Result<PeerInfo>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let session = self.current_session().await;
        self.attach_in(ws, address, direction, session).await
    }

    async fn attach_in<S>(
        &self,
        ws: WebSocketStream<S>,
        address: String,
        direction: PeerDirection,
        session: CancellationToken,
    ) -> Result<PeerInfo>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (info, mut inbox) = self.peers.register(address, direction).await;

        // Shutdown cancels before it clears the registry, so a link
        // registered after the clear is caught here.
        if session.is_cancelled() {
            self.peers.remove(&info.id).await;
            return Err(NetworkError::LinkClosed { peer: info.address }.into());
        }
        if let Err(e) = self.send(&info.id, &Message::QueryLatest).await {
            self.peers.remove(&info.id).await;
            return Err(e);
        }
        info!("Peer {} connected ({:?})", info.address, direction);

        let (mut sink, stream) = ws.split();

        let mut writer = tokio::spawn(async move {
            while let Some(frame) = inbox.recv().await {
                if let Err(e) = sink.send(WsMessage::text(frame)).await {
                    debug!("Write to peer failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let engine = self.clone();
        let peer = info.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = session.cancelled() => debug!("Closing link to {} on shutdown", peer.address),
                _ = engine.read_link(&peer, stream) => {}
            }

            // Dropping the queue lets the writer flush and close the socket.
            engine.peers.remove(&peer.id).await;
            if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
                writer.abort();
            }
            info!("Peer {} disconnected", peer.address);
        });

        Ok(info)
    }

    /// Handle frames from one link until the remote closes it or it fails
    async fn read_link<S>(&self, peer: &PeerInfo, mut stream: SplitStream<WebSocketStream<S>>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(item) = stream.next().await {
            let outcome = match item {
                Ok(WsMessage::Text(text)) => self.handle_frame(&peer.id, text.as_str()).await,
                Ok(WsMessage::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.handle_frame(&peer.id, text).await,
                    Err(_) => {
                        debug!("Dropping non-UTF-8 frame from {}", peer.id);
                        continue;
                    }
                }
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Connection to peer {} failed: {}", peer.address, e);
                    break;
                }
            };
            if let Err(e) = outcome {
                error!("Failed to handle message from {}: {}", peer.id, e);
            }
        }
    }

    /// Open an outbound link to `address` (`ws://host:port` or `host:port`)
    pub async fn connect(&self, address: &str) -> Result<PeerInfo> {
        let url = peer_url(address)?;
        let session = self.current_session().await;
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| NetworkError::ConnectionFailed {
                addr: url.clone(),
                reason: e.to_string(),
            })?;
        self.attach_in(ws, url, PeerDirection::Outbound, session).await
    }

    /// Accept inbound links until the listener fails or the engine shuts down
    pub async fn serve(self, listener: TcpListener) {
        let session = self.current_session().await;
        loop {
            let accepted = tokio::select! {
                _ = session.cancelled() => return,
                accepted = listener.accept() => accepted,
            };
            let (stream, remote) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("P2P listener stopped: {}", e);
                    return;
                }
            };

            let engine = self.clone();
            let session = session.clone();
            tokio::spawn(async move { engine.accept_link(stream, remote, session).await });
        }
    }

    async fn accept_link(
        &self,
        stream: TcpStream,
        remote: SocketAddr,
        session: CancellationToken,
    ) {
        let handshake = tokio::select! {
            _ = session.cancelled() => return,
            handshake = tokio_tungstenite::accept_async(stream) => handshake,
        };
        match handshake {
            Ok(ws) => {
                if let Err(e) = self
                    .attach_in(ws, remote.to_string(), PeerDirection::Inbound, session)
                    .await
                {
                    warn!("Could not attach peer {}: {}", remote, e);
                }
            }
            Err(e) => warn!("WebSocket handshake with {} failed: {}", remote, e),
        }
    }

    /// Close every link of the current session and stop its accept loops
    /// and pending handshakes. Links attached afterwards belong to a fresh
    /// session. Returns how many links were closed.
    pub async fn shutdown(&self) -> usize {
        let mut session = self.session.write().await;
        session.cancel();
        *session = CancellationToken::new();
        drop(session);
        self.peers.clear().await
    }

    async fn current_session(&self) -> CancellationToken {
        self.session.read().await.clone()
    }
}

/// Normalize a peer address into a `ws://` URL
pub fn peer_url(address: &str) -> std::result::Result<String, NetworkError> {
    let address = address.trim();
    let invalid = |reason: &str| NetworkError::InvalidAddress {
        addr: address.to_string(),
        reason: reason.to_string(),
    };

    let rest = match address.split_once("://") {
        Some(("ws", rest)) => rest,
        Some((scheme, _)) => return Err(invalid(&format!("unsupported scheme {}", scheme))),
        None => address,
    };

    if rest.is_empty() || rest.chars().any(char::is_whitespace) {
        return Err(invalid("expected host:port"));
    }
    Ok(format!("ws://{}", rest))
}
