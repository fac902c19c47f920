//! Peer identities and the registry of open peer links

use crate::error::NetworkError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Unique identifier for a peer link
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(Uuid);

impl PeerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Which side opened the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerDirection {
    Inbound,
    Outbound,
}

/// Information about a connected peer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub address: String,
    pub direction: PeerDirection,
    pub connected_at: chrono::DateTime<chrono::Utc>,
}

impl PeerInfo {
    pub fn new(address: impl Into<String>, direction: PeerDirection) -> Self {
        Self {
            id: PeerId::new(),
            address: address.into(),
            direction,
            connected_at: chrono::Utc::now(),
        }
    }
}

/// Outbound half of a link: encoded frames queued here are written to the
/// socket by the link's writer task.
pub type LinkSender = mpsc::UnboundedSender<String>;

/// Frames queued for a link, consumed by its writer task
pub type LinkReceiver = mpsc::UnboundedReceiver<String>;

#[derive(Debug)]
struct PeerLink {
    info: PeerInfo,
    outbound: LinkSender,
}

/// The set of currently open peer links, keyed by [`PeerId`].
///
/// Iteration follows registration order. Sending only enqueues, so callers
/// never wait on a slow peer.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    links: RwLock<IndexMap<PeerId, PeerLink>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened link and return its info together with the
    /// queue its writer task should drain.
    pub async fn register(
        &self,
        address: impl Into<String>,
        direction: PeerDirection,
    ) -> (PeerInfo, LinkReceiver) {
        let (outbound, inbox) = mpsc::unbounded_channel();
        let info = PeerInfo::new(address, direction);
        let mut links = self.links.write().await;
        links.insert(
            info.id.clone(),
            PeerLink {
                info: info.clone(),
                outbound,
            },
        );
        debug!("Registered peer {} ({}), {} links open", info.id, info.address, links.len());
        (info, inbox)
    }

    /// Drop a link. Nothing is sent to it afterwards.
    pub async fn remove(&self, id: &PeerId) -> Option<PeerInfo> {
        let mut links = self.links.write().await;
        links.shift_remove(id).map(|link| link.info)
    }

    /// All open links, in registration order
    pub async fn all(&self) -> Vec<PeerInfo> {
        let links = self.links.read().await;
        links.values().map(|link| link.info.clone()).collect()
    }

    /// Drop every link. Their writer tasks see the queue close and shut the
    /// socket down.
    pub async fn clear(&self) -> usize {
        let mut links = self.links.write().await;
        let closed = links.len();
        links.clear();
        closed
    }

    pub async fn len(&self) -> usize {
        self.links.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.links.read().await.is_empty()
    }

    /// Queue a frame for one peer
    pub async fn send_to(&self, id: &PeerId, frame: String) -> Result<(), NetworkError> {
        let links = self.links.read().await;
        let link = links.get(id).ok_or_else(|| NetworkError::LinkClosed {
            peer: id.to_string(),
        })?;
        link.outbound
            .send(frame)
            .map_err(|_| NetworkError::LinkClosed {
                peer: id.to_string(),
            })
    }

    /// Queue a frame for every open link. Best effort; returns how many links
    /// accepted it.
    pub async fn broadcast(&self, frame: &str) -> usize {
        let links = self.links.read().await;
        links
            .values()
            .filter(|link| link.outbound.send(frame.to_string()).is_ok())
            .count()
    }
}
