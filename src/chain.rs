//! The node's current chain and the only code paths allowed to change it

use crate::block::{genesis, Block};
use crate::error::{LedgerError, Rejection, Result};
use crate::validator::{validate_block_against, validate_chain};
use tokio::sync::RwLock;

/// An ordered sequence of blocks
pub type Chain = Vec<Block>;

/// Owner of the current chain.
///
/// Every read that decides a mutation happens under the same write guard as
/// the mutation itself, so two handlers racing to extend the same tip cannot
/// both succeed. No I/O is ever performed while a guard is held.
#[derive(Debug)]
pub struct ChainStore {
    blocks: RwLock<Chain>,
}

impl ChainStore {
    /// Create a store holding only the genesis block
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(vec![genesis()]),
        }
    }

    /// Create a store from an existing chain, which must be valid
    pub fn from_chain(chain: Chain) -> std::result::Result<Self, Rejection> {
        validate_chain(&chain)?;
        Ok(Self {
            blocks: RwLock::new(chain),
        })
    }

    /// Snapshot of the current chain
    pub async fn current_chain(&self) -> Chain {
        self.blocks.read().await.clone()
    }

    /// Last block of the current chain
    pub async fn latest_block(&self) -> Result<Block> {
        let blocks = self.blocks.read().await;
        tip(&blocks).cloned()
    }

    /// Number of blocks in the current chain
    pub async fn len(&self) -> usize {
        self.blocks.read().await.len()
    }

    /// Append `block` if it validates against the tip at the moment of the call
    pub async fn try_append(&self, block: Block) -> std::result::Result<(), Rejection> {
        let mut blocks = self.blocks.write().await;
        // A non-empty chain is established by every constructor.
        let Some(latest) = blocks.last() else {
            return Err(Rejection::EmptyCandidateChain);
        };
        validate_block_against(&block, latest)?;
        blocks.push(block);
        Ok(())
    }

    /// Replace the current chain with `candidate` if it is valid and strictly
    /// longer. Returns the new tip.
    pub async fn try_replace(&self, candidate: Chain) -> std::result::Result<Block, Rejection> {
        // Validity does not depend on local state, so it is checked before
        // taking the lock.
        validate_chain(&candidate)?;

        let mut blocks = self.blocks.write().await;
        if candidate.len() <= blocks.len() {
            return Err(Rejection::NotLonger {
                candidate: candidate.len(),
                current: blocks.len(),
            });
        }
        *blocks = candidate;
        blocks.last().cloned().ok_or(Rejection::EmptyCandidateChain)
    }

    /// Build a block on top of the current tip and append it, all under one
    /// write guard.
    pub async fn propose(&self, data: &str, timestamp: f64) -> Result<Block> {
        let mut blocks = self.blocks.write().await;
        let latest = tip(&blocks)?;
        let candidate = Block::next(latest, timestamp, data);

        validate_block_against(&candidate, latest).map_err(|rejection| {
            LedgerError::internal(format!(
                "locally built block {} failed validation: {}",
                candidate.index, rejection
            ))
        })?;

        blocks.push(candidate.clone());
        Ok(candidate)
    }
}

impl Default for ChainStore {
    fn default() -> Self {
        Self::new()
    }
}

fn tip(blocks: &[Block]) -> Result<&Block> {
    blocks
        .last()
        .ok_or_else(|| LedgerError::invariant("current chain is empty"))
}
