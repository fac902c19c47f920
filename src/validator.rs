//! Validation of single blocks and whole candidate chains.
//!
//! Everything here is a pure function: no shared state is read or written
//! and nothing is logged. Callers decide how to report a [`Rejection`].

use crate::block::{structurally_valid, Block};
use crate::error::Rejection;

/// Check `candidate` as the direct successor of `predecessor`.
///
/// Checks run in order and stop at the first failure: structure, index,
/// linkage, digest.
pub fn validate_block_against(
    candidate: &Block,
    predecessor: &Block,
) -> std::result::Result<(), Rejection> {
    if !structurally_valid(candidate) {
        return Err(Rejection::StructureInvalid);
    }

    let expected = predecessor.index + 1;
    if candidate.index != expected {
        return Err(Rejection::IndexMismatch {
            expected,
            actual: candidate.index,
        });
    }

    if candidate.previous_hash.as_deref() != Some(predecessor.hash.as_str()) {
        return Err(Rejection::LinkageMismatch);
    }

    let computed = candidate.compute_hash();
    if computed != candidate.hash {
        return Err(Rejection::DigestMismatch {
            computed,
            stored: candidate.hash.clone(),
        });
    }

    Ok(())
}

/// Boolean form of [`validate_block_against`]
pub fn block_valid_against(candidate: &Block, predecessor: &Block) -> bool {
    validate_block_against(candidate, predecessor).is_ok()
}

/// Check a whole candidate chain: it must start with the genesis block and
/// every later block must validate against the one before it.
pub fn validate_chain(candidate: &[Block]) -> std::result::Result<(), Rejection> {
    let first = candidate.first().ok_or(Rejection::EmptyCandidateChain)?;
    if !first.is_genesis() {
        return Err(Rejection::GenesisMismatch);
    }

    candidate
        .windows(2)
        .try_for_each(|pair| validate_block_against(&pair[1], &pair[0]))
}

/// Boolean form of [`validate_chain`]
pub fn chain_valid(candidate: &[Block]) -> bool {
    validate_chain(candidate).is_ok()
}
