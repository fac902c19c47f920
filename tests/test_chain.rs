use gossip_ledger::{
    block::{canonical_preimage, digest, genesis, structurally_valid, Block},
    block_valid_against, chain_valid,
    validator::{validate_block_against, validate_chain},
    ChainStore, Rejection, Result,
};
use proptest::prelude::*;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Build a valid chain of `len` blocks starting at genesis
fn build_chain(len: usize) -> Vec<Block> {
    let mut chain = vec![genesis()];
    while chain.len() < len {
        let prev = chain.last().unwrap();
        let block = Block::next(
            prev,
            1_700_000_000.0 + chain.len() as f64,
            format!("block {}", chain.len()),
        );
        chain.push(block);
    }
    chain
}

#[test]
fn test_genesis_is_fixed() {
    let g = genesis();
    assert_eq!(g.index, 1);
    assert_eq!(g.hash, "0");
    assert_eq!(g.previous_hash, None);
    assert_eq!(g.timestamp, 0.0);
    assert_eq!(g.data, "First Block");
    assert!(g.is_genesis());
}

#[test]
fn test_digest_matches_independent_sha256() {
    let hash = digest(2, Some("0"), 1_700_000_000.25, "hello");

    let mut hasher = Sha256::new();
    hasher.update(b"201700000000.25hello");
    assert_eq!(hash, hex::encode(hasher.finalize()));
}

#[test]
fn test_digest_renders_missing_previous_hash_as_null() {
    assert_eq!(
        digest(1, None, 0.0, "First Block"),
        digest(1, Some("null"), 0.0, "First Block")
    );
    assert_eq!(canonical_preimage(7, None, 12.5, "x"), "7null12.5x");
}

#[test]
fn test_next_block_links_to_predecessor() {
    let g = genesis();
    let block = Block::next(&g, 42.0, "hello");
    assert_eq!(block.index, g.index + 1);
    assert_eq!(block.previous_hash.as_deref(), Some(g.hash.as_str()));
    assert_eq!(block.hash, block.compute_hash());
    assert!(block_valid_against(&block, &g));
}

#[test]
fn test_structural_checks() {
    let g = genesis();
    assert!(structurally_valid(&g));

    let mut block = Block::next(&g, 1.0, "a");
    block.timestamp = f64::INFINITY;
    assert!(!structurally_valid(&block));

    let mut block = Block::next(&g, 1.0, "a");
    block.hash.clear();
    assert!(!structurally_valid(&block));

}

#[test]
fn test_negative_timestamp_block_is_valid() {
    let g = genesis();
    let block = Block::next(&g, -1.5, "clock skew");
    assert!(structurally_valid(&block));
    assert_eq!(validate_block_against(&block, &g), Ok(()));
    assert!(block_valid_against(&block, &g));
    assert!(chain_valid(&[g, block]));
}

#[test]
fn test_rejection_reasons_in_order() {
    let g = genesis();
    let good = Block::next(&g, 10.0, "payload");

    let mut wrong_index = good.clone();
    wrong_index.index = 3;
    assert_eq!(
        validate_block_against(&wrong_index, &g),
        Err(Rejection::IndexMismatch {
            expected: 2,
            actual: 3
        })
    );

    let mut wrong_link = good.clone();
    wrong_link.previous_hash = Some("abc".to_string());
    assert_eq!(validate_block_against(&wrong_link, &g), Err(Rejection::LinkageMismatch));

    let mut no_link = good.clone();
    no_link.previous_hash = None;
    assert_eq!(validate_block_against(&no_link, &g), Err(Rejection::LinkageMismatch));

    let mut tampered = good.clone();
    tampered.data = "other payload".to_string();
    assert!(matches!(
        validate_block_against(&tampered, &g),
        Err(Rejection::DigestMismatch { .. })
    ));
}

#[test]
fn test_chain_validation() {
    assert!(chain_valid(&build_chain(1)));
    assert!(chain_valid(&build_chain(6)));
    assert_eq!(validate_chain(&[]), Err(Rejection::EmptyCandidateChain));

    let mut chain = build_chain(3);
    chain[0].data = "Another First Block".to_string();
    assert_eq!(validate_chain(&chain), Err(Rejection::GenesisMismatch));

    // A chain that starts from a different root is rejected even if it
    // links internally.
    let other_root = Block::new(1, "0", None, 1.0, "First Block");
    let follower = Block::next(&other_root, 2.0, "x");
    assert!(!chain_valid(&[other_root, follower]));

    let mut chain = build_chain(4);
    chain.swap(1, 2);
    assert!(!chain_valid(&chain));
}

#[tokio::test]
async fn test_store_starts_at_genesis() -> Result<()> {
    let store = ChainStore::new();
    assert_eq!(store.len().await, 1);
    assert_eq!(store.latest_block().await?, genesis());
    assert_eq!(store.current_chain().await, vec![genesis()]);
    Ok(())
}

#[tokio::test]
async fn test_store_append_and_replace() -> Result<()> {
    let store = ChainStore::new();
    let chain = build_chain(4);

    store.try_append(chain[1].clone()).await?;
    assert_eq!(store.latest_block().await?, chain[1]);

    // Same block again no longer links to the tip.
    assert!(store.try_append(chain[1].clone()).await.is_err());

    let tip = store.try_replace(chain.clone()).await?;
    assert_eq!(tip, chain[3]);
    assert_eq!(store.current_chain().await, chain);

    // Equal length is never adopted.
    let rival = {
        let mut rival = build_chain(3);
        let prev = rival.last().unwrap().clone();
        rival.push(Block::next(&prev, 99.0, "rival"));
        rival
    };
    assert_eq!(
        store.try_replace(rival).await,
        Err(Rejection::NotLonger {
            candidate: 4,
            current: 4
        })
    );
    assert_eq!(store.current_chain().await, chain);
    Ok(())
}

#[tokio::test]
async fn test_store_rejects_invalid_seed() {
    let mut chain = build_chain(3);
    chain[2].data.push('!');
    assert!(ChainStore::from_chain(chain).is_err());
    assert!(ChainStore::from_chain(Vec::new()).is_err());
}

#[tokio::test]
async fn test_concurrent_appends_on_same_predecessor() -> Result<()> {
    let store = Arc::new(ChainStore::new());
    let g = genesis();
    let first = Block::next(&g, 100.0, "alice");
    let second = Block::next(&g, 100.0, "bob");

    let a = tokio::spawn({
        let store = store.clone();
        async move { store.try_append(first).await }
    });
    let b = tokio::spawn({
        let store = store.clone();
        async move { store.try_append(second).await }
    });

    let results = [a.await.unwrap(), b.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    assert_eq!(store.len().await, 2);
    assert!(chain_valid(&store.current_chain().await));
    Ok(())
}

#[tokio::test]
async fn test_propose_builds_on_tip() -> Result<()> {
    let store = ChainStore::new();
    let block = store.propose("hello", 1_700_000_000.5).await?;
    assert_eq!(block.index, 2);
    assert_eq!(block.previous_hash.as_deref(), Some("0"));
    assert_eq!(
        block.hash,
        digest(2, Some("0"), 1_700_000_000.5, "hello")
    );
    assert_eq!(store.latest_block().await?, block);
    Ok(())
}

proptest! {
    #[test]
    fn prop_digest_is_deterministic(index in 0u64..1_000_000, ts in 0.0f64..2e9, data in ".*") {
        prop_assert_eq!(
            digest(index, Some("prev"), ts, &data),
            digest(index, Some("prev"), ts, &data)
        );
    }

    #[test]
    fn prop_different_data_different_digest(a in "[a-z]{0,16}", b in "[a-z]{0,16}") {
        prop_assume!(a != b);
        prop_assert_ne!(digest(2, Some("0"), 1.0, &a), digest(2, Some("0"), 1.0, &b));
    }

    #[test]
    fn prop_wrong_index_always_rejected(offset in 2u64..1000, ts in 0.0f64..2e9) {
        let g = genesis();
        let index = g.index + offset;
        // Hash is correct for the fields, only the position is wrong.
        let hash = digest(index, Some(g.hash.as_str()), ts, "data");
        let block = Block::new(index, hash, Some(g.hash.clone()), ts, "data");
        prop_assert!(!block_valid_against(&block, &g));
    }

    #[test]
    fn prop_any_mutation_invalidates_chain(len in 2usize..8, pick in any::<prop::sample::Index>(), field in 0u8..5) {
        let mut chain = build_chain(len);
        prop_assert!(chain_valid(&chain));

        let position = 1 + pick.index(len - 1);
        let block = &mut chain[position];
        match field {
            0 => block.index += 1,
            1 => block.hash.push('f'),
            2 => block.previous_hash = Some("tampered".to_string()),
            3 => block.timestamp += 0.5,
            _ => block.data.push('x'),
        }
        prop_assert!(!chain_valid(&chain));
    }

    #[test]
    fn prop_longest_valid_chain_wins_once(local in 1usize..5, extra in 1usize..4) {
        let store = ChainStore::from_chain(build_chain(local)).unwrap();
        let candidate = build_chain(local + extra);

        tokio_test::block_on(async {
            prop_assert!(store.try_replace(candidate.clone()).await.is_ok());
            prop_assert_eq!(store.current_chain().await, candidate.clone());

            // Delivering the same chain again changes nothing.
            prop_assert!(store.try_replace(candidate.clone()).await.is_err());
            prop_assert_eq!(store.len().await, local + extra);

            // Shorter, internally valid chains are never adopted.
            prop_assert!(store.try_replace(build_chain(local)).await.is_err());
            prop_assert_eq!(store.current_chain().await, candidate);
            Ok(())
        })?;
    }
}
