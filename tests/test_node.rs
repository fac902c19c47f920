use gossip_ledger::{
    block::{digest, genesis, Block},
    chain_valid, Ledger, LedgerError, LedgerNode, Message, NodeConfig, PeerDirection, Result,
};
use std::collections::HashSet;

#[tokio::test]
async fn test_propose_block_on_genesis() -> Result<()> {
    let ledger = Ledger::default();
    let g = genesis();

    let block = ledger.propose_block("hello").await?;
    assert_eq!(block.index, g.index + 1);
    assert_eq!(block.previous_hash.as_deref(), Some(g.hash.as_str()));
    assert_eq!(block.data, "hello");
    assert_eq!(
        block.hash,
        digest(block.index, Some(g.hash.as_str()), block.timestamp, "hello")
    );
    assert_eq!(ledger.latest_block().await?, block);
    assert_eq!(ledger.current_chain().await, vec![g, block]);
    Ok(())
}

#[tokio::test]
async fn test_propose_block_broadcasts_to_peers() -> Result<()> {
    let ledger = Ledger::default();
    let (_peer, mut inbox) = ledger
        .engine()
        .peers()
        .register("fake-peer", PeerDirection::Outbound)
        .await;

    let block = ledger.propose_block("gossip me").await?;
    let frame = inbox.try_recv().expect("block should be broadcast");
    assert_eq!(Message::decode(&frame).unwrap(), Message::ResponseChain(vec![block]));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_proposals_are_serialized() -> Result<()> {
    let ledger = Ledger::default();

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.propose_block(&format!("tx-{}", i)).await })
        })
        .collect();

    let mut indices = HashSet::new();
    for handle in handles {
        let block = handle.await.expect("task panicked")?;
        assert!(indices.insert(block.index), "index {} handed out twice", block.index);
    }

    let chain = ledger.current_chain().await;
    assert_eq!(chain.len(), 33);
    assert!(chain_valid(&chain));
    Ok(())
}

#[tokio::test]
async fn test_builder_seeds_chain() -> Result<()> {
    let g = genesis();
    let second = Block::next(&g, 10.0, "seeded");
    let node = LedgerNode::builder()
        .with_chain(vec![g.clone(), second.clone()])
        .build()?;
    assert_eq!(node.latest_block().await?, second);

    let mut broken = second;
    broken.data = "edited".to_string();
    let result = LedgerNode::builder().with_chain(vec![g, broken]).build();
    assert!(matches!(result, Err(LedgerError::Rejected(_))));
    Ok(())
}

#[tokio::test]
async fn test_node_start_and_stop() -> Result<()> {
    let config = NodeConfig {
        p2p_port: 0,
        http_port: 0,
        ..NodeConfig::default()
    };
    let mut node = LedgerNode::builder().with_config(config).build()?;
    assert!(!node.is_running().await);
    assert!(node.p2p_addr().is_none());

    node.start().await?;
    assert!(node.is_running().await);
    assert!(node.p2p_addr().is_some());
    assert!(node.http_addr().is_some());

    node.stop().await?;
    assert!(!node.is_running().await);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_initial_peer_does_not_fail_start() -> Result<()> {
    let mut node = LedgerNode::builder()
        .p2p_port(0)
        .http_enabled(false)
        .peer("ws://127.0.0.1:1")
        .build()?;
    node.start().await?;
    assert!(node.peers().await.is_empty());
    node.stop().await?;
    Ok(())
}
