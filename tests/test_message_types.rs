use gossip_ledger::{
    block::{genesis, Block},
    error::SerializationError,
    gossip::peer_url,
    protocol::MessageType,
    Message,
};
use serde_json::{json, Value};

#[test]
fn test_query_envelopes() {
    assert_eq!(Message::QueryLatest.encode().unwrap(), r#"{"type":0,"data":null}"#);
    assert_eq!(Message::QueryAll.encode().unwrap(), r#"{"type":1,"data":null}"#);
    assert_eq!(Message::decode(r#"{"type":0,"data":null}"#).unwrap(), Message::QueryLatest);
    assert_eq!(Message::decode(r#"{"data":null,"type":1}"#).unwrap(), Message::QueryAll);
}

#[test]
fn test_response_data_is_json_text() {
    let block = Block::next(&genesis(), 1_700_000_000.5, "hello");
    let frame = Message::ResponseChain(vec![genesis(), block.clone()])
        .encode()
        .unwrap();

    let envelope: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(envelope["type"], 2);
    let data = envelope["data"].as_str().expect("data must be a string");

    let blocks: Value = serde_json::from_str(data).unwrap();
    assert_eq!(
        blocks[0],
        json!({"index": 1, "hash": "0", "previousHash": null, "timestamp": 0, "data": "First Block"})
    );
    assert_eq!(blocks[1]["previousHash"], "0");
    assert_eq!(blocks[1]["timestamp"], 1_700_000_000.5);
    assert_eq!(blocks[1]["hash"], block.hash.as_str());
}

#[test]
fn test_field_order_is_not_significant() {
    let block = Block::next(&genesis(), 12.0, "x");
    let reordered = json!([{
        "data": "x",
        "timestamp": 12,
        "previousHash": "0",
        "hash": block.hash,
        "index": 2
    }]);
    let frame = json!({ "data": reordered.to_string(), "type": 2 }).to_string();
    assert_eq!(Message::decode(&frame).unwrap(), Message::ResponseChain(vec![block]));
}

#[test]
fn test_interop_with_fractional_millisecond_timestamps() {
    // Timestamps produced as `millis / 1000` must survive a JSON round trip
    // with the same digest.
    let block = Block::next(&genesis(), 1_700_000_123_456.0 / 1000.0, "payload");
    let frame = Message::ResponseChain(vec![block.clone()]).encode().unwrap();
    match Message::decode(&frame).unwrap() {
        Message::ResponseChain(blocks) => {
            assert_eq!(blocks[0], block);
            assert_eq!(blocks[0].compute_hash(), block.hash);
        }
        other => panic!("unexpected message {:?}", other),
    }
}

#[test]
fn test_malformed_payloads() {
    let cases = [
        "",
        "{}",
        "[]",
        r#"{"type":"0","data":null}"#,
        r#"{"type":3,"data":null}"#,
        r#"{"type":-1,"data":null}"#,
        r#"{"type":2,"data":"not json"}"#,
        r#"{"type":2,"data":"[{\"index\":2}]"}"#,
        r#"{"type":2,"data":"[{\"index\":-2,\"hash\":\"a\",\"previousHash\":\"0\",\"timestamp\":1,\"data\":\"x\"}]"}"#,
        r#"{"type":2,"data":"[{\"index\":2,\"hash\":7,\"previousHash\":\"0\",\"timestamp\":1,\"data\":\"x\"}]"}"#,
    ];
    for case in cases {
        assert!(
            matches!(Message::decode(case), Err(SerializationError::MalformedMessage { .. })),
            "{:?} should be malformed",
            case
        );
    }
}

#[test]
fn test_message_type_tags() {
    assert_eq!(MessageType::try_from(0).unwrap(), MessageType::QueryLatest);
    assert_eq!(MessageType::try_from(1).unwrap(), MessageType::QueryAll);
    assert_eq!(MessageType::try_from(2).unwrap(), MessageType::ResponseChain);
    assert!(MessageType::try_from(3).is_err());
    assert_eq!(Message::ResponseChain(vec![]).message_type() as u8, 2);
}

#[test]
fn test_peer_url_normalization() {
    assert_eq!(peer_url("127.0.0.1:6001").unwrap(), "ws://127.0.0.1:6001");
    assert_eq!(peer_url("ws://localhost:6001").unwrap(), "ws://localhost:6001");
    assert_eq!(peer_url("  ws://host:1 ").unwrap(), "ws://host:1");
    assert!(peer_url("http://localhost:6001").is_err());
    assert!(peer_url("").is_err());
    assert!(peer_url("ws://").is_err());
    assert!(peer_url("bad host:1").is_err());
}
