//! Blocks, the genesis block and the content digest that links them

use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hash of the genesis block
pub const GENESIS_HASH: &str = "0";

/// Index of the genesis block
pub const GENESIS_INDEX: u64 = 1;

/// Payload of the genesis block
pub const GENESIS_DATA: &str = "First Block";

/// Text substituted for an absent previous hash when computing a digest
const NULL_TEXT: &str = "null";

/// Largest integer an `f64` holds exactly
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A single entry in the ledger. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub hash: String,
    pub previous_hash: Option<String>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: f64,
    pub data: String,
}

impl Block {
    /// Create a block with an explicit hash. The hash is not checked here.
    pub fn new(
        index: u64,
        hash: impl Into<String>,
        previous_hash: Option<String>,
        timestamp: f64,
        data: impl Into<String>,
    ) -> Self {
        Self {
            index,
            hash: hash.into(),
            previous_hash,
            timestamp,
            data: data.into(),
        }
    }

    /// Build the successor of `previous` carrying `data`, hashing it on the way
    pub fn next(previous: &Block, timestamp: f64, data: impl Into<String>) -> Self {
        let data = data.into();
        let index = previous.index + 1;
        let hash = digest(index, Some(&previous.hash), timestamp, &data);
        Self {
            index,
            hash,
            previous_hash: Some(previous.hash.clone()),
            timestamp,
            data,
        }
    }

    /// Recompute the digest of this block's fields
    pub fn compute_hash(&self) -> String {
        digest(
            self.index,
            self.previous_hash.as_deref(),
            self.timestamp,
            &self.data,
        )
    }

    /// Whether this block is the fixed genesis block, field for field
    pub fn is_genesis(&self) -> bool {
        *self == genesis()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {}",
            self.index,
            crate::utils::short_hash(&self.hash)
        )
    }
}

/// The block every valid chain starts with. Identical on every node.
pub fn genesis() -> Block {
    Block {
        index: GENESIS_INDEX,
        hash: GENESIS_HASH.to_string(),
        previous_hash: None,
        timestamp: 0.0,
        data: GENESIS_DATA.to_string(),
    }
}

/// SHA-256 over `index ++ previousHash ++ timestamp ++ data`, hex encoded.
///
/// Fields are concatenated without separators using [`canonical_preimage`].
pub fn digest(index: u64, previous_hash: Option<&str>, timestamp: f64, data: &str) -> String {
    let preimage = canonical_preimage(index, previous_hash, timestamp, data);
    let mut hasher = Sha256::new();
    hasher.update(preimage.as_bytes());
    hex::encode(hasher.finalize())
}

/// The exact text hashed by [`digest`].
///
/// The index is plain decimal, an absent previous hash is the text `null`
/// and the timestamp uses [`render_timestamp`].
pub fn canonical_preimage(
    index: u64,
    previous_hash: Option<&str>,
    timestamp: f64,
    data: &str,
) -> String {
    format!(
        "{}{}{}{}",
        index,
        previous_hash.unwrap_or(NULL_TEXT),
        render_timestamp(timestamp),
        data
    )
}

/// Shortest decimal text that round-trips the timestamp; integral values
/// carry no fractional part (`0`, `1700000000`, `1700000000.123`).
pub fn render_timestamp(timestamp: f64) -> String {
    if timestamp == 0.0 {
        // covers -0.0 as well
        return "0".to_string();
    }
    format!("{}", timestamp)
}

/// Shape checks that the type system does not already enforce.
///
/// Chain position and digest are not looked at. The timestamp is only
/// informational, so any finite value passes, including negative ones.
pub fn structurally_valid(block: &Block) -> bool {
    block.timestamp.is_finite()
        && !block.hash.is_empty()
        && block
            .previous_hash
            .as_ref()
            .map_or(true, |prev| !prev.is_empty())
}

fn serialize_timestamp<S>(timestamp: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if timestamp.fract() == 0.0 && timestamp.abs() < MAX_EXACT_INTEGER {
        serializer.serialize_i64(*timestamp as i64)
    } else {
        serializer.serialize_f64(*timestamp)
    }
}
