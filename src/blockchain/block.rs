use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_512};

use super::error::BlockError;
use super::{CLOCK_DRIFT_TOLERANCE, GENESIS_PREVIOUS_HASH, HASH_SIZE};

/// SHA3-512 digest of a block.
pub type BlockHash = [u8; HASH_SIZE];

/// Current wall-clock time in whole seconds since the Unix epoch.
pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Payload committed into a block. Text is hashed as its UTF-8 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(s) => s.as_bytes(),
            Payload::Bytes(b) => b,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Bytes(Vec::new())
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_owned())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<&[u8]> for Payload {
    fn from(b: &[u8]) -> Self {
        Payload::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Bytes(b)
    }
}

/// A single, immutable link of the chain. The hash is computed once in
/// [`Block::new`] and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    index: u64,
    previous_hash: Vec<u8>,
    timestamp: i64, // Unix timestamp (UTC)
    data: Payload,
    difficulty: u32, // required leading zero bytes
    nonce: u64,
    hash: BlockHash,
}

impl Block {
    /// Build a block and seal it with its SHA3-512 hash.
    ///
    /// Only the genesis block (index 0) may omit `previous_hash`; it is then
    /// stored as the single sentinel byte `0x00`. Non-genesis blocks need a
    /// positive difficulty.
    pub fn new(
        index: u64,
        previous_hash: Option<Vec<u8>>,
        timestamp: i64,
        data: impl Into<Payload>,
        difficulty: u32,
        nonce: u64,
    ) -> Result<Self, BlockError> {
        if timestamp < 0 {
            return Err(BlockError::invalid(
                "timestamp",
                format!("must be non-negative, got {timestamp}"),
            ));
        }
        if difficulty == 0 && index != 0 && previous_hash.is_some() {
            return Err(BlockError::invalid(
                "difficulty",
                format!("block #{index} requires a positive difficulty"),
            ));
        }
        let previous_hash = match previous_hash {
            Some(prev) => prev,
            None if index == 0 => GENESIS_PREVIOUS_HASH.to_vec(),
            None => {
                return Err(BlockError::invalid(
                    "previous_hash",
                    format!("only the genesis block may omit it, got index {index}"),
                ));
            }
        };

        let mut block = Self {
            index,
            previous_hash,
            timestamp,
            data: data.into(),
            difficulty,
            nonce,
            hash: [0u8; HASH_SIZE],
        };
        block.hash = block.compute_hash();
        Ok(block)
    }

    /// Fixed-width big-endian integers, raw previous hash and raw payload,
    /// concatenated in field order.
    fn compute_hash(&self) -> BlockHash {
        let mut hasher = Sha3_512::new();
        hasher.update(self.index.to_be_bytes());
        hasher.update(&self.previous_hash);
        hasher.update(self.timestamp.to_be_bytes());
        hasher.update(self.data.as_bytes());
        hasher.update(self.difficulty.to_be_bytes());
        hasher.update(self.nonce.to_be_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; HASH_SIZE];
        out.copy_from_slice(&digest[..]);
        out
    }

    /// Temporal sanity check only: rejects blocks stamped further in the
    /// future than the clock-drift tolerance allows. Linkage and
    /// proof-of-work are checked at the chain level.
    pub fn is_valid(block: &Block) -> bool {
        let limit = (now_secs() as f64 * (1.0 + CLOCK_DRIFT_TOLERANCE)) as i64;
        block.timestamp <= limit
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn hash(&self) -> BlockHash {
        self.hash
    }

    pub fn previous_hash(&self) -> Vec<u8> {
        self.previous_hash.clone()
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn data(&self) -> Payload {
        self.data.clone()
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// True when `previous_hash` is exactly the hash of `previous`.
    pub fn links_to(&self, previous: &Block) -> bool {
        self.previous_hash.as_slice() == previous.hash.as_slice()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash_hex())
    }
}
