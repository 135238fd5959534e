use serde::{Deserialize, Serialize};

use super::block::{Block, Payload};
use super::error::BlockError;

/// JSON form of a block as exported by [`Chain::to_json`](super::Chain::to_json).
///
/// `index` and `difficulty` are signed so that negative values in foreign
/// input surface as construction errors. `nonce` is unsigned like the block's
/// own nonce; a negative one is rejected by the JSON decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub index: i64,
    pub hash: String,
    pub prev: String,
    pub timestamp: i64,
    pub data: Payload,
    pub difficulty: i64,
    pub nonce: u64,
}

impl From<&Block> for BlockRecord {
    fn from(block: &Block) -> Self {
        Self {
            // saturates; an index past i64::MAX no longer matches its hash on import
            index: i64::try_from(block.index()).unwrap_or(i64::MAX),
            hash: block.hash_hex(),
            prev: hex::encode(block.previous_hash()),
            timestamp: block.timestamp(),
            data: block.data(),
            difficulty: i64::from(block.difficulty()),
            nonce: block.nonce(),
        }
    }
}

impl BlockRecord {
    /// True when the stored `hash` names the same digest as `block`.
    pub fn claims_hash_of(&self, block: &Block) -> bool {
        hex::decode(&self.hash).is_ok_and(|h| h.as_slice() == block.hash().as_slice())
    }
}

/// Rebuilds the block from its fields; the stored `hash` is never trusted and
/// is not consulted here.
impl TryFrom<&BlockRecord> for Block {
    type Error = BlockError;

    fn try_from(record: &BlockRecord) -> Result<Self, Self::Error> {
        let index = u64::try_from(record.index).map_err(|_| {
            BlockError::invalid("index", format!("must be non-negative, got {}", record.index))
        })?;
        let difficulty = u32::try_from(record.difficulty).map_err(|_| {
            BlockError::invalid(
                "difficulty",
                format!("out of range: {}", record.difficulty),
            )
        })?;
        let prev = hex::decode(&record.prev)
            .map_err(|e| BlockError::invalid("previous_hash", format!("bad hex: {e}")))?;

        Block::new(
            index,
            Some(prev),
            record.timestamp,
            record.data.clone(),
            difficulty,
            record.nonce,
        )
    }
}
