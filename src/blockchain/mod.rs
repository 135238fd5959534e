pub mod block;
pub mod error;
pub mod model;
pub mod record;

pub use block::{Block, BlockHash, Payload};
pub use error::{BlockError, ChainError};
pub use model::{Chain, ImportSummary};
pub use record::BlockRecord;

/// SHA3-512 output size in bytes.
pub const HASH_SIZE: usize = 64;

/// Previous-hash stored on the genesis block.
pub const GENESIS_PREVIOUS_HASH: [u8; 1] = [0x00];

/// Default Proof-of-Work difficulty (number of leading zero bytes).
pub const DEFAULT_INITIAL_DIFFICULTY: u32 = 1;

/// Target seconds per block for auto-adjust
pub const BLOCK_GENERATION_INTERVAL_SECS: i64 = 10;

/// Blocks between difficulty recalculations
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;

/// Floor for an adjusted difficulty.
pub const MIN_DIFFICULTY: u32 = 0;

/// Non-genesis blocks can not be sealed with difficulty 0, so mining never
/// targets less than this even when the adjustment bottoms out.
pub const MIN_MINED_DIFFICULTY: u32 = 1;

/// Allowed fractional overshoot of a block timestamp past the local clock (1%).
pub const CLOCK_DRIFT_TOLERANCE: f64 = 0.01;

/// Tunables for a [`Chain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConfig {
    pub initial_difficulty: u32,
    pub block_generation_interval: i64,
    pub adjustment_interval: u64,
}

impl ChainConfig {
    /// Elapsed seconds one adjustment window is expected to take.
    pub fn expected_window_secs(&self) -> i64 {
        self.block_generation_interval
            .saturating_mul(self.adjustment_interval as i64)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            initial_difficulty: DEFAULT_INITIAL_DIFFICULTY,
            block_generation_interval: BLOCK_GENERATION_INTERVAL_SECS,
            adjustment_interval: DIFFICULTY_ADJUSTMENT_INTERVAL,
        }
    }
}
