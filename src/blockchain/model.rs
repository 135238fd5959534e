use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, info, warn};

use super::block::{Block, Payload, now_secs};
use super::error::{ChainError, Result};
use super::record::BlockRecord;
use super::{ChainConfig, GENESIS_PREVIOUS_HASH, MIN_DIFFICULTY, MIN_MINED_DIFFICULTY};

/// Outcome of importing an exported chain onto an existing one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub accepted: usize,
    pub rejected: usize,
}

/// Append-only, in-memory proof-of-work chain.
#[derive(Debug, Clone)]
pub struct Chain {
    blocks: Vec<Block>,
    config: ChainConfig,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    /// Initialize a new chain with a genesis block and default settings.
    pub fn new() -> Self {
        Self::with_config(ChainConfig::default())
    }

    pub fn with_config(config: ChainConfig) -> Self {
        Self {
            blocks: vec![Self::genesis_block(&config)],
            config,
        }
    }

    /// Start a chain from an existing genesis block (index 0, sentinel previous hash).
    pub fn from_genesis(genesis: Block, config: ChainConfig) -> Result<Self> {
        if genesis.index() != 0 {
            return Err(ChainError::InvalidGenesis(format!(
                "expected index 0, got {}",
                genesis.index()
            )));
        }
        if genesis.previous_hash() != GENESIS_PREVIOUS_HASH {
            return Err(ChainError::InvalidGenesis(format!(
                "previous hash must be the 0x00 sentinel, got {}",
                hex::encode(genesis.previous_hash())
            )));
        }
        Ok(Self {
            blocks: vec![genesis],
            config,
        })
    }

    fn genesis_block(config: &ChainConfig) -> Block {
        let timestamp = now_secs().max(0);
        match Block::new(
            0,
            None,
            timestamp,
            Payload::default(),
            config.initial_difficulty,
            0,
        ) {
            Ok(block) => block,
            Err(e) => unreachable!("genesis fields are always valid: {e}"),
        }
    }

    fn tip(&self) -> &Block {
        self.blocks
            .last()
            .expect("Chain should always have at least the genesis block")
    }

    pub fn config(&self) -> ChainConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Snapshot of every block, genesis first.
    pub fn blocks(&self) -> Vec<Block> {
        self.blocks.clone()
    }

    pub fn block(&self, index: u64) -> Option<Block> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.blocks.get(i))
            .cloned()
    }

    pub fn latest_block(&self) -> Block {
        self.tip().clone()
    }

    /// Mine a block carrying `data` on top of the current tip and append it.
    ///
    /// Blocks the calling thread until a nonce is found.
    pub fn mine(&mut self, data: impl Into<Payload>) -> Result<Block> {
        let index = self.tip().index() + 1;
        self.search(data.into(), None)?
            .ok_or(ChainError::NonceSpaceExhausted { index })
    }

    /// Like [`Chain::mine`], but gives up and returns `None` as soon as `cancel`
    /// is raised. The chain is left untouched in that case.
    pub fn mine_cancellable(
        &mut self,
        data: impl Into<Payload>,
        cancel: &AtomicBool,
    ) -> Result<Option<Block>> {
        self.search(data.into(), Some(cancel))
    }

    fn search(&mut self, data: Payload, cancel: Option<&AtomicBool>) -> Result<Option<Block>> {
        let tip = self.latest_block();
        let index = tip.index() + 1;
        let previous_hash = tip.hash().to_vec();
        let difficulty = self.mining_difficulty();
        // sampled once per attempt
        let timestamp = now_secs();
        let started = Instant::now();

        debug!("MINER - searching block #{index} at difficulty {difficulty}");

        for nonce in 0..=u64::MAX {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                info!("MINER - cancelled block #{index} after {nonce} attempts");
                return Ok(None);
            }

            let candidate = Block::new(
                index,
                Some(previous_hash.clone()),
                timestamp,
                data.clone(),
                difficulty,
                nonce,
            )?;

            if meets_difficulty(&candidate.hash(), difficulty) {
                info!(
                    "MINER - sealed block #{} (hash={}, nonce={}, {:?})",
                    index,
                    candidate.hash_hex(),
                    nonce,
                    started.elapsed()
                );
                self.blocks.push(candidate.clone());
                return Ok(Some(candidate));
            }
        }

        Err(ChainError::NonceSpaceExhausted { index })
    }

    /// Difficulty the next block must meet.
    ///
    /// Recomputed every `adjustment_interval` blocks, otherwise the tip's own
    /// difficulty carries over.
    pub fn current_difficulty(&self) -> u32 {
        let tip = self.tip();
        let interval = self.config.adjustment_interval;

        if interval > 0 && tip.index() > 0 && tip.index() % interval == 0 {
            self.adjusted_difficulty(tip)
        } else {
            tip.difficulty()
        }
    }

    /// Difficulty a freshly mined block is sealed with.
    pub fn mining_difficulty(&self) -> u32 {
        self.current_difficulty().max(MIN_MINED_DIFFICULTY)
    }

    fn adjusted_difficulty(&self, tip: &Block) -> u32 {
        let window_start = tip
            .index()
            .checked_sub(self.config.adjustment_interval)
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| self.blocks.get(i));
        let Some(window_start) = window_start else {
            return tip.difficulty();
        };

        let expected = self.config.expected_window_secs();
        let elapsed = tip.timestamp() - window_start.timestamp();
        let base = window_start.difficulty();

        let next = if elapsed.saturating_mul(2) < expected {
            base.saturating_add(1)
        } else if elapsed > expected.saturating_mul(2) {
            base.saturating_sub(1).max(MIN_DIFFICULTY)
        } else {
            base
        };

        debug!(
            "DIFFICULTY - window #{}..#{} took {}s (expected {}s): {} -> {}",
            window_start.index(),
            tip.index(),
            elapsed,
            expected,
            base,
            next
        );
        next
    }

    /// Append an externally built block if it passes the temporal check and
    /// the chain extended by it is structurally valid. Returns whether it was
    /// appended; a rejected block leaves the chain unchanged.
    pub fn add_block(&mut self, block: Block) -> bool {
        if !Block::is_valid(&block) {
            warn!(
                "IMPORT - rejected block #{}: timestamp {} is in the future",
                block.index(),
                block.timestamp()
            );
            return false;
        }

        let mut candidate_blocks = self.blocks.clone();
        candidate_blocks.push(block);

        if !Self::validate(&candidate_blocks) {
            if let Some(b) = candidate_blocks.last() {
                warn!(
                    "IMPORT - rejected block #{} ({}): does not extend tip #{}",
                    b.index(),
                    b.hash_hex(),
                    self.tip().index()
                );
            }
            return false;
        }

        self.blocks = candidate_blocks;
        info!("IMPORT - appended block #{}", self.tip().index());
        true
    }

    /// Structural validation of a block sequence: every block after the first
    /// passes the temporal check, links to its predecessor's hash and carries
    /// the next index. Proof-of-work is not re-checked here.
    pub fn validate(blocks: &[Block]) -> bool {
        blocks.windows(2).all(|pair| {
            let (previous, current) = (&pair[0], &pair[1]);
            Block::is_valid(current)
                && current.links_to(previous)
                && previous.index().checked_add(1) == Some(current.index())
        })
    }

    pub fn is_valid(chain: &Chain) -> bool {
        Self::validate(&chain.blocks)
    }

    pub fn to_json(&self) -> Result<String> {
        let records: Vec<BlockRecord> = self.blocks.iter().map(BlockRecord::from).collect();
        Ok(serde_json::to_string(&records)?)
    }

    /// Import every block of an export onto this chain through
    /// [`Chain::add_block`].
    ///
    /// Malformed JSON or a record that can not be built into a block fails the
    /// whole call before anything is appended. Blocks that merely disagree with
    /// this chain (bad linkage, wrong index, stored hash not matching the
    /// re-derived one) are skipped and counted as rejected.
    pub fn load_from_json(&mut self, json: &str) -> Result<ImportSummary> {
        let decoded = decode(json)?;
        Ok(self.import(decoded))
    }

    /// Rebuild a chain from an export; the first record becomes the genesis.
    pub fn from_json(json: &str, config: ChainConfig) -> Result<Self> {
        let mut decoded = decode(json)?.into_iter();
        let (genesis, hash_ok) = decoded
            .next()
            .ok_or_else(|| ChainError::InvalidGenesis("export contains no blocks".into()))?;
        if !hash_ok {
            return Err(ChainError::InvalidGenesis(
                "stored hash does not match block contents".into(),
            ));
        }

        let mut chain = Self::from_genesis(genesis, config)?;
        let summary = chain.import(decoded.collect());
        if summary.rejected > 0 {
            warn!(
                "IMPORT - rebuilt chain of {} blocks, {} rejected",
                chain.len(),
                summary.rejected
            );
        }
        Ok(chain)
    }

    fn import(&mut self, decoded: Vec<(Block, bool)>) -> ImportSummary {
        let mut summary = ImportSummary::default();
        for (block, hash_ok) in decoded {
            let index = block.index();
            let accepted = if hash_ok {
                self.add_block(block)
            } else {
                warn!("IMPORT - rejected block #{index}: stored hash does not match contents");
                false
            };
            debug!("IMPORT - record #{index} accepted={accepted}");
            if accepted {
                summary.accepted += 1;
            } else {
                summary.rejected += 1;
            }
        }
        summary
    }
}

/// Parse an export and rebuild every block, pairing each with whether its
/// stored hash agrees with the re-derived one.
fn decode(json: &str) -> Result<Vec<(Block, bool)>> {
    let records: Vec<BlockRecord> = serde_json::from_str(json)?;
    records
        .iter()
        .map(|record| -> Result<(Block, bool)> {
            let block = Block::try_from(record)?;
            let hash_ok = record.claims_hash_of(&block);
            Ok((block, hash_ok))
        })
        .collect()
}

/// True when the first `difficulty` bytes of `hash` are zero.
pub fn meets_difficulty(hash: &[u8], difficulty: u32) -> bool {
    let n = difficulty as usize;
    hash.len() >= n && hash[..n].iter().all(|b| *b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{DEFAULT_INITIAL_DIFFICULTY, HASH_SIZE};

    /// Genesis far enough in the past that a whole synthetic chain stays
    /// behind the local clock.
    fn past_genesis(difficulty: u32) -> Chain {
        let t0 = now_secs() - 100_000;
        let genesis = Block::new(0, None, t0, Payload::default(), difficulty, 0).unwrap();
        Chain::from_genesis(genesis, ChainConfig::default()).unwrap()
    }

    /// Append `count` unmined blocks spaced `step` seconds apart.
    fn extend(chain: &mut Chain, count: u64, step: i64, difficulty: u32) {
        for _ in 0..count {
            let tip = chain.latest_block();
            let block = Block::new(
                tip.index() + 1,
                Some(tip.hash().to_vec()),
                tip.timestamp() + step,
                format!("block {}", tip.index() + 1),
                difficulty,
                0,
            )
            .unwrap();
            assert!(chain.add_block(block));
        }
    }

    #[test]
    fn genesis_block_shape() {
        let chain = Chain::new();
        assert_eq!(chain.len(), 1);
        let g = chain.latest_block();
        assert_eq!(g.index(), 0);
        assert_eq!(g.previous_hash(), vec![0x00]);
        assert_eq!(g.difficulty(), DEFAULT_INITIAL_DIFFICULTY);
        assert_eq!(g.nonce(), 0);
        assert!(g.data().is_empty());
    }

    #[test]
    fn configured_initial_difficulty() {
        let chain = Chain::with_config(ChainConfig {
            initial_difficulty: 2,
            ..ChainConfig::default()
        });
        assert_eq!(chain.latest_block().difficulty(), 2);
        assert_eq!(chain.current_difficulty(), 2);
    }

    #[test]
    fn from_genesis_rejects_non_genesis() {
        let b = Block::new(1, Some(vec![1; HASH_SIZE]), 10, "x", 1, 0).unwrap();
        assert!(matches!(
            Chain::from_genesis(b, ChainConfig::default()),
            Err(ChainError::InvalidGenesis(_))
        ));

        let b = Block::new(0, Some(vec![1; HASH_SIZE]), 10, "x", 1, 0).unwrap();
        assert!(Chain::from_genesis(b, ChainConfig::default()).is_err());
    }

    #[test]
    fn mined_blocks_satisfy_pow_and_link() {
        let mut chain = Chain::new();
        for i in 0..3 {
            let b = chain.mine(format!("payload {i}")).unwrap();
            assert!(meets_difficulty(&b.hash(), b.difficulty()));
            assert!(b.difficulty() >= 1);
        }
        let blocks = chain.blocks();
        assert_eq!(blocks.len(), 4);
        for pair in blocks.windows(2) {
            assert_eq!(pair[1].index(), pair[0].index() + 1);
            assert_eq!(pair[1].previous_hash(), pair[0].hash().to_vec());
        }
        assert!(Chain::is_valid(&chain));
    }

    #[test]
    fn mine_accepts_raw_bytes() {
        let mut chain = Chain::new();
        let b = chain.mine(vec![0xde, 0xad, 0xbe, 0xef]).unwrap();
        assert_eq!(b.data(), Payload::Bytes(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(chain.latest_block(), b);
    }

    #[test]
    fn cancelled_mining_leaves_chain_untouched() {
        let mut chain = Chain::new();
        let cancel = AtomicBool::new(true);
        assert!(chain.mine_cancellable("never", &cancel).unwrap().is_none());
        assert_eq!(chain.len(), 1);

        cancel.store(false, Ordering::Relaxed);
        assert!(chain.mine_cancellable("now", &cancel).unwrap().is_some());
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn meets_difficulty_counts_bytes() {
        let mut h = [0u8; HASH_SIZE];
        assert!(meets_difficulty(&h, 0));
        assert!(meets_difficulty(&h, 64));
        assert!(!meets_difficulty(&h, 65));
        h[1] = 0x01;
        assert!(meets_difficulty(&h, 1));
        assert!(!meets_difficulty(&h, 2));
    }

    #[test]
    fn add_block_accepts_linked_block() {
        let mut chain = Chain::new();
        let tip = chain.latest_block();
        let b = Block::new(1, Some(tip.hash().to_vec()), tip.timestamp(), "ext", 1, 7).unwrap();
        assert!(chain.add_block(b.clone()));
        assert_eq!(chain.latest_block(), b);
    }

    #[test]
    fn rejection_is_non_mutating() {
        let mut chain = Chain::new();
        chain.mine("one").unwrap();
        let tip = chain.latest_block();

        let wrong_prev = Block::new(2, Some(vec![0xab; HASH_SIZE]), tip.timestamp(), "x", 1, 0).unwrap();
        let wrong_index = Block::new(5, Some(tip.hash().to_vec()), tip.timestamp(), "x", 1, 0).unwrap();
        let future_ts = now_secs() + now_secs() / 10;
        let from_future = Block::new(2, Some(tip.hash().to_vec()), future_ts, "x", 1, 0).unwrap();
        let duplicate = tip.clone();

        for candidate in [wrong_prev, wrong_index, from_future, duplicate] {
            assert!(!chain.add_block(candidate));
            assert_eq!(chain.len(), 2);
            assert_eq!(chain.latest_block(), tip);
        }
    }

    #[test]
    fn validate_sequences() {
        assert!(Chain::validate(&[]));
        let mut chain = past_genesis(1);
        assert!(Chain::validate(&chain.blocks()));
        extend(&mut chain, 4, 10, 1);
        let blocks = chain.blocks();
        assert!(Chain::validate(&blocks));

        let mut swapped = blocks.clone();
        swapped.swap(2, 3);
        assert!(!Chain::validate(&swapped));

        let mut gap = blocks.clone();
        gap.remove(2);
        assert!(!Chain::validate(&gap));
    }

    #[test]
    fn validate_fails_closed_on_future_block() {
        let chain = past_genesis(1);
        let g = chain.latest_block();
        let future = Block::new(1, Some(g.hash().to_vec()), now_secs() * 2, "f", 1, 0).unwrap();
        assert!(!Chain::validate(&[g, future]));
    }

    #[test]
    fn difficulty_unchanged_between_adjustments() {
        let mut chain = past_genesis(1);
        extend(&mut chain, 9, 1, 3);
        assert_eq!(chain.current_difficulty(), 3);
    }

    #[test]
    fn fast_window_raises_difficulty() {
        let mut chain = past_genesis(1);
        extend(&mut chain, 10, 2, 1);
        assert_eq!(chain.current_difficulty(), 2);
    }

    #[test]
    fn slow_window_lowers_difficulty() {
        let mut chain = past_genesis(3);
        extend(&mut chain, 10, 30, 3);
        assert_eq!(chain.current_difficulty(), 2);
    }

    #[test]
    fn slow_window_clamps_at_minimum() {
        let mut chain = past_genesis(0);
        extend(&mut chain, 10, 30, 1);
        assert_eq!(chain.current_difficulty(), MIN_DIFFICULTY);
    }

    #[test]
    fn on_target_window_keeps_difficulty() {
        for step in [5, 10, 20] {
            let mut chain = past_genesis(2);
            extend(&mut chain, 10, step, 2);
            assert_eq!(chain.current_difficulty(), 2, "step {step}");
        }
    }

    #[test]
    fn adjustment_uses_window_start_difficulty() {
        // genesis starts the window; its difficulty is the base, not the tip's
        let mut chain = past_genesis(1);
        extend(&mut chain, 10, 1, 4);
        assert_eq!(chain.current_difficulty(), 2);
    }

    #[test]
    fn adjustment_anchors_on_tip_and_block_interval_back() {
        let mut chain = past_genesis(1);
        // first window slow, second window fast
        extend(&mut chain, 10, 40, 2);
        extend(&mut chain, 10, 1, 5);
        assert_eq!(chain.latest_block().index(), 20);
        // window start is block #10 (difficulty 2)
        assert_eq!(chain.current_difficulty(), 3);
    }

    #[test]
    fn eleventh_mined_block_gets_raised_difficulty() {
        let mut chain = Chain::new();
        for i in 0..10 {
            chain.mine(format!("fast {i}")).unwrap();
        }
        assert_eq!(chain.current_difficulty(), DEFAULT_INITIAL_DIFFICULTY + 1);
        let b = chain.mine("eleventh").unwrap();
        assert_eq!(b.index(), 11);
        assert_eq!(b.difficulty(), DEFAULT_INITIAL_DIFFICULTY + 1);
        assert!(meets_difficulty(&b.hash(), 2));
    }

    #[test]
    fn mining_after_bottomed_out_adjustment_still_needs_work() {
        let mut chain = past_genesis(1);
        extend(&mut chain, 10, 30, 1);
        assert_eq!(chain.current_difficulty(), 0);
        let b = chain.mine("slow").unwrap();
        assert_eq!(b.difficulty(), MIN_MINED_DIFFICULTY);
        assert!(Chain::is_valid(&chain));
    }

    #[test]
    fn json_round_trip() {
        let mut chain = Chain::new();
        chain.mine("Hello, world!").unwrap();
        chain.mine("A".repeat(64)).unwrap();
        chain.mine(vec![1u8, 2, 3]).unwrap();

        let json = chain.to_json().unwrap();
        let restored = Chain::from_json(&json, ChainConfig::default()).unwrap();
        assert_eq!(restored.blocks(), chain.blocks());
        assert_eq!(restored.to_json().unwrap(), json);
    }

    #[test]
    fn load_extends_shared_genesis() {
        let mut source = Chain::new();
        source.mine("a").unwrap();
        source.mine("b").unwrap();

        let genesis = source.block(0).unwrap();
        let mut target = Chain::from_genesis(genesis, ChainConfig::default()).unwrap();
        let summary = target.load_from_json(&source.to_json().unwrap()).unwrap();

        // the exported genesis can not follow our own genesis
        assert_eq!(summary, ImportSummary { accepted: 2, rejected: 1 });
        assert_eq!(target.blocks(), source.blocks());
    }

    #[test]
    fn load_onto_foreign_chain_rejects_everything() {
        let mut source = past_genesis(1);
        extend(&mut source, 3, 10, 1);
        let mut target = Chain::new();
        let summary = target.load_from_json(&source.to_json().unwrap()).unwrap();
        assert_eq!(summary.accepted, 0);
        assert_eq!(summary.rejected, 4);
        assert_eq!(target.len(), 1);
    }

    #[test]
    fn tampered_record_is_rejected_block_by_block() {
        let mut source = past_genesis(1);
        extend(&mut source, 3, 10, 1);
        let mut records: Vec<BlockRecord> =
            serde_json::from_str(&source.to_json().unwrap()).unwrap();
        records[2].data = Payload::from("forged");

        let json = serde_json::to_string(&records).unwrap();
        let restored = Chain::from_json(&json, ChainConfig::default()).unwrap();
        // #2 fails its hash check and #3 no longer links to anything
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.blocks()[..], source.blocks()[..2]);
    }

    #[test]
    fn reordered_export_is_rejected_block_by_block() {
        let mut source = past_genesis(1);
        extend(&mut source, 3, 10, 1);
        let mut records: Vec<BlockRecord> =
            serde_json::from_str(&source.to_json().unwrap()).unwrap();
        records.swap(1, 2);

        let json = serde_json::to_string(&records).unwrap();
        let mut target = Chain::from_genesis(source.block(0).unwrap(), ChainConfig::default()).unwrap();
        let summary = target.load_from_json(&json).unwrap();
        // genesis dup and #2 rejected, #1 then #3 accepted
        assert_eq!(summary, ImportSummary { accepted: 1, rejected: 3 });
        assert_eq!(target.len(), 2);
    }

    #[test]
    fn malformed_export_fails_before_mutation() {
        let mut source = past_genesis(1);
        extend(&mut source, 2, 10, 1);
        let mut target = Chain::from_genesis(source.block(0).unwrap(), ChainConfig::default()).unwrap();

        assert!(matches!(
            target.load_from_json("{not json"),
            Err(ChainError::Json(_))
        ));

        let mut records: Vec<BlockRecord> =
            serde_json::from_str(&source.to_json().unwrap()).unwrap();
        records[2].timestamp = -5;
        let json = serde_json::to_string(&records).unwrap();
        assert!(matches!(
            target.load_from_json(&json),
            Err(ChainError::Block(_))
        ));
        assert_eq!(target.len(), 1);
    }

    #[test]
    fn from_json_requires_genesis_first() {
        assert!(matches!(
            Chain::from_json("[]", ChainConfig::default()),
            Err(ChainError::InvalidGenesis(_))
        ));

        let mut source = past_genesis(1);
        extend(&mut source, 2, 10, 1);
        let mut records: Vec<BlockRecord> =
            serde_json::from_str(&source.to_json().unwrap()).unwrap();
        records.remove(0);
        let json = serde_json::to_string(&records).unwrap();
        assert!(matches!(
            Chain::from_json(&json, ChainConfig::default()),
            Err(ChainError::InvalidGenesis(_))
        ));
    }
}
