use crate::blockchain::{BlockRecord, Chain, ChainConfig, Payload};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone)]
pub struct MiningTemplate {
    pub template_id: String,
    pub index: u64,
    pub previous_hash: String,
    pub timestamp: i64,
    pub difficulty: u32,
    pub data: Payload,
}

/// Shared application state. The chain mutex is the single writer lock for
/// mining and imports.
pub struct AppState {
    pub chain: Mutex<Chain>,
    pub mining_templates: Mutex<HashMap<String, MiningTemplate>>,
}

impl AppState {
    pub fn new(config: ChainConfig) -> Self {
        Self::with_chain(Chain::with_config(config))
    }

    pub fn with_chain(chain: Chain) -> Self {
        Self {
            chain: Mutex::new(chain),
            mining_templates: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ChainConfig::default())
    }
}

/* ---------- Mining API Models ---------- */

#[derive(Deserialize)]
pub struct TemplateRequest {
    pub data: Payload,
}

#[derive(Serialize)]
pub struct TemplateResponse {
    pub template_id: String,
    pub index: u64,
    pub previous_hash: String,
    pub timestamp: i64,
    pub difficulty: u32,
    pub data: Payload,
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub template_id: String,
    pub nonce: u64,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub accepted: bool,
    pub mined_index: Option<u64>,
    pub hash: Option<String>,
    pub difficulty: Option<u32>,
}

impl SubmitResponse {
    pub fn rejected() -> Self {
        Self {
            accepted: false,
            mined_index: None,
            hash: None,
            difficulty: None,
        }
    }
}

/* ---------- Chain API Models ---------- */

#[derive(Serialize)]
pub struct ChainResponse {
    pub length: usize,
    pub difficulty: u32,
    pub chain: Vec<BlockRecord>,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub length: usize,
    pub difficulty: u32,
}

#[derive(Deserialize)]
pub struct MineRequest {
    pub data: Payload,
}

#[derive(Serialize)]
pub struct MineResponse {
    pub mined_index: u64,
    pub hash: String,
    pub nonce: u64,
    pub difficulty: u32,
}

#[derive(Serialize)]
pub struct DifficultyResponse {
    pub difficulty: u32,
    pub mining_difficulty: u32,
}

#[derive(Serialize)]
pub struct AddBlockResponse {
    pub accepted: bool,
    pub length: usize,
}

#[derive(Serialize)]
pub struct ImportResponse {
    pub accepted: usize,
    pub rejected: usize,
    pub length: usize,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub height: usize,
    pub difficulty: u32,
    pub target_block_time_secs: i64,
    pub adjust_window: u64,
    pub last_interval_secs: Option<i64>,
    pub avg_interval_secs: Option<f64>,
}
