use std::env;
use std::str::FromStr;

use log::warn;

use crate::blockchain::{ChainConfig, HASH_SIZE};

/// Process settings, read from the environment (and `.env` via dotenvy).
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub chain: ChainConfig,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup; unset, unparseable or out-of-range
    /// values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ChainConfig::default();

        let adjustment_interval = parse_or(
            &lookup,
            "LEDGER_ADJUSTMENT_INTERVAL",
            defaults.adjustment_interval,
        );
        let adjustment_interval = if adjustment_interval == 0 {
            warn!("LEDGER_ADJUSTMENT_INTERVAL must be at least 1, using default");
            defaults.adjustment_interval
        } else {
            adjustment_interval
        };

        let block_generation_interval = parse_or(
            &lookup,
            "LEDGER_BLOCK_INTERVAL_SECS",
            defaults.block_generation_interval,
        );
        let block_generation_interval = if block_generation_interval <= 0 {
            warn!("LEDGER_BLOCK_INTERVAL_SECS must be positive, using default");
            defaults.block_generation_interval
        } else {
            block_generation_interval
        };

        let initial_difficulty = parse_or(
            &lookup,
            "LEDGER_INITIAL_DIFFICULTY",
            defaults.initial_difficulty,
        );
        // more zero bytes than the digest has can never be met
        let initial_difficulty = if initial_difficulty as usize > HASH_SIZE {
            warn!("LEDGER_INITIAL_DIFFICULTY must be at most {HASH_SIZE}, using default");
            defaults.initial_difficulty
        } else {
            initial_difficulty
        };

        Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&lookup, "PORT", 8080),
            chain: ChainConfig {
                initial_difficulty,
                block_generation_interval,
                adjustment_interval,
            },
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("ignoring invalid {key}={raw:?}");
            default
        }),
        None => default,
    }
}
