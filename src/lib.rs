//! Single-node proof-of-work ledger: hash-linked SHA3-512 blocks, a
//! leading-zero-byte proof-of-work, periodic difficulty re-adjustment and an
//! actix-web surface over one in-memory chain.

pub mod api;
pub mod blockchain;
pub mod config;
