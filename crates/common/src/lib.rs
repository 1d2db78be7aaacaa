//! Shared bootstrap helpers for faucet binaries

pub mod utils;
