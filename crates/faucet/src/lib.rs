//! Drip faucet for the XELIS network
//!
//! Hands out a fixed amount of coins to wallet addresses that:
//! - pass a per-IP rate limit
//! - are not in their payout cooldown
//! - solve a captcha challenge
//!
//! Verified requests are pooled in memory and paid out periodically in a
//! single aggregate transaction, recorded in an append-only ledger.

pub mod api;
pub mod captcha;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod rate_limit;
pub mod rpc;
pub mod service;
pub mod session;

pub use config::FaucetConfig;
pub use dispatcher::{BatchDispatcher, DispatchOutcome};
pub use error::{FaucetError, FaucetResult};
pub use ledger::{FaucetStatistics, Ledger, PendingBatch, TransactionRecord};
pub use rpc::{ChainDaemon, DaemonRpcClient, WalletRpcClient, WalletService};
pub use service::{DripChallenge, FaucetService, FaucetStats};
pub use session::{Session, SessionState, SessionStore};
