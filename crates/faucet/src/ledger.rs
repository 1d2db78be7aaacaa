//! Append-only payout ledger backed by sled.
//!
//! Rows are keyed by `timestamp ‖ id` (both big-endian) so a reverse scan of
//! the `transactions` tree yields newest-first order. A second tree keeps the
//! latest payout time per address for cooldown checks.

use crate::error::{FaucetError, FaucetResult};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, IVec, Tree};
use std::convert::Infallible;
use std::path::Path;
use tracing::{debug, info, warn};

pub const DEFAULT_PAGE_SIZE: usize = 30;
pub const MAX_PAGE_SIZE: usize = 100;

/// One committed payout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: u64,
    pub address: String,
    pub tx_hash: String,
    pub amount: u64,
    /// Unix time in milliseconds
    pub timestamp: i64,
}

impl TransactionRecord {
    fn key(&self) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&(self.timestamp.max(0) as u64).to_be_bytes());
        key[8..].copy_from_slice(&self.id.to_be_bytes());
        key
    }
}

/// Aggregate ledger figures
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaucetStatistics {
    pub drips: u64,
    pub total_sent: u64,
    pub unique_accounts: u64,
    pub last_drip: Option<i64>,
}

/// Payout ledger
pub struct Ledger {
    db: Db,
    /// Payout rows
    transactions: Tree,
    /// address -> latest payout timestamp
    latest_payout: Tree,
}

impl Ledger {
    /// Create or open the ledger
    pub fn open<P: AsRef<Path>>(path: P) -> FaucetResult<Self> {
        info!("Opening ledger at: {}", path.as_ref().display());

        let db = sled::Config::default()
            .path(path)
            .cache_capacity(64 * 1024 * 1024)
            .open()?;

        Self::from_db(db)
    }

    pub fn from_db(db: Db) -> FaucetResult<Self> {
        let transactions = db.open_tree("transactions")?;
        let latest_payout = db.open_tree("latest_payout")?;
        Ok(Self {
            db,
            transactions,
            latest_payout,
        })
    }

    /// Start staging rows for one batch. Nothing is visible until
    /// [`PendingBatch::commit`].
    pub fn begin_batch(&self) -> PendingBatch {
        PendingBatch {
            db: self.db.clone(),
            transactions: self.transactions.clone(),
            latest_payout: self.latest_payout.clone(),
            rows: Vec::new(),
        }
    }

    /// Timestamp of the most recent payout to `address`
    pub fn most_recent_payout(&self, address: &str) -> FaucetResult<Option<i64>> {
        self.latest_payout
            .get(address.as_bytes())?
            .map(|bytes| decode_timestamp(&bytes))
            .transpose()
    }

    /// Page through payouts, newest first. `page` starts at 1.
    pub fn list(&self, page: usize, size: usize) -> FaucetResult<Vec<TransactionRecord>> {
        let page = page.max(1);
        let size = size.clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1).saturating_mul(size);

        self.transactions
            .iter()
            .rev()
            .skip(offset)
            .take(size)
            .map(|item| -> FaucetResult<TransactionRecord> {
                let (_, value) = item?;
                Ok(bincode::deserialize(&value)?)
            })
            .collect()
    }

    pub fn statistics(&self) -> FaucetResult<FaucetStatistics> {
        let mut stats = FaucetStatistics {
            unique_accounts: self.latest_payout.len() as u64,
            ..Default::default()
        };

        for item in self.transactions.iter() {
            let (_, value) = item?;
            let record: TransactionRecord = bincode::deserialize(&value)?;
            stats.drips += 1;
            stats.total_sent = stats.total_sent.saturating_add(record.amount);
            stats.last_drip = stats.last_drip.max(Some(record.timestamp));
        }

        Ok(stats)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub async fn flush(&self) -> FaucetResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

/// Rows staged for one dispatch cycle
pub struct PendingBatch {
    db: Db,
    transactions: Tree,
    latest_payout: Tree,
    rows: Vec<(TransactionRecord, Vec<u8>)>,
}

impl PendingBatch {
    /// Stage a row, assigning its id.
    pub fn insert(&mut self, address: &str, tx_hash: &str, amount: u64, timestamp: i64) -> FaucetResult<u64> {
        let record = TransactionRecord {
            id: self.db.generate_id()?,
            address: address.to_string(),
            tx_hash: tx_hash.to_string(),
            amount,
            timestamp,
        };
        let value = bincode::serialize(&record)?;
        let id = record.id;
        self.rows.push((record, value));
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Apply every staged row and index update atomically.
    pub fn commit(self) -> FaucetResult<usize> {
        let rows = self.rows;

        let result: Result<(), TransactionError<Infallible>> = (&self.transactions, &self.latest_payout)
            .transaction(|(transactions, latest)| {
                for (record, value) in &rows {
                    transactions.insert(&record.key()[..], value.as_slice())?;

                    let newer = match latest.get(record.address.as_bytes())? {
                        Some(previous) => decode_timestamp(&previous).map_or(true, |ts| ts < record.timestamp),
                        None => true,
                    };
                    if newer {
                        latest.insert(record.address.as_bytes(), &record.timestamp.to_be_bytes()[..])?;
                    }
                }
                Ok::<(), ConflictableTransactionError<Infallible>>(())
            });

        match result {
            Ok(()) => {
                debug!("Committed {} ledger rows", rows.len());
                Ok(rows.len())
            }
            Err(TransactionError::Storage(err)) => Err(FaucetError::Database(err)),
            Err(TransactionError::Abort(never)) => match never {},
        }
    }

    /// Discard all staged rows.
    pub fn rollback(self) {
        if !self.rows.is_empty() {
            warn!("Rolled back {} staged ledger rows", self.rows.len());
        }
    }
}

fn decode_timestamp(bytes: &IVec) -> FaucetResult<i64> {
    let raw = <[u8; 8]>::try_from(&bytes[..])
        .map_err(|_| FaucetError::Serialization("invalid timestamp encoding".to_string()))?;
    Ok(i64::from_be_bytes(raw))
}
