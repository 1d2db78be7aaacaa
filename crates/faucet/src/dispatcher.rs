//! Periodic batch payouts.
//!
//! Each cycle pays every verified session in one wallet transaction. Ledger
//! rows are staged before the transaction is submitted and only committed
//! once the daemon accepts it; any earlier failure leaves the ledger and the
//! session table untouched so the next cycle retries.

use crate::error::{FaucetError, FaucetResult};
use crate::ledger::Ledger;
use crate::metrics::FaucetMetrics;
use crate::rpc::{ChainDaemon, Transfer, WalletService};
use crate::service::now_millis;
use crate::session::SessionStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Result of one dispatch cycle
#[derive(Debug)]
pub enum DispatchOutcome {
    /// No verified sessions
    Idle,
    /// Another cycle was still running
    Skipped,
    Dispatched { tx_hash: String, count: usize },
    Aborted(FaucetError),
}

pub struct BatchDispatcher {
    sessions: Arc<SessionStore>,
    ledger: Arc<Ledger>,
    wallet: Arc<dyn WalletService>,
    daemon: Arc<dyn ChainDaemon>,
    metrics: Arc<FaucetMetrics>,
    drip_amount: u64,
    in_flight: AtomicBool,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BatchDispatcher {
    pub fn new(
        sessions: Arc<SessionStore>,
        ledger: Arc<Ledger>,
        wallet: Arc<dyn WalletService>,
        daemon: Arc<dyn ChainDaemon>,
        metrics: Arc<FaucetMetrics>,
        drip_amount: u64,
    ) -> Self {
        Self {
            sessions,
            ledger,
            wallet,
            daemon,
            metrics,
            drip_amount,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one cycle unless one is already in progress.
    pub async fn run_cycle(&self) -> DispatchOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("Previous dispatch cycle still running, skipping");
            return DispatchOutcome::Skipped;
        }
        let _guard = InFlightGuard(&self.in_flight);

        match self.dispatch().await {
            Ok(None) => DispatchOutcome::Idle,
            Ok(Some((tx_hash, count))) => DispatchOutcome::Dispatched { tx_hash, count },
            Err(err) => {
                self.metrics.dispatch_aborted_total.inc();
                match &err {
                    FaucetError::InsufficientFunds { .. } => warn!("Faucet can't drip, needs refill: {}", err),
                    _ => error!("Dispatch cycle aborted: {}", err),
                }
                DispatchOutcome::Aborted(err)
            }
        }
    }

    async fn dispatch(&self) -> FaucetResult<Option<(String, usize)>> {
        let candidates = self.sessions.verified().await;
        if candidates.is_empty() {
            return Ok(None);
        }
        let count = candidates.len();

        let needed = (count as u64).checked_mul(self.drip_amount).unwrap_or(u64::MAX);
        let available = self.wallet.get_balance().await?;
        if needed >= available {
            return Err(FaucetError::InsufficientFunds { needed, available });
        }

        let transfers: Vec<Transfer> = candidates
            .iter()
            .map(|c| Transfer::native(&c.address, self.drip_amount))
            .collect();
        let built = self.wallet.build_transaction(&transfers).await?;
        debug!(tx_hash = %built.hash, count, "Batch transaction built");

        let timestamp = now_millis();
        let mut batch = self.ledger.begin_batch();
        for candidate in &candidates {
            if let Err(err) = batch.insert(&candidate.address, &built.hash, self.drip_amount, timestamp) {
                batch.rollback();
                return Err(err);
            }
        }

        if let Err(err) = self.daemon.submit_transaction(&built.tx_as_hex).await {
            batch.rollback();
            return Err(err);
        }
        info!(tx_hash = %built.hash, count, "Batch transaction submitted");

        // The payout is on its way; sessions go regardless of the commit so
        // the next cycle cannot pay the same addresses again.
        let committed = batch.commit();
        let session_ids: Vec<String> = candidates.into_iter().map(|c| c.session_id).collect();
        self.sessions.remove_all(&session_ids).await;
        self.metrics.pending_sessions.set(self.sessions.len().await as i64);

        if let Err(err) = committed {
            error!(
                tx_hash = %built.hash,
                count,
                "Transaction submitted but ledger commit failed, reconcile manually"
            );
            return Err(err);
        }
        if let Err(err) = self.ledger.flush().await {
            warn!("Ledger flush failed: {}", err);
        }

        self.metrics.batches_dispatched_total.inc();
        self.metrics.drips_dispatched_total.inc_by(count as u64);
        Ok(Some((built.hash, count)))
    }

    /// Run cycles every `interval` until `shutdown` flips.
    pub fn spawn(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_cycle().await;
                    }
                    _ = shutdown.changed() => {
                        info!("Batch dispatcher stopping");
                        break;
                    }
                }
            }
        })
    }
}
