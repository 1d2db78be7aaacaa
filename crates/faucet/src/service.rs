//! Faucet service core logic

use crate::captcha::{ChallengeRenderer, SvgCaptcha};
use crate::config::FaucetConfig;
use crate::dispatcher::BatchDispatcher;
use crate::error::{FaucetError, FaucetResult};
use crate::ledger::{Ledger, TransactionRecord, DEFAULT_PAGE_SIZE};
use crate::metrics::FaucetMetrics;
use crate::rate_limit::IpRateLimiter;
use crate::rpc::{ChainDaemon, WalletService};
use crate::session::{Session, SessionStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Challenge handed back for a drip request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DripChallenge {
    pub session_id: String,
    /// SVG markup of the captcha
    pub captcha: String,
}

/// Faucet statistics as served on /stats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetStats {
    pub drips: u64,
    pub total_sent: u64,
    pub unique_accounts: u64,
    pub last_drip: Option<i64>,
    pub session_count: usize,
    pub drip_amount: u64,
    pub drip_cooldown: u64,
}

/// Faucet service
pub struct FaucetService {
    config: FaucetConfig,
    ledger: Arc<Ledger>,
    sessions: Arc<SessionStore>,
    rate_limiter: Arc<IpRateLimiter>,
    wallet: Arc<dyn WalletService>,
    daemon: Arc<dyn ChainDaemon>,
    renderer: Arc<dyn ChallengeRenderer>,
    metrics: Arc<FaucetMetrics>,
}

impl FaucetService {
    /// Create new faucet service
    pub fn new(
        config: FaucetConfig,
        ledger: Ledger,
        wallet: Arc<dyn WalletService>,
        daemon: Arc<dyn ChainDaemon>,
    ) -> FaucetResult<Self> {
        let rate_limiter = Arc::new(IpRateLimiter::new(
            config.ip_max_requests,
            config.ip_cooldown(),
            config.ip_cache_capacity,
        ));

        Ok(Self {
            ledger: Arc::new(ledger),
            sessions: Arc::new(SessionStore::new()),
            rate_limiter,
            wallet,
            daemon,
            renderer: Arc::new(SvgCaptcha::default()),
            metrics: Arc::new(FaucetMetrics::new()?),
            config,
        })
    }

    /// Replace the captcha renderer
    pub fn with_renderer(mut self, renderer: Arc<dyn ChallengeRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Issue a captcha challenge for `address`.
    pub async fn request_drip(&self, address: &str, client_ip: IpAddr) -> FaucetResult<DripChallenge> {
        self.metrics.drip_requests_total.inc();

        if !self.rate_limiter.check_and_record(client_ip) {
            warn!(%client_ip, "Drip request rate limited");
            return Err(FaucetError::RateLimited);
        }

        let address = address.trim();
        if address.is_empty() {
            return Err(FaucetError::InvalidInput("Missing field \"address\".".to_string()));
        }

        let address = self.resolve_address(address).await?;

        self.sessions.supersede(&address).await?;
        self.check_cooldown(&address)?;

        let challenge = self.renderer.render();
        let session_id = Uuid::new_v4().simple().to_string();
        let session = Session::new(session_id.clone(), address.clone(), &challenge.solution, now_millis());
        self.sessions.open(session).await?;

        self.metrics.challenges_issued_total.inc();
        self.refresh_session_gauge().await;
        info!(%session_id, %address, "Captcha challenge issued");

        Ok(DripChallenge {
            session_id,
            captcha: challenge.markup,
        })
    }

    /// Check a captcha answer; on success the address joins the drip pool.
    pub async fn confirm_drip(&self, session_id: &str, solution: &str) -> FaucetResult<()> {
        let result = self
            .sessions
            .confirm(session_id, solution, self.config.max_captcha_tries)
            .await;

        let outcome = match &result {
            Ok(_) => "verified",
            Err(FaucetError::WrongSolution) => "wrong",
            Err(FaucetError::TooManyAttempts) => "exhausted",
            Err(FaucetError::UnknownSession) => "unknown",
            Err(_) => "rejected",
        };
        self.metrics.record_confirmation(outcome);
        self.refresh_session_gauge().await;

        result.map(|_| ())
    }

    pub async fn stats(&self) -> FaucetResult<FaucetStats> {
        let stats = self.ledger.statistics()?;
        Ok(FaucetStats {
            drips: stats.drips,
            total_sent: stats.total_sent,
            unique_accounts: stats.unique_accounts,
            last_drip: stats.last_drip,
            session_count: self.sessions.len().await,
            drip_amount: self.config.drip_amount_atomic,
            drip_cooldown: self.config.drip_cooldown_ms,
        })
    }

    /// Paged payout history, newest first
    pub fn transactions(&self, page: Option<usize>, size: Option<usize>) -> FaucetResult<Vec<TransactionRecord>> {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let size = size.filter(|s| *s > 0).unwrap_or(DEFAULT_PAGE_SIZE);
        self.ledger.list(page, size)
    }

    /// Dispatcher sharing this service's tables and backends
    pub fn dispatcher(&self) -> BatchDispatcher {
        BatchDispatcher::new(
            self.sessions.clone(),
            self.ledger.clone(),
            self.wallet.clone(),
            self.daemon.clone(),
            self.metrics.clone(),
            self.config.drip_amount_atomic,
        )
    }

    pub fn config(&self) -> &FaucetConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn metrics(&self) -> &Arc<FaucetMetrics> {
        &self.metrics
    }

    /// Validate `address` and return the base address payouts key on.
    async fn resolve_address(&self, address: &str) -> FaucetResult<String> {
        let prefix = &self.config.addr_prefix;
        if !address.starts_with(prefix.as_str()) {
            return Err(FaucetError::InvalidAddress(format!(
                "The address does not start with {}.",
                prefix
            )));
        }

        let validation = self.daemon.validate_address(address, true).await?;
        if !validation.is_valid {
            return Err(FaucetError::InvalidAddress("The address is not valid.".to_string()));
        }

        if validation.is_integrated {
            let base = self.daemon.split_address(address).await?;
            debug!(integrated = %address, base = %base, "Resolved integrated address");
            return Ok(base);
        }

        Ok(address.to_string())
    }

    fn check_cooldown(&self, address: &str) -> FaucetResult<()> {
        if let Some(last_payout) = self.ledger.most_recent_payout(address)? {
            let elapsed = now_millis() - last_payout;
            let cooldown = i64::try_from(self.config.drip_cooldown_ms).unwrap_or(i64::MAX);
            if elapsed < cooldown {
                debug!(address, remaining_ms = cooldown - elapsed, "Address in cooldown");
                return Err(FaucetError::Cooldown);
            }
        }
        Ok(())
    }

    async fn refresh_session_gauge(&self) {
        self.metrics.pending_sessions.set(self.sessions.len().await as i64);
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
