//! Prometheus metrics for the faucet

use crate::error::{FaucetError, FaucetResult};
use prometheus::{opts, Encoder, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};

pub struct FaucetMetrics {
    registry: Registry,

    pub drip_requests_total: IntCounter,
    pub challenges_issued_total: IntCounter,
    /// Labelled by `outcome`: verified, wrong, exhausted, unknown
    pub confirmations_total: IntCounterVec,
    pub batches_dispatched_total: IntCounter,
    pub drips_dispatched_total: IntCounter,
    pub dispatch_aborted_total: IntCounter,
    pub pending_sessions: IntGauge,
}

impl FaucetMetrics {
    pub fn new() -> FaucetResult<Self> {
        let registry = Registry::new();

        let drip_requests_total = IntCounter::with_opts(opts!(
            "faucet_drip_requests_total",
            "Drip requests received"
        ))?;
        let challenges_issued_total = IntCounter::with_opts(opts!(
            "faucet_challenges_issued_total",
            "Captcha challenges issued"
        ))?;
        let confirmations_total = IntCounterVec::new(
            opts!("faucet_confirmations_total", "Captcha confirmations by outcome"),
            &["outcome"],
        )?;
        let batches_dispatched_total = IntCounter::with_opts(opts!(
            "faucet_batches_dispatched_total",
            "Batch transactions submitted"
        ))?;
        let drips_dispatched_total = IntCounter::with_opts(opts!(
            "faucet_drips_dispatched_total",
            "Individual drips paid out"
        ))?;
        let dispatch_aborted_total = IntCounter::with_opts(opts!(
            "faucet_dispatch_aborted_total",
            "Dispatch cycles aborted without payout"
        ))?;
        let pending_sessions = IntGauge::with_opts(opts!(
            "faucet_pending_sessions",
            "Sessions held in memory"
        ))?;

        registry.register(Box::new(drip_requests_total.clone()))?;
        registry.register(Box::new(challenges_issued_total.clone()))?;
        registry.register(Box::new(confirmations_total.clone()))?;
        registry.register(Box::new(batches_dispatched_total.clone()))?;
        registry.register(Box::new(drips_dispatched_total.clone()))?;
        registry.register(Box::new(dispatch_aborted_total.clone()))?;
        registry.register(Box::new(pending_sessions.clone()))?;

        Ok(Self {
            registry,
            drip_requests_total,
            challenges_issued_total,
            confirmations_total,
            batches_dispatched_total,
            drips_dispatched_total,
            dispatch_aborted_total,
            pending_sessions,
        })
    }

    pub fn record_confirmation(&self, outcome: &str) {
        self.confirmations_total.with_label_values(&[outcome]).inc();
    }

    /// Text exposition format
    pub fn render(&self) -> FaucetResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| FaucetError::Serialization(e.to_string()))
    }
}
