//! Per-IP request limiter over a rolling cooldown window.

use moka::ops::compute::{CompResult, Op};
use moka::sync::Cache as MokaCache;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct IpRecord {
    count: u32,
    timestamp: Instant,
}

/// Counts requests per client IP. A window restarts once the time since the
/// last accepted request reaches `window`.
///
/// Records live in a bounded cache whose TTL equals the window. Only accepted
/// requests write, so an entry expires exactly when its window would reset.
pub struct IpRateLimiter {
    max_requests: u32,
    window: Duration,
    records: MokaCache<IpAddr, IpRecord>,
}

impl IpRateLimiter {
    pub fn new(max_requests: u32, window: Duration, capacity: u64) -> Self {
        let records = MokaCache::builder()
            .max_capacity(capacity)
            .time_to_live(window)
            .build();

        Self {
            max_requests,
            window,
            records,
        }
    }

    /// Record a request from `ip`. Returns `false` when the IP is over its limit.
    pub fn check_and_record(&self, ip: IpAddr) -> bool {
        self.check_and_record_at(ip, Instant::now())
    }

    pub fn check_and_record_at(&self, ip: IpAddr, now: Instant) -> bool {
        let (max_requests, window) = (self.max_requests, self.window);

        let result = self.records.entry(ip).and_compute_with(|current| {
            let record = match current.map(|entry| entry.into_value()) {
                Some(record) if now.saturating_duration_since(record.timestamp) < window => record,
                _ => return Op::Put(IpRecord { count: 1, timestamp: now }),
            };

            let count = record.count.saturating_add(1);
            if count > max_requests {
                return Op::Nop;
            }
            Op::Put(IpRecord { count, timestamp: now })
        });

        match result {
            CompResult::Inserted(_) | CompResult::ReplacedWith(_) => true,
            _ => {
                debug!(%ip, "IP over request limit");
                false
            }
        }
    }
}
