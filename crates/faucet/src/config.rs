//! Faucet configuration

use crate::error::{FaucetError, FaucetResult};
use drip_common::utils::config::load_config;
use drip_common::utils::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Faucet service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetConfig {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Ledger database location
    pub db_location: String,

    /// Minimum time between two payouts to the same address (ms)
    pub drip_cooldown_ms: u64,

    /// Amount sent per drip, in atomic units
    pub drip_amount_atomic: u64,

    /// Interval between batch dispatch cycles (ms)
    pub send_interval_ms: u64,

    /// Failed captcha answers tolerated before a session is dropped
    pub max_captcha_tries: u32,

    /// Enable permissive CORS headers
    pub use_cors: bool,

    /// Requests allowed per IP inside one cooldown window
    pub ip_max_requests: u32,

    /// Per-IP cooldown window (ms)
    pub ip_cooldown_ms: u64,

    /// Most client IPs tracked at once
    pub ip_cache_capacity: u64,

    /// Required address prefix (network marker)
    pub addr_prefix: String,

    /// Daemon JSON-RPC endpoint
    pub daemon_endpoint: String,

    /// Wallet JSON-RPC endpoint
    pub wallet_endpoint: String,

    /// Wallet RPC basic auth user
    pub wallet_username: String,

    /// Wallet RPC basic auth password
    pub wallet_password: String,

    /// Expose Prometheus metrics on /metrics
    pub metrics_enabled: bool,

    /// Logging setup
    pub logging: LoggingConfig,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            db_location: "./faucet_data".to_string(),
            drip_cooldown_ms: 86_400_000, // 24 hours
            drip_amount_atomic: 100_000_000,
            send_interval_ms: 60_000,
            max_captcha_tries: 3,
            use_cors: false,
            ip_max_requests: 10,
            ip_cooldown_ms: 3_600_000, // 1 hour
            ip_cache_capacity: 10_000,
            addr_prefix: "xet:".to_string(),
            daemon_endpoint: "http://127.0.0.1:8080/json_rpc".to_string(),
            wallet_endpoint: "http://127.0.0.1:8081/json_rpc".to_string(),
            wallet_username: String::new(),
            wallet_password: String::new(),
            metrics_enabled: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl FaucetConfig {
    /// Build the configuration from defaults, an optional config file and
    /// then the process environment.
    pub fn load(path: Option<&Path>) -> FaucetResult<Self> {
        let mut config = match path {
            Some(path) => load_config(path).map_err(|e| FaucetError::Config(format!("{:#}", e)))?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields with any environment variables that are set.
    pub fn apply_env(&mut self) -> FaucetResult<()> {
        if let Some(host) = env_string("HOSTNAME") {
            self.host = host;
        }
        if let Some(port) = env_parse("PORT")? {
            self.port = port;
        }
        if let Some(db) = env_string("DB_LOCATION") {
            self.db_location = db;
        }
        if let Some(cooldown) = env_parse("DRIP_COOLDOWN_MS")? {
            self.drip_cooldown_ms = cooldown;
        }
        if let Some(amount) = env_parse("DRIP_AMOUNT_ATOMIC")? {
            self.drip_amount_atomic = amount;
        }
        if let Some(interval) = env_parse("SEND_INTERVAL_MS")? {
            self.send_interval_ms = interval;
        }
        if let Some(tries) = env_parse("MAX_CAPTCHA_TRIES")? {
            self.max_captcha_tries = tries;
        }
        if let Some(cors) = env_string("USE_CORS") {
            self.use_cors = cors.eq_ignore_ascii_case("true");
        }
        if let Some(max) = env_parse("IP_MAX_REQUESTS")? {
            self.ip_max_requests = max;
        }
        if let Some(window) = env_parse("IP_COOLDOWN_MS")? {
            self.ip_cooldown_ms = window;
        }
        if let Some(capacity) = env_parse("IP_CACHE_CAPACITY")? {
            self.ip_cache_capacity = capacity;
        }
        if let Some(prefix) = env_string("ADDR_PREFIX") {
            self.addr_prefix = prefix;
        }
        if let Some(endpoint) = env_string("DAEMON_ENDPOINT") {
            self.daemon_endpoint = endpoint;
        }
        if let Some(endpoint) = env_string("WALLET_ENDPOINT") {
            self.wallet_endpoint = endpoint;
        }
        if let Some(user) = env_string("WALLET_USERNAME") {
            self.wallet_username = user;
        }
        if let Some(password) = env_string("WALLET_PASSWORD") {
            self.wallet_password = password;
        }
        if let Some(enabled) = env_string("METRICS_ENABLED") {
            self.metrics_enabled = enabled.eq_ignore_ascii_case("true");
        }
        if let Some(level) = env_string("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = env_string("LOG_FORMAT") {
            self.logging.format = format;
        }
        Ok(())
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> FaucetResult<()> {
        if self.drip_amount_atomic == 0 {
            return Err(FaucetError::Config("drip amount must be positive".to_string()));
        }
        if self.send_interval_ms == 0 {
            return Err(FaucetError::Config("send interval must be positive".to_string()));
        }
        if self.ip_max_requests == 0 {
            return Err(FaucetError::Config("ip max requests must be positive".to_string()));
        }
        if self.ip_cache_capacity == 0 {
            return Err(FaucetError::Config("ip cache capacity must be positive".to_string()));
        }
        if i64::try_from(self.drip_cooldown_ms).is_err() {
            return Err(FaucetError::Config("drip cooldown is out of range".to_string()));
        }
        if self.daemon_endpoint.is_empty() || self.wallet_endpoint.is_empty() {
            return Err(FaucetError::Config("daemon and wallet endpoints are required".to_string()));
        }
        Ok(())
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn ip_cooldown(&self) -> Duration {
        Duration::from_millis(self.ip_cooldown_ms)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> FaucetResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => {
            debug!("Config override from {}", key);
            raw.parse::<T>()
                .map(Some)
                .map_err(|e| FaucetError::Config(format!("{}={}: {}", key, raw, e)))
        }
        None => Ok(None),
    }
}
