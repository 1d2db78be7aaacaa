//! In-process wallet, daemon and captcha doubles for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use drip_common::utils::logging::init_test_logging;
use drip_faucet::captcha::{Challenge, ChallengeRenderer};
use drip_faucet::rpc::{AddressValidation, BuiltTransaction, ChainDaemon, DaemonInfo, Transfer, WalletService};
use drip_faucet::{FaucetConfig, FaucetError, FaucetResult, FaucetService, Ledger};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;

pub const SOLUTION: &str = "Xk4pQz";
pub const DRIP_AMOUNT: u64 = 1_000;

pub struct MockWallet {
    pub balance: AtomicU64,
    pub fail_build: AtomicBool,
    pub built: Mutex<Vec<(Vec<Transfer>, BuiltTransaction)>>,
    /// Park `build_transaction` until `release` is notified
    pub hold_build: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
    counter: AtomicU64,
}

impl MockWallet {
    pub fn with_balance(balance: u64) -> Self {
        Self {
            balance: AtomicU64::new(balance),
            fail_build: AtomicBool::new(false),
            built: Mutex::new(Vec::new()),
            hold_build: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn built(&self) -> Vec<(Vec<Transfer>, BuiltTransaction)> {
        self.built.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletService for MockWallet {
    async fn get_address(&self) -> FaucetResult<String> {
        Ok("xet:faucet".to_string())
    }

    async fn get_balance(&self) -> FaucetResult<u64> {
        Ok(self.balance.load(Ordering::SeqCst))
    }

    async fn build_transaction(&self, transfers: &[Transfer]) -> FaucetResult<BuiltTransaction> {
        if self.fail_build.load(Ordering::SeqCst) {
            return Err(FaucetError::ExternalService("build failed".to_string()));
        }
        if self.hold_build.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let built = BuiltTransaction {
            hash: format!("hash{:04}", n),
            tx_as_hex: format!("hex{:04}", n),
        };
        self.built.lock().unwrap().push((transfers.to_vec(), built.clone()));
        Ok(built)
    }
}

#[derive(Default)]
pub struct MockDaemon {
    pub fail_submit: AtomicBool,
    pub submitted: Mutex<Vec<String>>,
    pub invalid: Mutex<HashSet<String>>,
    /// integrated address -> base address
    pub integrated: Mutex<HashMap<String, String>>,
}

impl MockDaemon {
    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainDaemon for MockDaemon {
    async fn get_info(&self) -> FaucetResult<DaemonInfo> {
        Ok(DaemonInfo::default())
    }

    async fn validate_address(&self, address: &str, allow_integrated: bool) -> FaucetResult<AddressValidation> {
        let is_integrated = self.integrated.lock().unwrap().contains_key(address);
        let is_valid = !self.invalid.lock().unwrap().contains(address) && (allow_integrated || !is_integrated);
        Ok(AddressValidation { is_valid, is_integrated })
    }

    async fn split_address(&self, address: &str) -> FaucetResult<String> {
        self.integrated
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| FaucetError::ExternalService("not integrated".to_string()))
    }

    async fn submit_transaction(&self, tx_hex: &str) -> FaucetResult<()> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(FaucetError::ExternalService("submit failed".to_string()));
        }
        self.submitted.lock().unwrap().push(tx_hex.to_string());
        Ok(())
    }
}

/// Always renders the same known solution
pub struct FixedCaptcha;

impl ChallengeRenderer for FixedCaptcha {
    fn render(&self) -> Challenge {
        Challenge {
            markup: format!("<svg>{}</svg>", SOLUTION),
            solution: SOLUTION.to_string(),
        }
    }
}

pub struct Harness {
    pub service: Arc<FaucetService>,
    pub wallet: Arc<MockWallet>,
    pub daemon: Arc<MockDaemon>,
    _dir: TempDir,
}

pub fn test_config() -> FaucetConfig {
    FaucetConfig {
        drip_amount_atomic: DRIP_AMOUNT,
        drip_cooldown_ms: 5 * 60 * 1_000,
        max_captcha_tries: 3,
        ip_max_requests: 100,
        ip_cooldown_ms: 60_000,
        addr_prefix: "xet:".to_string(),
        ..Default::default()
    }
}

pub fn harness() -> Harness {
    harness_with(test_config(), 1_000_000)
}

pub fn harness_with(config: FaucetConfig, balance: u64) -> Harness {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::open(dir.path().join("ledger")).unwrap();
    let wallet = Arc::new(MockWallet::with_balance(balance));
    let daemon = Arc::new(MockDaemon::default());

    let service = FaucetService::new(config, ledger, wallet.clone(), daemon.clone())
        .unwrap()
        .with_renderer(Arc::new(FixedCaptcha));

    Harness {
        service: Arc::new(service),
        wallet,
        daemon,
        _dir: dir,
    }
}

pub fn ip(last: u8) -> IpAddr {
    IpAddr::from([192, 168, 1, last])
}
