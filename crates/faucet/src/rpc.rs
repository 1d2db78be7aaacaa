//! JSON-RPC clients for the wallet and the chain daemon

use crate::error::{FaucetError, FaucetResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Asset id of the native coin
pub const NATIVE_ASSET: &str = "0000000000000000000000000000000000000000000000000000000000000000";

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// One output of a batch transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub amount: u64,
    pub asset: String,
    pub destination: String,
}

impl Transfer {
    pub fn native(destination: &str, amount: u64) -> Self {
        Self {
            amount,
            asset: NATIVE_ASSET.to_string(),
            destination: destination.to_string(),
        }
    }
}

/// A signed transaction that has not been broadcast
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuiltTransaction {
    pub hash: String,
    pub tx_as_hex: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AddressValidation {
    pub is_valid: bool,
    #[serde(default)]
    pub is_integrated: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaemonInfo {
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub topoheight: u64,
}

/// Faucet wallet operations
#[async_trait]
pub trait WalletService: Send + Sync {
    async fn get_address(&self) -> FaucetResult<String>;

    /// Spendable native balance in atomic units
    async fn get_balance(&self) -> FaucetResult<u64>;

    /// Build and sign a transaction without broadcasting it
    async fn build_transaction(&self, transfers: &[Transfer]) -> FaucetResult<BuiltTransaction>;
}

/// Chain daemon operations
#[async_trait]
pub trait ChainDaemon: Send + Sync {
    async fn get_info(&self) -> FaucetResult<DaemonInfo>;

    async fn validate_address(&self, address: &str, allow_integrated: bool) -> FaucetResult<AddressValidation>;

    /// Resolve an integrated address to its base address
    async fn split_address(&self, address: &str) -> FaucetResult<String>;

    async fn submit_transaction(&self, tx_hex: &str) -> FaucetResult<()>;
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Plain JSON-RPC 2.0 over HTTP
pub struct JsonRpcClient {
    endpoint: String,
    client: reqwest::Client,
    credentials: Option<(String, String)>,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(endpoint: impl Into<String>) -> FaucetResult<Self> {
        let client = reqwest::Client::builder().timeout(RPC_TIMEOUT).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
            credentials: None,
            next_id: AtomicU64::new(1),
        })
    }

    /// Send HTTP basic auth with every call
    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        if !username.is_empty() {
            self.credentials = Some((username.to_string(), password.to_string()));
        }
        self
    }

    pub async fn call<R: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> FaucetResult<R> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "id": id,
        });
        if let Some(params) = params {
            payload["params"] = params;
        }

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| FaucetError::ExternalService(format!("{} request failed: {}", method, e)))?;

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| FaucetError::ExternalService(format!("{} invalid response: {}", method, e)))?;

        if let Some(error) = body.error {
            return Err(FaucetError::ExternalService(format!(
                "{} failed ({}): {}",
                method, error.code, error.message
            )));
        }

        debug!(method, id, "RPC call succeeded");
        serde_json::from_value(body.result.unwrap_or(Value::Null))
            .map_err(|e| FaucetError::ExternalService(format!("{} unexpected result: {}", method, e)))
    }
}

/// Client for the faucet's wallet RPC
pub struct WalletRpcClient {
    rpc: JsonRpcClient,
}

impl WalletRpcClient {
    pub fn new(endpoint: &str, username: &str, password: &str) -> FaucetResult<Self> {
        Ok(Self {
            rpc: JsonRpcClient::new(endpoint)?.with_basic_auth(username, password),
        })
    }
}

#[async_trait]
impl WalletService for WalletRpcClient {
    async fn get_address(&self) -> FaucetResult<String> {
        self.rpc.call("get_address", None).await
    }

    async fn get_balance(&self) -> FaucetResult<u64> {
        self.rpc.call("get_balance", Some(json!({ "asset": NATIVE_ASSET }))).await
    }

    async fn build_transaction(&self, transfers: &[Transfer]) -> FaucetResult<BuiltTransaction> {
        let params = json!({
            "transfers": transfers,
            "broadcast": false,
            "tx_as_hex": true,
        });
        self.rpc.call("build_transaction", Some(params)).await
    }
}

#[derive(Debug, Deserialize)]
struct SplitAddress {
    address: String,
}

/// Client for the chain daemon RPC
pub struct DaemonRpcClient {
    rpc: JsonRpcClient,
}

impl DaemonRpcClient {
    pub fn new(endpoint: &str) -> FaucetResult<Self> {
        Ok(Self {
            rpc: JsonRpcClient::new(endpoint)?,
        })
    }
}

#[async_trait]
impl ChainDaemon for DaemonRpcClient {
    async fn get_info(&self) -> FaucetResult<DaemonInfo> {
        self.rpc.call("get_info", None).await
    }

    async fn validate_address(&self, address: &str, allow_integrated: bool) -> FaucetResult<AddressValidation> {
        let params = json!({ "address": address, "allow_integrated": allow_integrated });
        self.rpc.call("validate_address", Some(params)).await
    }

    async fn split_address(&self, address: &str) -> FaucetResult<String> {
        let split: SplitAddress = self.rpc.call("split_address", Some(json!({ "address": address }))).await?;
        Ok(split.address)
    }

    async fn submit_transaction(&self, tx_hex: &str) -> FaucetResult<()> {
        let _: Value = self.rpc.call("submit_transaction", Some(json!({ "data": tx_hex }))).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_serialization() {
        let transfer = Transfer::native("xet:abc", 5);
        let value = serde_json::to_value(&transfer).unwrap();
        assert_eq!(value["amount"], 5);
        assert_eq!(value["asset"], NATIVE_ASSET);
        assert_eq!(value["destination"], "xet:abc");
    }

    #[test]
    fn test_rpc_response_with_error() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"bad params"}}"#;
        let response: RpcResponse = serde_json::from_str(raw).unwrap();
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().message, "bad params");
    }

    #[test]
    fn test_built_transaction_ignores_extra_fields() {
        let raw = r#"{"hash":"ab12","tx_as_hex":"00ff","fee":25,"nonce":3}"#;
        let built: BuiltTransaction = serde_json::from_str(raw).unwrap();
        assert_eq!(built.hash, "ab12");
        assert_eq!(built.tx_as_hex, "00ff");
    }

    #[test]
    fn test_basic_auth_skipped_without_user() {
        let client = JsonRpcClient::new("http://127.0.0.1:1/json_rpc")
            .unwrap()
            .with_basic_auth("", "secret");
        assert!(client.credentials.is_none());
    }
}
