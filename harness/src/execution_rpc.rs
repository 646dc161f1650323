//! A minimal JSON-RPC capability over the external execution-layer dev node.
//!
//! Uses `reqwest` and `serde` directly rather than a web3 library; only the
//! handful of methods the harness drives are exposed.

use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A client for the dev node's standard and `evm_*` admin methods.
#[derive(Clone)]
pub struct EvmRpcClient {
    endpoint: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl EvmRpcClient {
    pub fn new(endpoint: &str) -> Result<Self, String> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| format!("invalid RPC endpoint [{}]: {}", endpoint, e))?;
        let client = reqwest::Client::new();
        Ok(Self {
            endpoint,
            client,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The chain id, via `eth_chainId`.
    pub async fn chain_id(&self) -> Result<u64, String> {
        let response = self.send_rpc_request("eth_chainId", json!([])).await?;
        hex_to_u64_be(
            response_result(&response)?
                .ok_or("no result was returned for chain id")?
                .as_str()
                .ok_or("chain id was not a string")?,
        )
    }

    /// The latest block's number and timestamp, via `eth_getBlockByNumber`.
    pub async fn latest_block(&self) -> Result<(u64, u64), String> {
        let response = self
            .send_rpc_request("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let result = response_result(&response)?.ok_or("no result was returned for block")?;

        let number = hex_to_u64_be(
            result
                .get("number")
                .ok_or("no number for block")?
                .as_str()
                .ok_or("block number was not a string")?,
        )?;
        let timestamp = hex_to_u64_be(
            result
                .get("timestamp")
                .ok_or("no timestamp for block")?
                .as_str()
                .ok_or("block timestamp was not a string")?,
        )?;
        Ok((number, timestamp))
    }

    /// Takes a snapshot on the node, returning its identifier.
    pub async fn snapshot(&self) -> Result<String, String> {
        let response = self.send_rpc_request("evm_snapshot", json!([])).await?;
        Ok(response_result(&response)?
            .ok_or("no result was returned for snapshot")?
            .as_str()
            .ok_or("snapshot id was not a string")?
            .to_string())
    }

    /// Reverts the node to a snapshot. Dev nodes consume the snapshot on
    /// revert; callers must re-snapshot if they want to revert again.
    pub async fn revert(&self, snapshot_id: &str) -> Result<bool, String> {
        let response = self
            .send_rpc_request("evm_revert", json!([snapshot_id]))
            .await?;
        response_result(&response)?
            .ok_or("no result was returned for revert")?
            .as_bool()
            .ok_or_else(|| "revert result was not a bool".to_string())
    }

    /// Mines one block.
    pub async fn mine(&self) -> Result<(), String> {
        let response = self.send_rpc_request("evm_mine", json!([])).await?;
        response_result(&response)?;
        Ok(())
    }

    /// Advances the node's clock by `seconds`.
    pub async fn increase_time(&self, seconds: u64) -> Result<(), String> {
        let response = self
            .send_rpc_request("evm_increaseTime", json!([seconds]))
            .await?;
        response_result(&response)?;
        Ok(())
    }

    /// Sends an RPC request, returning the raw response body.
    async fn send_rpc_request(&self, method: &str, params: Value) -> Result<String, String> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        })
        .to_string();

        let response = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| format!("{} request failed: {}", method, e))?;

        if !response.status().is_success() {
            return Err(format!(
                "{} response status was not 200 OK: {}",
                method,
                response.status()
            ));
        }

        response
            .text()
            .await
            .map_err(|e| format!("failed to receive {} response body: {}", method, e))
    }
}

/// Returns the `result` field of a JSON-RPC response, surfacing the `error`
/// field if the node returned one.
fn response_result(response: &str) -> Result<Option<Value>, String> {
    let json = serde_json::from_str::<Value>(response)
        .map_err(|e| format!("failed to parse RPC response: {}", e))?;

    if let Some(error) = json.get("error") {
        return Err(format!("EVM node returned error: {}", error));
    }
    Ok(json.get("result").cloned())
}

/// Parses a `0x`-prefixed big-endian hex string as a u64.
fn hex_to_u64_be(hex: &str) -> Result<u64, String> {
    let stripped = hex
        .strip_prefix("0x")
        .ok_or_else(|| format!("hex string [{}] did not start with 0x", hex))?;
    u64::from_str_radix(stripped, 16).map_err(|e| format!("failed to parse hex as u64: {}", e))
}
