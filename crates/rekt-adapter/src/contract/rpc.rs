//! Ethereum JSON-RPC transport
//!
//! # Methods used
//! - `eth_call` - read-only contract calls
//! - `eth_sendTransaction` - writes signed by the provider's account
//! - `eth_getTransactionReceipt` - confirmation polling
//! - `eth_blockNumber` - connectivity check
//!
//! # Source
//! - https://ethereum.org/en/developers/docs/apis/json-rpc/

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::RektError;
use crate::HTTP_TIMEOUT_SECS;

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// JSON-RPC 2.0 client over HTTP
#[derive(Clone)]
pub struct JsonRpcClient {
    client: Client,
    url: String,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcClient {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue a request; `null` results come back as `Value::Null`
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        debug!("RPC {} #{} -> {}", method, id, self.url);

        let response =
            self.client.post(&self.url).json(&body).send().await.context("RPC request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {} from RPC {}: {}", status, self.url, text);
        }

        let parsed: RpcResponse = response.json().await.context("Failed to parse RPC response")?;
        if let Some(err) = parsed.error {
            return Err(RektError::Rpc { code: err.code, message: err.message }.into());
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    /// Request expecting a string result (hex data, hashes, quantities)
    pub async fn request_str(&self, method: &str, params: Value) -> Result<String> {
        match self.request(method, params).await? {
            Value::String(s) => Ok(s),
            other => anyhow::bail!("Unexpected {} result: {}", method, other),
        }
    }

    /// Connectivity check via `eth_blockNumber`
    pub async fn test_connectivity(&self) -> Result<u64> {
        info!("Testing connectivity to {}", self.url);
        let raw = self.request_str("eth_blockNumber", json!([])).await?;
        let block = crate::contract::abi::parse_quantity(&raw)?;
        info!("RPC connectivity: OK (block {})", block);
        Ok(block)
    }
}
