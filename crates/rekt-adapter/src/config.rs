//! Composed configuration for the adapter
//!
//! Every client is built from an explicit `RektConfig` handed down by the
//! caller. Defaults come from the crate constants, the environment fills in
//! deployment specifics and the CLI overrides both.
//!
//! # Environment
//! - `REKT_RPC_URL` - JSON-RPC endpoint (default: local node)
//! - `REKT_CONTRACT_ADDRESS` - REKT contract address (required)
//! - `REKT_FROM_ADDRESS` - provider account used for writes (optional)
//! - `REKT_SUBGRAPH_URL` - subgraph GraphQL endpoint (optional)
//! - `REKT_CHAT_API_URL` - chat service base URL
//! - `REKT_POLL_INTERVAL_SECS` - watcher poll interval

use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::types::Address;
use crate::{
    DEFAULT_CHAT_API_BASE, DEFAULT_CONFIRM_POLL_MS, DEFAULT_CONFIRM_TIMEOUT_SECS,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_RPC_URL,
};

/// JSON-RPC connection and contract location
#[derive(Clone, Debug)]
pub struct RpcConfig {
    pub url: String,
    pub contract_address: Address,
    /// Sender for `eth_sendTransaction`; reads work without it
    pub from: Option<Address>,
}

/// Receipt polling for one-shot writes
#[derive(Clone, Debug)]
pub struct ConfirmConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_CONFIRM_POLL_MS),
            timeout: Duration::from_secs(DEFAULT_CONFIRM_TIMEOUT_SECS),
        }
    }
}

/// Market watcher cadence
#[derive(Clone, Debug)]
pub struct WatchConfig {
    pub poll_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS) }
    }
}

/// Top-level adapter configuration
#[derive(Clone, Debug)]
pub struct RektConfig {
    pub rpc: RpcConfig,
    pub subgraph_url: Option<String>,
    pub chat_api_url: String,
    pub confirm: ConfirmConfig,
    pub watch: WatchConfig,
}

impl RektConfig {
    /// Minimal configuration: RPC endpoint plus contract, defaults elsewhere
    pub fn new(rpc_url: &str, contract_address: Address) -> Self {
        Self {
            rpc: RpcConfig { url: rpc_url.to_string(), contract_address, from: None },
            subgraph_url: None,
            chat_api_url: DEFAULT_CHAT_API_BASE.to_string(),
            confirm: ConfirmConfig::default(),
            watch: WatchConfig::default(),
        }
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let contract: Address = get("REKT_CONTRACT_ADDRESS")
            .context("REKT_CONTRACT_ADDRESS is not set")?
            .parse()
            .context("Invalid REKT_CONTRACT_ADDRESS")?;

        let rpc_url = get("REKT_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        let mut config = Self::new(&rpc_url, contract);

        if let Some(from) = get("REKT_FROM_ADDRESS") {
            config.rpc.from = Some(from.parse().context("Invalid REKT_FROM_ADDRESS")?);
        }
        config.subgraph_url = get("REKT_SUBGRAPH_URL");
        if let Some(chat) = get("REKT_CHAT_API_URL") {
            config.chat_api_url = chat;
        }
        if let Some(secs) = get("REKT_POLL_INTERVAL_SECS") {
            let secs: u64 = secs.parse().context("Invalid REKT_POLL_INTERVAL_SECS")?;
            config.watch.poll_interval = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check URLs and intervals
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.rpc.url).with_context(|| format!("Invalid RPC URL '{}'", self.rpc.url))?;
        Url::parse(&self.chat_api_url)
            .with_context(|| format!("Invalid chat API URL '{}'", self.chat_api_url))?;
        if let Some(subgraph) = &self.subgraph_url {
            Url::parse(subgraph).with_context(|| format!("Invalid subgraph URL '{}'", subgraph))?;
        }
        if self.watch.poll_interval.is_zero() {
            anyhow::bail!("Poll interval must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::types::AddressError;

    const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_from_minimal_env() {
        let config =
            RektConfig::from_lookup(lookup(&[("REKT_CONTRACT_ADDRESS", CONTRACT)])).unwrap();
        assert_eq!(config.rpc.url, DEFAULT_RPC_URL);
        assert_eq!(config.rpc.contract_address.to_string(), CONTRACT);
        assert!(config.rpc.from.is_none());
        assert!(config.subgraph_url.is_none());
        assert_eq!(config.watch.poll_interval, Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS));
    }

    #[test]
    fn test_missing_contract_is_error() {
        let err = RektConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("REKT_CONTRACT_ADDRESS"));
    }

    #[test]
    fn test_full_env() {
        let config = RektConfig::from_lookup(lookup(&[
            ("REKT_CONTRACT_ADDRESS", CONTRACT),
            ("REKT_RPC_URL", "https://rpc.example.com"),
            ("REKT_FROM_ADDRESS", "0x70997970c51812dc3a010c7d01b50e0d17dc79c8"),
            ("REKT_SUBGRAPH_URL", "https://api.studio.thegraph.com/query/1/rekt/v1"),
            ("REKT_POLL_INTERVAL_SECS", "10"),
        ]))
        .unwrap();
        assert_eq!(config.rpc.url, "https://rpc.example.com");
        assert!(config.rpc.from.is_some());
        assert!(config.subgraph_url.is_some());
        assert_eq!(config.watch.poll_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(RektConfig::from_lookup(lookup(&[
            ("REKT_CONTRACT_ADDRESS", CONTRACT),
            ("REKT_POLL_INTERVAL_SECS", "0"),
        ]))
        .is_err());
        assert!(RektConfig::from_lookup(lookup(&[
            ("REKT_CONTRACT_ADDRESS", CONTRACT),
            ("REKT_RPC_URL", "not a url"),
        ]))
        .is_err());
        assert!(RektConfig::from_lookup(lookup(&[("REKT_CONTRACT_ADDRESS", "0x1234")])).is_err());
    }

    #[test]
    fn test_bad_address_keeps_cause() {
        let err = RektConfig::from_lookup(lookup(&[
            ("REKT_CONTRACT_ADDRESS", CONTRACT),
            ("REKT_FROM_ADDRESS", "70997970c51812dc3a010c7d01b50e0d17dc79c8"),
        ]))
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid REKT_FROM_ADDRESS");
        assert!(matches!(
            err.downcast_ref::<AddressError>(),
            Some(AddressError::MissingPrefix(_))
        ));
    }
}
