//! REKT Prediction Market Adapter
//!
//! Off-chain toolkit for the REKT prediction-market contract:
//! - `contract`: Solidity ABI codec, JSON-RPC transport and typed contract bindings
//! - `subgraph`: GraphQL client for the indexed event feeds
//! - `market`: phase derivation, the Market State Resolver and its polling watcher
//! - `chat`: REST client for the prediction chat service
//! - `flows`: one-shot write flows (participate, settle, create market)
//!
//! # External collaborators
//! - REKT contract (source of truth for phases, balances and settlement)
//! - Indexing subgraph (historical event log)
//! - Wallet provider behind the JSON-RPC endpoint (signs `eth_sendTransaction`)
//! - Chat service (`rekt-chat`)

pub mod chat;
pub mod config;
pub mod contract;
pub mod error;
pub mod flows;
pub mod market;
pub mod subgraph;
pub mod types;

pub use config::RektConfig;
pub use error::RektError;
pub use types::*;

/// Default JSON-RPC endpoint (local development node)
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// Default chat service base URL
pub const DEFAULT_CHAT_API_BASE: &str = "http://127.0.0.1:3000";

/// Default watcher poll interval in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Receipt polling cadence while awaiting confirmation
pub const DEFAULT_CONFIRM_POLL_MS: u64 = 1500;

/// Give up awaiting a receipt after this long
pub const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 120;

/// Look-back window for the market-created feed (14 days)
pub const SUBGRAPH_LOOKBACK_SECS: i64 = 14 * 24 * 60 * 60;

/// HTTP client timeout shared by every outbound client
pub const HTTP_TIMEOUT_SECS: u64 = 30;
