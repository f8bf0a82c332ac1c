//! Typed failures surfaced by the adapter
//!
//! Clients return `anyhow::Result`; these variants are raised where callers
//! need to tell failures apart (`err.downcast_ref::<RektError>()`).

use thiserror::Error;

use crate::contract::abi::AbiError;
use crate::types::MarketPhase;

#[derive(Debug, Error)]
pub enum RektError {
    /// Market identifiers start at 1
    #[error("invalid market id {0}: market ids must be positive")]
    InvalidMarketId(u64),

    /// Input rejected before any network call
    #[error("validation failed: {0}")]
    Validation(String),

    /// JSON-RPC error object returned by the node
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// GraphQL `errors` array returned by the subgraph
    #[error("subgraph error: {0}")]
    Subgraph(String),

    #[error(transparent)]
    Abi(#[from] AbiError),

    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },

    #[error("transaction {tx_hash} not confirmed after {waited_secs}s")]
    ConfirmationTimeout { tx_hash: String, waited_secs: u64 },

    #[error("market {market_id} is not accepting predictions (phase {phase})")]
    NotParticipable { market_id: u64, phase: MarketPhase },

    #[error("market {market_id} cannot be settled (phase {phase}, settled={settled})")]
    NotSettleable { market_id: u64, phase: MarketPhase, settled: bool },

    #[error("market {0} already exists")]
    MarketExists(u64),

    /// Writes need a sender account
    #[error("no sender address configured (set REKT_FROM_ADDRESS)")]
    MissingSender,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RektError::NotParticipable { market_id: 7, phase: MarketPhase::Locked };
        assert_eq!(err.to_string(), "market 7 is not accepting predictions (phase LOCKED)");

        let err = RektError::InvalidMarketId(0);
        assert!(err.to_string().contains("positive"));
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = RektError::MissingSender.into();
        assert!(matches!(err.downcast_ref::<RektError>(), Some(RektError::MissingSender)));
    }
}
