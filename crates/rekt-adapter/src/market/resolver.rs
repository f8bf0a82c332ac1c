//! Market State Resolver
//!
//! Produces a consistent `(phase, settled, flags)` snapshot for one market.
//!
//! # Algorithm
//! 1. Reject market id 0 before touching the network
//! 2. Read `markets(id)`; a zero start time falls back to the creation
//!    block timestamp from history when one is available
//! 3. Derive the phase locally from `(start, deadline, now)`
//! 4. Read players, and the chain's own phase best effort
//! 5. A chain phase that disagrees with the local one is logged, never applied
//!
//! Resolution is read-only; it never writes to the chain.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::state::{MarketPhase, MarketState};
use crate::error::RektError;
use crate::types::{Address, Market};

/// Read-only access to contract market data
#[async_trait]
pub trait MarketReader: Send + Sync {
    async fn market(&self, market_id: u64) -> Result<Market>;
    async fn chain_phase(&self, market_id: u64) -> Result<MarketPhase>;
    async fn players(&self, market_id: u64) -> Result<Vec<Address>>;
}

/// Historical event source used for the zero start-time fallback
#[async_trait]
pub trait MarketHistory: Send + Sync {
    /// Block timestamp of the market's creation event, if indexed
    async fn created_at(&self, market_id: u64) -> Result<Option<i64>>;
}

/// Where the effective start time came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartTimeSource {
    Contract,
    History,
    /// Contract reported zero and no history was available
    LiteralZero,
}

/// Resolver output
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedMarket {
    /// Contract snapshot with the effective start time applied
    pub market: Market,
    pub state: MarketState,
    pub label: String,
    pub start_time_source: StartTimeSource,
    /// `getMarketPhase` result, when the read succeeded
    pub chain_phase: Option<MarketPhase>,
    pub players: Vec<Address>,
    /// Reference time used for derivation
    pub resolved_at: i64,
}

impl ResolvedMarket {
    pub fn phase(&self) -> MarketPhase {
        self.state.phase
    }
}

/// Resolver over a contract reader and optional history
#[derive(Clone)]
pub struct MarketStateResolver {
    reader: Arc<dyn MarketReader>,
    history: Option<Arc<dyn MarketHistory>>,
}

impl MarketStateResolver {
    pub fn new(reader: Arc<dyn MarketReader>) -> Self {
        Self { reader, history: None }
    }

    pub fn with_history(mut self, history: Arc<dyn MarketHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Resolve one market at reference time `now` (epoch seconds)
    pub async fn resolve(&self, market_id: u64, now: i64) -> Result<ResolvedMarket> {
        if market_id == 0 {
            return Err(RektError::InvalidMarketId(market_id).into());
        }

        let mut market = self.reader.market(market_id).await?;
        let start_time_source = self.apply_start_time_fallback(&mut market).await;

        let (chain_phase, players) =
            tokio::join!(self.reader.chain_phase(market_id), self.reader.players(market_id));
        let players = players?;
        let chain_phase = match chain_phase {
            Ok(phase) => Some(phase),
            Err(e) => {
                warn!("getMarketPhase({}) failed, using local derivation only: {:#}", market_id, e);
                None
            }
        };

        let state = MarketState::derive(market.start_time, market.deadline, market.settled, now);
        if let Some(chain) = chain_phase {
            if chain != state.phase {
                warn!(
                    "Market {} phase mismatch: local={} chain={} (local wins)",
                    market_id, state.phase, chain
                );
            }
        }

        debug!(
            "Resolved market {}: phase={} settled={} players={}",
            market_id,
            state.phase,
            market.settled,
            players.len()
        );

        Ok(ResolvedMarket {
            label: state.label().to_string(),
            market,
            state,
            start_time_source,
            chain_phase,
            players,
            resolved_at: now,
        })
    }

    async fn apply_start_time_fallback(&self, market: &mut Market) -> StartTimeSource {
        if market.start_time != 0 {
            return StartTimeSource::Contract;
        }
        let Some(history) = &self.history else {
            return StartTimeSource::LiteralZero;
        };

        match history.created_at(market.market_id).await {
            Ok(Some(ts)) => {
                debug!("Market {} start time from creation block: {}", market.market_id, ts);
                market.start_time = ts;
                StartTimeSource::History
            }
            Ok(None) => StartTimeSource::LiteralZero,
            Err(e) => {
                warn!("History lookup for market {} failed: {:#}", market.market_id, e);
                StartTimeSource::LiteralZero
            }
        }
    }
}
