//! Phase derivation
//!
//! Phase is a pure function of `(start_time, deadline, now)`:
//! - `Open` while `now < start_time`
//! - `Locked` while `start_time <= now < deadline`
//! - `Settlement` once `now >= deadline`
//!
//! The settled flag never moves the phase; it only picks the Settlement
//! label and gates the capability flags.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Market lifecycle stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketPhase {
    /// Accepting predictions
    Open,
    /// No new predictions, awaiting deadline
    Locked,
    /// Deadline passed, outcome pending or final
    Settlement,
}

impl MarketPhase {
    /// Map the contract's `getMarketPhase` code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MarketPhase::Open),
            1 => Some(MarketPhase::Locked),
            2 => Some(MarketPhase::Settlement),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            MarketPhase::Open => 0,
            MarketPhase::Locked => 1,
            MarketPhase::Settlement => 2,
        }
    }
}

impl fmt::Display for MarketPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MarketPhase::Open => "OPEN",
            MarketPhase::Locked => "LOCKED",
            MarketPhase::Settlement => "SETTLEMENT",
        };
        f.write_str(s)
    }
}

/// Derive the phase from timestamps (epoch seconds)
pub fn derive_phase(start_time: i64, deadline: i64, now: i64) -> MarketPhase {
    if now < start_time {
        MarketPhase::Open
    } else if now < deadline {
        MarketPhase::Locked
    } else {
        MarketPhase::Settlement
    }
}

/// Derived view of phase and settled flag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketState {
    pub phase: MarketPhase,
    pub is_settled: bool,
    pub can_participate: bool,
    pub can_settle: bool,
    pub is_active: bool,
}

impl MarketState {
    pub fn new(phase: MarketPhase, settled: bool) -> Self {
        let can_participate = phase == MarketPhase::Open && !settled;
        Self {
            phase,
            is_settled: settled,
            can_participate,
            can_settle: phase == MarketPhase::Settlement && !settled,
            is_active: can_participate,
        }
    }

    /// Derive straight from raw market fields
    pub fn derive(start_time: i64, deadline: i64, settled: bool, now: i64) -> Self {
        Self::new(derive_phase(start_time, deadline, now), settled)
    }

    /// Display label
    pub fn label(&self) -> &'static str {
        match (self.phase, self.is_settled) {
            (MarketPhase::Open, _) => "Open",
            (MarketPhase::Locked, _) => "Locked",
            (MarketPhase::Settlement, true) => "Settled",
            (MarketPhase::Settlement, false) => "Settlement Pending",
        }
    }
}
