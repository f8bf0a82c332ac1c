//! Market lifecycle
//!
//! # Components
//! - `state`: pure phase derivation and capability flags
//! - `MarketStateResolver`: reads the contract and derives a consistent snapshot
//! - `MarketWatcher`: cancellable poll loop publishing the latest snapshot

pub mod resolver;
pub mod state;
pub mod watcher;

pub use resolver::{
    MarketHistory, MarketReader, MarketStateResolver, ResolvedMarket, StartTimeSource,
};
pub use state::{derive_phase, MarketPhase, MarketState};
pub use watcher::{MarketWatcher, WatchSnapshot, MIN_POLL_INTERVAL};

/// In-memory collaborators for resolver and watcher tests
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;

    use super::{MarketHistory, MarketPhase, MarketReader};
    use crate::types::{Address, Market};

    pub fn sample_market(settled: bool) -> Market {
        Market {
            market_id: 1,
            name: "BTC Price Prediction".to_string(),
            start_time: 1000,
            deadline: 2000,
            entrance_fee: 10_000_000_000_000_000,
            final_price: 0,
            total_amount: 0,
            settled,
        }
    }

    pub struct FakeReader {
        market: Mutex<Market>,
        chain_phase: Mutex<Option<MarketPhase>>,
        failing: Mutex<bool>,
        next_delay: Mutex<Option<Duration>>,
        reads: AtomicU64,
    }

    impl FakeReader {
        pub fn new(market: Market) -> Self {
            Self {
                market: Mutex::new(market),
                chain_phase: Mutex::new(None),
                failing: Mutex::new(false),
                next_delay: Mutex::new(None),
                reads: AtomicU64::new(0),
            }
        }

        pub fn set_market(&self, market: Market) {
            *self.market.lock().unwrap() = market;
        }

        pub fn set_chain_phase(&self, phase: Option<MarketPhase>) {
            *self.chain_phase.lock().unwrap() = phase;
        }

        pub fn set_failing(&self, failing: bool) {
            *self.failing.lock().unwrap() = failing;
        }

        /// Hold the next `market` read for `delay`; the value is taken before waiting
        pub fn delay_next_read(&self, delay: Duration) {
            *self.next_delay.lock().unwrap() = Some(delay);
        }

        pub fn market_reads(&self) -> u64 {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MarketReader for FakeReader {
        async fn market(&self, market_id: u64) -> Result<Market> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if *self.failing.lock().unwrap() {
                anyhow::bail!("rpc unavailable");
            }
            let mut market = self.market.lock().unwrap().clone();
            market.market_id = market_id;
            let delay = self.next_delay.lock().unwrap().take();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(market)
        }

        async fn chain_phase(&self, _market_id: u64) -> Result<MarketPhase> {
            match *self.chain_phase.lock().unwrap() {
                Some(phase) => Ok(phase),
                None => anyhow::bail!("getMarketPhase reverted"),
            }
        }

        async fn players(&self, _market_id: u64) -> Result<Vec<Address>> {
            Ok(vec![Address::ZERO])
        }
    }

    pub struct FakeHistory(pub Option<i64>);

    #[async_trait]
    impl MarketHistory for FakeHistory {
        async fn created_at(&self, _market_id: u64) -> Result<Option<i64>> {
            Ok(self.0)
        }
    }
}
