//! Market Watcher - cancellable poll loop around the resolver
//!
//! # Lifecycle
//! - `spawn` fetches immediately, then once per interval
//! - `refresh` fetches on demand (e.g. right after a write confirms)
//! - `retarget` swaps the market: old loop cancelled, fresh empty snapshot
//! - `stop` / drop cancel the loop
//!
//! A failed poll keeps the last good snapshot and records the error until
//! the next successful poll. When polls overlap, a result never replaces one
//! from a poll that started later. Each watcher is independent; two watchers on
//! the same market issue duplicate reads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::resolver::{MarketStateResolver, ResolvedMarket};

/// Shorter intervals are raised to this
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Latest view published by a watcher
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchSnapshot {
    pub market_id: u64,
    /// Last successful resolution
    pub resolved: Option<ResolvedMarket>,
    /// Error from the most recent poll, cleared on success
    pub error: Option<String>,
    pub loading: bool,
    pub last_success_at: Option<i64>,
    pub polls: u64,
}

impl WatchSnapshot {
    fn empty(market_id: u64) -> Self {
        Self { market_id, loading: true, ..Default::default() }
    }

    /// No successful poll yet for the current market
    pub fn is_stale(&self) -> bool {
        self.resolved.is_none()
    }

    /// One-line status for operators
    pub fn status_line(&self) -> String {
        let now = Utc::now().format("%H:%M:%S");
        let state = match &self.resolved {
            Some(r) => format!(
                "{} \"{}\" label={} pool={} players={}",
                r.phase(),
                r.market.name,
                r.label,
                r.market.total_amount,
                r.players.len()
            ),
            None => "no data".to_string(),
        };
        let error = self.error.as_deref().map(|e| format!(" error={}", e)).unwrap_or_default();
        format!("[{}] market={} {} polls={}{}", now, self.market_id, state, self.polls, error)
    }
}

struct Inner {
    resolver: MarketStateResolver,
    market_id: u64,
    tx: watch::Sender<WatchSnapshot>,
    /// Sequence handed to the most recently started poll
    started: AtomicU64,
    /// Sequence of the poll whose result is published; only touched under `tx`'s lock
    applied: AtomicU64,
    /// Polls still running; only touched under `tx`'s lock
    in_flight: AtomicU64,
}

impl Inner {
    fn new(
        resolver: MarketStateResolver,
        market_id: u64,
        tx: watch::Sender<WatchSnapshot>,
    ) -> Self {
        Self {
            resolver,
            market_id,
            tx,
            started: AtomicU64::new(0),
            applied: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
        }
    }

    /// Resolve once and publish, unless a poll started later already published
    async fn poll_once(&self) {
        let seq = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        self.tx.send_modify(|s| {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            s.loading = true;
        });
        let now = Utc::now().timestamp();
        let result = self.resolver.resolve(self.market_id, now).await;

        self.tx.send_modify(|s| {
            let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
            s.loading = remaining > 0;
            if seq < self.applied.load(Ordering::SeqCst) {
                debug!("Market {} poll #{} superseded, dropping result", self.market_id, seq);
                return;
            }
            self.applied.store(seq, Ordering::SeqCst);
            s.polls += 1;
            match result {
                Ok(resolved) => {
                    s.resolved = Some(resolved);
                    s.error = None;
                    s.last_success_at = Some(now);
                }
                Err(e) => {
                    warn!("Market {} poll failed, keeping last snapshot: {:#}", self.market_id, e);
                    s.error = Some(format!("{:#}", e));
                }
            }
        });
    }
}

/// Poll loop owning the latest snapshot of one market
pub struct MarketWatcher {
    inner: Arc<Inner>,
    rx: watch::Receiver<WatchSnapshot>,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl MarketWatcher {
    /// Start watching; the first fetch happens immediately
    pub fn spawn(resolver: MarketStateResolver, market_id: u64, interval: Duration) -> Self {
        let interval = if interval < MIN_POLL_INTERVAL {
            warn!("Poll interval {:?} too short, using {:?}", interval, MIN_POLL_INTERVAL);
            MIN_POLL_INTERVAL
        } else {
            interval
        };
        let (tx, rx) = watch::channel(WatchSnapshot::empty(market_id));
        let inner = Arc::new(Inner::new(resolver, market_id, tx));

        let task_inner = inner.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                task_inner.poll_once().await;
            }
        });

        info!("Watching market {} every {:?}", market_id, interval);
        Self { inner, rx, interval, task: Some(task) }
    }

    pub fn market_id(&self) -> u64 {
        self.inner.market_id
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn snapshot(&self) -> WatchSnapshot {
        self.rx.borrow().clone()
    }

    /// Change stream of snapshots
    pub fn subscribe(&self) -> watch::Receiver<WatchSnapshot> {
        self.rx.clone()
    }

    /// Snapshots as a stream, one item per published change
    pub fn updates(&self) -> impl Stream<Item = WatchSnapshot> {
        stream::unfold(self.subscribe(), |mut rx| async move {
            rx.changed().await.ok()?;
            let snapshot = rx.borrow_and_update().clone();
            Some((snapshot, rx))
        })
    }

    /// Fetch now, outside the regular cadence
    pub async fn refresh(&self) -> WatchSnapshot {
        debug!("Manual refresh of market {}", self.inner.market_id);
        self.inner.poll_once().await;
        self.snapshot()
    }

    /// Watch a different market with a fresh snapshot
    pub fn retarget(&mut self, market_id: u64) {
        if market_id == self.inner.market_id && self.is_running() {
            return;
        }
        let next = Self::spawn(self.inner.resolver.clone(), market_id, self.interval);
        self.stop();
        *self = next;
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Cancel the poll loop; the last snapshot stays readable
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Stopped watching market {}", self.inner.market_id);
        }
    }
}

impl Drop for MarketWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::testing::{sample_market, FakeReader};

    fn watcher(reader: &Arc<FakeReader>) -> MarketWatcher {
        MarketWatcher::spawn(MarketStateResolver::new(reader.clone()), 1, Duration::from_secs(5))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_fetch_then_interval() {
        let reader = Arc::new(FakeReader::new(sample_market(false)));
        let w = watcher(&reader);
        assert!(w.snapshot().is_stale());

        settle().await;
        assert_eq!(reader.market_reads(), 1);
        let snap = w.snapshot();
        assert!(!snap.is_stale());
        assert!(!snap.loading);
        assert_eq!(snap.polls, 1);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(reader.market_reads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_poll_keeps_last_snapshot() {
        let reader = Arc::new(FakeReader::new(sample_market(false)));
        let w = watcher(&reader);
        settle().await;
        let good = w.snapshot().resolved.unwrap();

        reader.set_failing(true);
        let snap = w.refresh().await;
        assert_eq!(snap.resolved.as_ref(), Some(&good));
        assert!(snap.error.as_deref().unwrap().contains("rpc unavailable"));

        reader.set_failing(false);
        let snap = w.refresh().await;
        assert!(snap.error.is_none());
        assert!(snap.last_success_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_reflects_new_pool() {
        let reader = Arc::new(FakeReader::new(sample_market(false)));
        let w = watcher(&reader);
        settle().await;

        let mut market = sample_market(false);
        market.total_amount = 50;
        reader.set_market(market);

        let snap = w.refresh().await;
        assert_eq!(snap.resolved.unwrap().market.total_amount, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_tick_does_not_overwrite_refresh() {
        let reader = Arc::new(FakeReader::new(sample_market(false)));
        reader.delay_next_read(Duration::from_secs(3));
        let w = watcher(&reader);
        settle().await;
        assert!(w.snapshot().loading);

        let mut market = sample_market(false);
        market.total_amount = 50;
        reader.set_market(market);

        let snap = w.refresh().await;
        assert_eq!(snap.resolved.unwrap().market.total_amount, 50);
        assert!(snap.loading, "initial tick still in flight");

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(reader.market_reads(), 2);
        let snap = w.snapshot();
        assert_eq!(snap.resolved.unwrap().market.total_amount, 50);
        assert!(!snap.loading);
        assert_eq!(snap.polls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let reader = Arc::new(FakeReader::new(sample_market(false)));
        let w = MarketWatcher::spawn(MarketStateResolver::new(reader.clone()), 1, Duration::ZERO);
        assert_eq!(w.interval(), MIN_POLL_INTERVAL);

        settle().await;
        assert!(w.is_running());
        assert_eq!(w.snapshot().polls, 1);
        assert!(!w.snapshot().loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_and_drop_cancel_polling() {
        let reader = Arc::new(FakeReader::new(sample_market(false)));
        let mut w = watcher(&reader);
        settle().await;
        w.stop();
        assert!(!w.is_running());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(reader.market_reads(), 1);

        let other = Arc::new(FakeReader::new(sample_market(false)));
        let w2 = watcher(&other);
        settle().await;
        drop(w2);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(other.market_reads(), 1);
        drop(w);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retarget_starts_fresh() {
        let reader = Arc::new(FakeReader::new(sample_market(false)));
        let mut w = watcher(&reader);
        settle().await;
        assert_eq!(w.snapshot().resolved.unwrap().market.market_id, 1);

        w.retarget(7);
        assert_eq!(w.market_id(), 7);
        assert!(w.snapshot().is_stale());

        settle().await;
        assert_eq!(w.snapshot().resolved.unwrap().market.market_id, 7);
        assert!(w.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_sees_updates() {
        let reader = Arc::new(FakeReader::new(sample_market(false)));
        let w = watcher(&reader);
        let mut rx = w.subscribe();

        let snap = rx.wait_for(|s| s.polls >= 1).await.unwrap().clone();
        assert_eq!(snap.market_id, 1);
        assert!(snap.status_line().contains("market=1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_stream() {
        use futures::StreamExt;

        let reader = Arc::new(FakeReader::new(sample_market(false)));
        let w = watcher(&reader);
        let polls: Vec<u64> = w
            .updates()
            .filter(|s| futures::future::ready(!s.loading))
            .map(|s| s.polls)
            .take(2)
            .collect()
            .await;
        assert_eq!(polls, vec![1, 2]);
    }
}
