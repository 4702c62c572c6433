//! Aggregation loop: keeps one channel's broadcast state fresh.
//!
//! Each tick queries the result source for the ranking and the balance
//! concurrently, then hands both to the channel's `ChannelBroadcaster`.
//!
//! # Cadence
//! The loop sleeps a fixed interval *after* each tick completes, so under a
//! slow source the effective period is `interval + tick time`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adapters::ResultSource;
use crate::core::broadcaster::ChannelBroadcaster;

/// What happened to the ranking stream during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingOutcome {
    /// Non-empty list published (record count)
    Published(usize),
    /// Source returned no opportunities; empty list published
    Empty,
    /// Source failed; empty list published
    Failed,
}

/// What happened to the balance stream during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceOutcome {
    Published,
    /// Source had no data; `{}` published
    Empty,
    /// Source failed; nothing published this tick
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub ranking: RankingOutcome,
    pub balance: BalanceOutcome,
}

/// Periodic refresh-and-broadcast task for a single channel.
pub struct AggregationLoop {
    source: Arc<dyn ResultSource>,
    broadcaster: Arc<ChannelBroadcaster>,
    interval: Duration,
}

impl AggregationLoop {
    /// Create a loop that queries the broadcaster's own source.
    pub fn new(broadcaster: Arc<ChannelBroadcaster>, interval: Duration) -> Self {
        Self {
            source: broadcaster.source(),
            broadcaster,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one refresh cycle. Never fails: every error is absorbed here.
    pub async fn tick(&self) -> TickReport {
        let channel = self.broadcaster.name();
        let (ranking, balance) =
            tokio::join!(self.source.ranking(), self.source.latest_balance());

        let ranking = match ranking {
            Ok(list) if !list.is_empty() => {
                RankingOutcome::Published(self.broadcaster.publish_ranking(list).await)
            }
            Ok(_) => {
                self.broadcaster.publish_ranking(Vec::new()).await;
                RankingOutcome::Empty
            }
            Err(e) => {
                warn!(
                    channel = %channel,
                    source = self.source.source_name(),
                    error = %e,
                    "Ranking query failed, publishing empty list"
                );
                self.broadcaster.publish_ranking(Vec::new()).await;
                RankingOutcome::Failed
            }
        };

        let balance = match balance {
            Ok(Some(snapshot)) if !snapshot.is_empty() => {
                self.broadcaster.publish_balance(Some(snapshot)).await;
                BalanceOutcome::Published
            }
            Ok(_) => {
                self.broadcaster.publish_balance(None).await;
                BalanceOutcome::Empty
            }
            Err(e) => {
                warn!(
                    channel = %channel,
                    source = self.source.source_name(),
                    error = %e,
                    "Balance query failed, skipping balance update this tick"
                );
                BalanceOutcome::Failed
            }
        };

        TickReport { ranking, balance }
    }

    /// Tick forever until `shutdown` is cancelled.
    ///
    /// Cancellation is observed between ticks only. A panicking tick is
    /// logged and counts as "no new data".
    pub async fn run(self, shutdown: CancellationToken) {
        let channel = self.broadcaster.name().to_string();
        info!(
            channel = %channel,
            interval_ms = self.interval.as_millis() as u64,
            "Aggregation loop started"
        );

        let mut tick_count: u64 = 0;
        loop {
            tick_count += 1;

            match AssertUnwindSafe(self.tick()).catch_unwind().await {
                Ok(report) => {
                    debug!(
                        channel = %channel,
                        tick = tick_count,
                        ranking = ?report.ranking,
                        balance = ?report.balance,
                        "Tick complete"
                    );
                }
                Err(_) => {
                    error!(channel = %channel, tick = tick_count, "Tick panicked, treating as no new data");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(channel = %channel, ticks = tick_count, "Aggregation loop stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{SourceError, SourceResult};
    use crate::core::broadcaster::{DeliveryError, Subscriber, SubscriberId};
    use crate::core::types::{
        BalancePayload, BalanceSnapshot, ChannelEvent, OpportunityRecord, OutboundEvent, SideQuote,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct ScriptedSource {
        rankings: Mutex<Vec<SourceResult<Vec<OpportunityRecord>>>>,
        balances: Mutex<Vec<SourceResult<Option<BalanceSnapshot>>>>,
    }

    impl ScriptedSource {
        fn new(
            rankings: Vec<SourceResult<Vec<OpportunityRecord>>>,
            balances: Vec<SourceResult<Option<BalanceSnapshot>>>,
        ) -> Self {
            Self {
                rankings: Mutex::new(rankings),
                balances: Mutex::new(balances),
            }
        }
    }

    #[async_trait]
    impl ResultSource for ScriptedSource {
        async fn ranking(&self) -> SourceResult<Vec<OpportunityRecord>> {
            let mut queue = self.rankings.lock().unwrap();
            if queue.is_empty() {
                Ok(vec![])
            } else {
                queue.remove(0)
            }
        }

        async fn latest_balance(&self) -> SourceResult<Option<BalanceSnapshot>> {
            let mut queue = self.balances.lock().unwrap();
            if queue.is_empty() {
                Ok(None)
            } else {
                queue.remove(0)
            }
        }
    }

    struct PanickingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ResultSource for PanickingSource {
        async fn ranking(&self) -> SourceResult<Vec<OpportunityRecord>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("ranking backend bug");
            }
            Ok(vec![])
        }

        async fn latest_balance(&self) -> SourceResult<Option<BalanceSnapshot>> {
            Ok(None)
        }
    }

    struct Collector {
        id: SubscriberId,
        events: Mutex<Vec<ChannelEvent>>,
    }

    impl Subscriber for Collector {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn deliver(&self, event: OutboundEvent) -> Result<(), DeliveryError> {
            self.events.lock().unwrap().push(event.decode().unwrap());
            Ok(())
        }
    }

    fn record(symbol: &str) -> OpportunityRecord {
        OpportunityRecord::new(
            symbol,
            Some(1.25),
            SideQuote { exchange: "binance".into(), price: 100.0 },
            SideQuote { exchange: "kucoin".into(), price: 101.25 },
        )
    }

    async fn setup(source: impl ResultSource + 'static) -> (AggregationLoop, Arc<Collector>) {
        let broadcaster = Arc::new(ChannelBroadcaster::new("/arbitrage", Arc::new(source)));
        let collector = Arc::new(Collector {
            id: Uuid::new_v4(),
            events: Mutex::new(Vec::new()),
        });
        broadcaster.on_subscriber_join(collector.clone()).await;
        collector.events.lock().unwrap().clear();
        (AggregationLoop::new(broadcaster, Duration::from_secs(5)), collector)
    }

    #[tokio::test]
    async fn test_tick_publishes_ranking_and_balance() {
        let source = ScriptedSource::new(
            vec![Ok(vec![record("BTC/USDT"), record("ETH/USDT")])],
            vec![Ok(BalanceSnapshot::from_value(json!({"USDT": 10.0})))],
        );
        let (agg, collector) = setup(source).await;

        let report = agg.tick().await;

        assert_eq!(report.ranking, RankingOutcome::Published(2));
        assert_eq!(report.balance, BalanceOutcome::Published);
        let events = collector.events.lock().unwrap().clone();
        assert_eq!(events.len(), 4); // 2 spot-arb + 1 top list + 1 balance
        assert!(matches!(events[3], ChannelEvent::BalancesUpdate(BalancePayload::Snapshot(_))));
    }

    #[tokio::test]
    async fn test_ranking_failure_publishes_empty_list() {
        let source = ScriptedSource::new(
            vec![Err(SourceError::Unavailable("ranking down".into()))],
            vec![Ok(None)],
        );
        let (agg, collector) = setup(source).await;

        let report = agg.tick().await;

        assert_eq!(report.ranking, RankingOutcome::Failed);
        let events = collector.events.lock().unwrap().clone();
        assert_eq!(events[0], ChannelEvent::TopList(vec![]));
    }

    #[tokio::test]
    async fn test_balance_failure_skips_balance_event_only() {
        let source = ScriptedSource::new(
            vec![Ok(vec![record("BTC/USDT")])],
            vec![Err(SourceError::Unavailable("db down".into()))],
        );
        let (agg, collector) = setup(source).await;

        let report = agg.tick().await;

        assert_eq!(report.ranking, RankingOutcome::Published(1));
        assert_eq!(report.balance, BalanceOutcome::Failed);
        let events = collector.events.lock().unwrap().clone();
        assert!(events
            .iter()
            .all(|e| !matches!(e, ChannelEvent::BalancesUpdate(_))));
    }

    #[tokio::test]
    async fn test_balance_without_data_publishes_empty_object() {
        let source = ScriptedSource::new(vec![], vec![Ok(None)]);
        let (agg, collector) = setup(source).await;

        let report = agg.tick().await;

        assert_eq!(report.ranking, RankingOutcome::Empty);
        assert_eq!(report.balance, BalanceOutcome::Empty);
        let events = collector.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                ChannelEvent::TopList(vec![]),
                ChannelEvent::BalancesUpdate(BalancePayload::Empty),
            ]
        );
    }

    #[tokio::test]
    async fn test_panicking_tick_does_not_stop_loop() {
        let source = PanickingSource {
            calls: AtomicUsize::new(0),
        };
        let broadcaster = Arc::new(ChannelBroadcaster::new("/arbitrage", Arc::new(source)));
        let agg = AggregationLoop::new(broadcaster.clone(), Duration::from_millis(10));
        let shutdown = CancellationToken::new();
        let handle = agg.spawn(shutdown.clone());

        // Second tick succeeds and records the (empty) ranking
        for _ in 0..100 {
            if broadcaster.topic_state().await.ticks >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(broadcaster.topic_state().await.ticks >= 1);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
