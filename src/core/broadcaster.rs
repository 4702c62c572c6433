//! Channel broadcaster: subscriber registry, fan-out and join-time replay.
//!
//! One `ChannelBroadcaster` exists per logical channel. It owns the channel's
//! topic state (last list, last balance) and the subscriber registry, which is
//! the single source of truth for fan-out. Registry mutation and fan-out both
//! go through the same `RwLock`, so a broadcast never observes a torn set.
//!
//! Lock order is registry then topic state. `publish_*` releases the state
//! lock before broadcasting.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::ResultSource;
use crate::core::types::{
    BalancePayload, BalanceSnapshot, ChannelEvent, OpportunityRecord, OutboundEvent,
};

/// Identity of one connected subscriber.
pub type SubscriberId = Uuid;

/// Per-subscriber delivery failure. Never escapes `broadcast`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Outbound queue is full; this event is dropped for this subscriber only
    #[error("subscriber queue full, event dropped")]
    Lagged,

    /// Receiving side is gone (connection half-closed or ended)
    #[error("subscriber disconnected")]
    Disconnected,
}

/// One endpoint bound to a channel.
///
/// `deliver` must not block: it is called while the registry is locked.
pub trait Subscriber: Send + Sync {
    fn id(&self) -> SubscriberId;

    fn deliver(&self, event: OutboundEvent) -> Result<(), DeliveryError>;
}

/// Subscriber backed by a bounded mpsc queue drained by the connection task.
#[derive(Debug)]
pub struct ChannelSubscriber {
    id: SubscriberId,
    tx: mpsc::Sender<OutboundEvent>,
}

impl ChannelSubscriber {
    /// Create a subscriber and the receiver its connection task drains.
    pub fn new(buffer: usize) -> (Arc<Self>, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let subscriber = Arc::new(Self {
            id: Uuid::new_v4(),
            tx,
        });
        (subscriber, rx)
    }
}

impl Subscriber for ChannelSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn deliver(&self, event: OutboundEvent) -> Result<(), DeliveryError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Lagged,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Disconnected,
        })
    }
}

/// Read-only view of a channel, as served by the snapshot endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelTopicState {
    pub name: String,
    pub last_broadcast_list: Vec<OpportunityRecord>,
    pub last_balance: Option<BalanceSnapshot>,
    pub subscriber_count: usize,
    pub ticks: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct TopicData {
    last_list: Vec<OpportunityRecord>,
    last_balance: Option<BalanceSnapshot>,
    ticks: u64,
    last_tick_at: Option<DateTime<Utc>>,
}

/// Fan-out point for one named channel.
pub struct ChannelBroadcaster {
    name: String,
    source: Arc<dyn ResultSource>,
    subscribers: RwLock<HashMap<SubscriberId, Arc<dyn Subscriber>>>,
    state: RwLock<TopicData>,
}

impl ChannelBroadcaster {
    pub fn new(name: impl Into<String>, source: Arc<dyn ResultSource>) -> Self {
        Self {
            name: name.into(),
            source,
            subscribers: RwLock::new(HashMap::new()),
            state: RwLock::new(TopicData::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source shared with the aggregation loop of this channel.
    pub fn source(&self) -> Arc<dyn ResultSource> {
        Arc::clone(&self.source)
    }

    /// Register a new subscriber after replaying current state to it.
    ///
    /// Queries the balance exactly once and sends one `balances-update`
    /// (snapshot, `{}` or error marker) to this subscriber only, without
    /// waiting for the next tick. Once a tick has run, the last
    /// `top_20_data` list is replayed as well.
    pub async fn on_subscriber_join(&self, subscriber: Arc<dyn Subscriber>) {
        let id = subscriber.id();

        let balance = match self.source.latest_balance().await {
            Ok(latest) => BalancePayload::from_latest(latest),
            Err(e) => {
                warn!(
                    channel = %self.name,
                    subscriber = %id,
                    error = %e,
                    "Balance replay failed, sending error marker"
                );
                BalancePayload::error(e.to_string())
            }
        };
        self.deliver_to(subscriber.as_ref(), &ChannelEvent::BalancesUpdate(balance));

        // Registry write lock spans list read, replay and insert: a ranking
        // stored before the read is replayed, one stored after it is
        // broadcast to us once the lock is released
        let count = {
            let mut subscribers = self.subscribers.write().await;
            let last_list = {
                let state = self.state.read().await;
                (state.ticks > 0).then(|| state.last_list.clone())
            };
            if let Some(list) = last_list {
                self.deliver_to(subscriber.as_ref(), &ChannelEvent::TopList(list));
            }
            subscribers.insert(id, subscriber);
            subscribers.len()
        };

        info!(
            channel = %self.name,
            subscriber = %id,
            subscribers = count,
            "Subscriber joined"
        );
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub async fn on_subscriber_leave(&self, id: SubscriberId) -> bool {
        let (removed, count) = {
            let mut subscribers = self.subscribers.write().await;
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };

        if removed {
            info!(
                channel = %self.name,
                subscriber = %id,
                subscribers = count,
                "Subscriber left"
            );
        }
        removed
    }

    /// Deliver an event to every registered subscriber.
    ///
    /// Fire-and-forget per subscriber: failures are logged and skipped.
    /// Returns the number of successful deliveries.
    pub async fn broadcast(&self, event: &ChannelEvent) -> usize {
        let outbound = match OutboundEvent::encode(event) {
            Ok(outbound) => outbound,
            Err(e) => {
                warn!(channel = %self.name, event = %event.kind(), error = %e, "Failed to serialize event");
                return 0;
            }
        };

        let subscribers = self.subscribers.read().await;
        let mut delivered = 0;
        for (id, subscriber) in subscribers.iter() {
            match subscriber.deliver(outbound.clone()) {
                Ok(()) => delivered += 1,
                Err(DeliveryError::Lagged) => {
                    warn!(channel = %self.name, subscriber = %id, event = %outbound.kind, "Subscriber lagged, event dropped");
                }
                Err(DeliveryError::Disconnected) => {
                    debug!(channel = %self.name, subscriber = %id, event = %outbound.kind, "Subscriber gone, skipping");
                }
            }
        }
        delivered
    }

    /// Store a new ranking and emit it.
    ///
    /// Non-empty: one `spot-arb` per record in ranking order, then one
    /// `top_20_data` with the full list. Empty: the stored list is cleared and
    /// an explicit empty `top_20_data` is sent. Returns the number of records.
    pub async fn publish_ranking(&self, ranking: Vec<OpportunityRecord>) -> usize {
        {
            let mut state = self.state.write().await;
            state.last_list = ranking.clone();
            state.ticks += 1;
            state.last_tick_at = Some(Utc::now());
        }

        for record in &ranking {
            self.broadcast(&ChannelEvent::SpotArb(record.clone())).await;
        }

        let count = ranking.len();
        self.broadcast(&ChannelEvent::TopList(ranking)).await;
        count
    }

    /// Store the latest balance and emit it; `None` is sent as `{}`.
    pub async fn publish_balance(&self, latest: Option<BalanceSnapshot>) {
        let latest = latest.filter(|snapshot| !snapshot.is_empty());
        {
            let mut state = self.state.write().await;
            state.last_balance = latest.clone();
        }
        self.broadcast(&ChannelEvent::BalancesUpdate(BalancePayload::from_latest(latest)))
            .await;
    }

    pub async fn topic_state(&self) -> ChannelTopicState {
        let subscriber_count = self.subscriber_count().await;
        let state = self.state.read().await;
        ChannelTopicState {
            name: self.name.clone(),
            last_broadcast_list: state.last_list.clone(),
            last_balance: state.last_balance.clone(),
            subscriber_count,
            ticks: state.ticks,
            last_tick_at: state.last_tick_at,
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    fn deliver_to(&self, subscriber: &dyn Subscriber, event: &ChannelEvent) {
        let result = OutboundEvent::encode(event)
            .map_err(|e| e.to_string())
            .and_then(|outbound| subscriber.deliver(outbound).map_err(|e| e.to_string()));

        if let Err(e) = result {
            warn!(
                channel = %self.name,
                subscriber = %subscriber.id(),
                event = %event.kind(),
                error = %e,
                "Replay delivery failed"
            );
        }
    }
}
