//! Core data types for the opportunity feed and balance broadcasts.
//!
//! Everything here crosses the wire as JSON, so the serde layout *is* the
//! contract with dashboard clients.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Opportunity Record (one ranked arbitrage candidate)
// =============================================================================

/// Price quoted on one side of an opportunity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SideQuote {
    /// Exchange identifier (e.g. "binance", "kucoin")
    #[serde(alias = "exchangeName")]
    pub exchange: String,
    pub price: f64,
}

/// Fee schedule attached to an opportunity. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FeeInfo {
    pub buy_maker: Option<f64>,
    pub buy_taker: Option<f64>,
    pub sell_maker: Option<f64>,
    pub sell_taker: Option<f64>,
    pub withdrawal_network: Option<String>,
    pub withdrawal_fee: Option<f64>,
}

/// One ranked arbitrage candidate at a point in time.
///
/// A ranking is an immutable snapshot: records are produced fresh by the
/// source on every tick and never merged across ticks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityRecord {
    /// Stable identity; derived from `symbol` when the source omits it
    #[serde(default)]
    pub id: String,
    /// Market symbol (e.g. "BTC/USDT")
    pub symbol: String,
    /// Signed profit in percent. `None` when absent or unparseable.
    #[serde(default, deserialize_with = "lenient_percentage")]
    pub profit_percentage: Option<f64>,
    /// Where to buy
    pub buy_side: SideQuote,
    /// Where to sell
    pub sell_side: SideQuote,
    #[serde(default)]
    pub fee_info: Option<FeeInfo>,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl OpportunityRecord {
    /// Build a record observed now.
    ///
    /// A non-finite `profit_percentage` is stored as absent.
    pub fn new(
        symbol: impl Into<String>,
        profit_percentage: Option<f64>,
        buy_side: SideQuote,
        sell_side: SideQuote,
    ) -> Self {
        Self {
            id: String::new(),
            symbol: symbol.into(),
            profit_percentage,
            buy_side,
            sell_side,
            fee_info: None,
            observed_at: Utc::now(),
        }
        .normalize()
    }

    /// Fill a blank identity from the symbol and drop non-finite profits.
    pub fn normalize(mut self) -> Self {
        if self.id.trim().is_empty() {
            self.id = self.symbol.clone();
        }
        self.profit_percentage = self.profit_percentage.filter(|p| p.is_finite());
        self
    }

    pub fn with_fee_info(mut self, fee_info: FeeInfo) -> Self {
        self.fee_info = Some(fee_info);
        self
    }
}

/// Accept numbers, numeric strings (optionally with a trailing `%`) or null.
///
/// Anything else, and any non-finite result, becomes `None` rather than 0.
fn lenient_percentage<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|p| p.is_finite()))
}

// =============================================================================
// Balance Snapshot
// =============================================================================

/// Opaque holdings document, always a JSON object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct BalanceSnapshot(Map<String, Value>);

impl BalanceSnapshot {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value; only objects are snapshots.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Payload of a `balances-update` event.
///
/// Serializes to exactly one of: the snapshot object, `{}`, or
/// `{"error": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub enum BalancePayload {
    Snapshot(BalanceSnapshot),
    Empty,
    Error { error: String },
}

impl BalancePayload {
    /// Map a successful balance query to its payload.
    pub fn from_latest(latest: Option<BalanceSnapshot>) -> Self {
        match latest {
            Some(snapshot) if !snapshot.is_empty() => BalancePayload::Snapshot(snapshot),
            _ => BalancePayload::Empty,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        BalancePayload::Error {
            error: message.into(),
        }
    }
}

impl From<Map<String, Value>> for BalancePayload {
    fn from(fields: Map<String, Value>) -> Self {
        if fields.is_empty() {
            return BalancePayload::Empty;
        }
        if fields.len() == 1 {
            if let Some(Value::String(error)) = fields.get("error") {
                return BalancePayload::Error {
                    error: error.clone(),
                };
            }
        }
        BalancePayload::Snapshot(BalanceSnapshot(fields))
    }
}

impl From<BalancePayload> for Map<String, Value> {
    fn from(payload: BalancePayload) -> Self {
        match payload {
            BalancePayload::Snapshot(snapshot) => snapshot.0,
            BalancePayload::Empty => Map::new(),
            BalancePayload::Error { error } => {
                let mut fields = Map::new();
                fields.insert("error".to_string(), Value::String(error));
                fields
            }
        }
    }
}

// =============================================================================
// Channel Events (wire envelope)
// =============================================================================

/// Events broadcast on a channel: `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ChannelEvent {
    /// One record, emitted once per record per tick in ranking order
    #[serde(rename = "spot-arb")]
    SpotArb(OpportunityRecord),
    /// Full ranked list, possibly empty, emitted once per tick
    #[serde(rename = "top_20_data")]
    TopList(Vec<OpportunityRecord>),
    /// Balance snapshot, `{}` or error marker
    #[serde(rename = "balances-update")]
    BalancesUpdate(BalancePayload),
}

impl ChannelEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChannelEvent::SpotArb(_) => EventKind::SpotArb,
            ChannelEvent::TopList(_) => EventKind::TopList,
            ChannelEvent::BalancesUpdate(_) => EventKind::BalancesUpdate,
        }
    }
}

/// Event name without payload, for logging and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SpotArb,
    TopList,
    BalancesUpdate,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SpotArb => "spot-arb",
            EventKind::TopList => "top_20_data",
            EventKind::BalancesUpdate => "balances-update",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event serialized once and shared by every subscriber it is fanned out to.
#[derive(Debug, Clone)]
pub struct OutboundEvent {
    pub kind: EventKind,
    pub json: Arc<str>,
}

impl OutboundEvent {
    pub fn encode(event: &ChannelEvent) -> serde_json::Result<Self> {
        Ok(Self {
            kind: event.kind(),
            json: Arc::from(serde_json::to_string(event)?),
        })
    }

    pub fn decode(&self) -> serde_json::Result<ChannelEvent> {
        serde_json::from_str(&self.json)
    }
}

// =============================================================================
// Utility
// =============================================================================

/// Get current time in milliseconds since epoch.
#[inline]
pub fn current_time_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
