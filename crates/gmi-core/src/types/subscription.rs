//! Exchange subscriptions: one (market, channel) pair per stream task.

use serde::{Deserialize, Serialize};

/// Subscription topic on the exchange feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Order-book snapshots and updates (`level2`).
    OrderBook,
    /// Last trade / best quote updates (`ticker`).
    Ticker,
}

impl Channel {
    /// Every channel the indexer follows for a market, in start order.
    pub const ALL: [Channel; 2] = [Channel::OrderBook, Channel::Ticker];

    /// Channel name used in the subscribe frame.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::OrderBook => "level2",
            Self::Ticker => "ticker",
        }
    }

    /// Document-type label attached to index operations from this channel.
    pub fn doc_type(self) -> &'static str {
        match self {
            Self::OrderBook => "snap-shot",
            Self::Ticker => "ticker",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// One market on one channel. Immutable for the lifetime of a stream task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub market: String,
    pub channel: Channel,
}

impl Subscription {
    pub fn new(market: impl Into<String>, channel: Channel) -> Self {
        Self { market: market.into(), channel }
    }

    /// All subscriptions for a list of markets, channel-major per market.
    pub fn for_markets(markets: &[String]) -> Vec<Subscription> {
        markets
            .iter()
            .flat_map(|m| Channel::ALL.into_iter().map(move |c| Subscription::new(m.clone(), c)))
            .collect()
    }

    /// Build the single subscribe control frame for this subscription.
    ///
    /// ```text
    /// {"type":"subscribe","channels":[{"name":"ticker","product_ids":["BTC-USD"]}]}
    /// ```
    pub fn subscribe_message(&self) -> String {
        serde_json::json!({
            "type": "subscribe",
            "channels": [{
                "name": self.channel.wire_name(),
                "product_ids": [self.market],
            }]
        })
        .to_string()
    }

    /// Short label used in log lines (e.g. `BTC-USD/ticker`).
    pub fn label(&self) -> String {
        format!("{}/{}", self.market, self.channel)
    }
}

impl std::fmt::Display for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.market, self.channel)
    }
}
