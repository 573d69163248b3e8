//! Message envelope: the decoded unit read off an exchange stream.
//!
//! The envelope keeps the type tag and timestamp as typed fields and carries
//! every other field of the frame verbatim, so the indexed document matches
//! what the exchange sent.
//!
//! # Validity
//!
//! Frames without a usable `time` (subscription acks, heartbeats without a
//! timestamp, errors) are control frames. [`MessageEnvelope::is_market_data`]
//! is `false` for them and they never reach the index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::GmiError;

/// Seconds from the Unix epoch back to `0001-01-01T00:00:00Z`.
const CALENDAR_ZERO_SECS: i64 = -62_135_596_800;

/// A decoded exchange frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Frame type tag (`ticker`, `snapshot`, `l2update`, `subscriptions`, ...).
    #[serde(rename = "type")]
    pub kind: String,

    /// Exchange timestamp, absent on control frames.
    #[serde(default, deserialize_with = "deserialize_time", skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,

    /// Remaining channel-specific payload fields.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl MessageEnvelope {
    /// Decode a text frame.
    pub fn from_json(text: &str) -> Result<Self, GmiError> {
        Ok(serde_json::from_str(text)?)
    }

    /// `true` when the envelope carries a non-zero exchange timestamp.
    pub fn is_market_data(&self) -> bool {
        match self.time {
            None => false,
            Some(t) => !is_zero_time(&t),
        }
    }

    /// `product_id` field, when present.
    pub fn product_id(&self) -> Option<&str> {
        self.fields.get("product_id").and_then(|v| v.as_str())
    }
}

fn is_zero_time(t: &DateTime<Utc>) -> bool {
    t.timestamp() == CALENDAR_ZERO_SECS && t.timestamp_subsec_nanos() == 0
}

/// Accepts a missing, `null`, or empty `time` as absent.
fn deserialize_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_frame_is_market_data() {
        let json = r#"{
            "type": "ticker",
            "trade_id": 20153558,
            "sequence": 3262786978,
            "time": "2017-09-02T17:05:49.250000Z",
            "product_id": "BTC-USD",
            "price": "4388.01000000",
            "side": "buy",
            "last_size": "0.03000000",
            "best_bid": "4388",
            "best_ask": "4388.01"
        }"#;
        let env = MessageEnvelope::from_json(json).unwrap();
        assert_eq!(env.kind, "ticker");
        assert!(env.is_market_data());
        assert_eq!(env.product_id(), Some("BTC-USD"));
        assert_eq!(env.fields["price"], "4388.01000000");
        assert_eq!(env.fields["sequence"], 3262786978u64);
    }

    #[test]
    fn subscription_ack_is_not_market_data() {
        let json = r#"{"type":"subscriptions","channels":[{"name":"ticker","product_ids":["BTC-USD"]}]}"#;
        let env = MessageEnvelope::from_json(json).unwrap();
        assert_eq!(env.kind, "subscriptions");
        assert!(env.time.is_none());
        assert!(!env.is_market_data());
    }

    #[test]
    fn zero_time_is_not_market_data() {
        let env = MessageEnvelope::from_json(r#"{"type":"ticker","time":"0001-01-01T00:00:00Z"}"#).unwrap();
        assert!(env.time.is_some());
        assert!(!env.is_market_data());
    }

    #[test]
    fn unix_epoch_is_a_real_timestamp() {
        let env = MessageEnvelope::from_json(r#"{"type":"ticker","time":"1970-01-01T00:00:00Z"}"#).unwrap();
        assert!(env.is_market_data());
        let env = MessageEnvelope::from_json(r#"{"type":"ticker","time":"0001-01-01T00:00:00.5Z"}"#).unwrap();
        assert!(env.is_market_data());
    }

    #[test]
    fn empty_and_null_time_are_absent() {
        let env = MessageEnvelope::from_json(r#"{"type":"heartbeat","time":""}"#).unwrap();
        assert!(!env.is_market_data());
        let env = MessageEnvelope::from_json(r#"{"type":"heartbeat","time":null}"#).unwrap();
        assert!(!env.is_market_data());
    }

    #[test]
    fn malformed_frames_are_parse_errors() {
        let frames = ["not json", r#"{"time":"2017-09-02T17:05:49Z"}"#, r#"{"type":"ticker","time":"yesterday"}"#];
        for frame in frames {
            assert!(matches!(MessageEnvelope::from_json(frame), Err(GmiError::Parse(_))), "{frame}");
        }
    }

    #[test]
    fn document_keeps_payload_fields() {
        let json = r#"{
            "type": "snapshot",
            "product_id": "ETH-USD",
            "time": "2017-09-02T17:05:49.25Z",
            "bids": [["10.0", "1.5"]],
            "asks": []
        }"#;
        let env = MessageEnvelope::from_json(json).unwrap();
        let doc = serde_json::to_value(&env).unwrap();
        assert_eq!(doc["type"], "snapshot");
        assert_eq!(doc["product_id"], "ETH-USD");
        assert_eq!(doc["bids"][0][1], "1.5");
        assert!(doc["time"].as_str().unwrap().starts_with("2017-09-02T17:05:49.25"));
    }
}
