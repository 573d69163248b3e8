//! Elasticsearch `_bulk` wire format.
//!
//! Request body is NDJSON, two lines per operation:
//!
//! ```text
//! {"index":{"_index":"gdax","_type":"ticker"}}
//! {"type":"ticker","time":"2017-09-02T17:05:49.250Z","product_id":"BTC-USD",...}
//! ```
//!
//! The response carries one item per operation, in request order; an item
//! counts as succeeded when its `status` is 2xx and it has no `error`.

use gmi_core::{FlushResult, IndexOperation};

/// Encode a batch as a `_bulk` NDJSON body (trailing newline included).
///
/// `mapping_types` controls whether `_type` is written into action lines.
pub fn encode_bulk_body(ops: &[IndexOperation], mapping_types: bool) -> Result<String, serde_json::Error> {
    let mut body = String::with_capacity(ops.len() * 256);
    for op in ops {
        let action = if mapping_types {
            serde_json::json!({ "index": { "_index": op.index, "_type": op.doc_type } })
        } else {
            serde_json::json!({ "index": { "_index": op.index } })
        };
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&serde_json::to_string(&op.body)?);
        body.push('\n');
    }
    Ok(body)
}

/// Count succeeded / failed items in a `_bulk` response for `sent` operations.
///
/// Items missing from the response are counted as failed.
pub fn parse_bulk_response(resp: &serde_json::Value, sent: usize) -> FlushResult {
    let Some(items) = resp.get("items").and_then(|v| v.as_array()) else {
        return if resp.get("errors").and_then(|v| v.as_bool()) == Some(false) {
            FlushResult { succeeded: sent, failed: 0 }
        } else {
            FlushResult::all_failed(sent)
        };
    };

    let succeeded = items.iter().take(sent).filter(|item| item_succeeded(item)).count();
    FlushResult { succeeded, failed: sent - succeeded }
}

fn item_succeeded(item: &serde_json::Value) -> bool {
    // Each item is `{"<action>": {...}}` with exactly one key.
    let Some(result) = item.as_object().and_then(|o| o.values().next()) else {
        return false;
    };
    let status = result.get("status").and_then(|s| s.as_u64()).unwrap_or(0);
    (200..300).contains(&status) && result.get("error").is_none()
}

#[cfg(test)]
mod tests {
    use gmi_core::{Channel, MessageEnvelope};

    use super::*;

    fn op(channel: Channel) -> IndexOperation {
        let env = MessageEnvelope::from_json(
            r#"{"type":"ticker","time":"2017-09-02T17:05:49.25Z","product_id":"BTC-USD","price":"4388.01"}"#,
        )
        .unwrap();
        IndexOperation::new("gdax", channel, env)
    }

    #[test]
    fn body_has_action_and_document_lines() {
        let body = encode_bulk_body(&[op(Channel::Ticker), op(Channel::OrderBook)], true).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(body.ends_with('\n'));

        let action: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["index"]["_index"], "gdax");
        assert_eq!(action["index"]["_type"], "ticker");
        let doc: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(doc["product_id"], "BTC-USD");
        assert_eq!(doc["price"], "4388.01");

        let action: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(action["index"]["_type"], "snap-shot");
    }

    #[test]
    fn typeless_action_lines() {
        let body = encode_bulk_body(&[op(Channel::Ticker)], false).unwrap();
        let action: serde_json::Value = serde_json::from_str(body.lines().next().unwrap()).unwrap();
        assert!(action["index"].get("_type").is_none());
    }

    #[test]
    fn counts_item_statuses() {
        let resp = serde_json::json!({
            "took": 3,
            "errors": true,
            "items": [
                {"index": {"_index": "gdax", "status": 201}},
                {"index": {"_index": "gdax", "status": 400, "error": {"type": "mapper_parsing_exception"}}},
                {"index": {"_index": "gdax", "status": 200}}
            ]
        });
        assert_eq!(parse_bulk_response(&resp, 3), FlushResult { succeeded: 2, failed: 1 });
    }

    #[test]
    fn missing_items_count_as_failed() {
        let resp = serde_json::json!({"errors": false, "items": [{"index": {"status": 201}}]});
        assert_eq!(parse_bulk_response(&resp, 3), FlushResult { succeeded: 1, failed: 2 });

        let resp = serde_json::json!({"error": "boom"});
        assert_eq!(parse_bulk_response(&resp, 2), FlushResult::all_failed(2));
    }
}
