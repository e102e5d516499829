//! HTTP source for inbound HL7 text: fetches `{HL7_BASE}/hl7/messages` and
//! coerces whatever shape it comes back in into a flat list of raw
//! messages.
//!
//! Grounded on the upstream `hl7_client.py`'s `_coerce_to_list`: the feed
//! endpoint has been seen to return a bare list, an envelope object, a
//! single message object, a JSON string, or newline-delimited JSON text.
//! Downstream parsing (both the normalizer's event construction and the
//! aggregator's cross-match read) goes through `onco_hl7::parse`, not a
//! second parser — this module's only job is getting raw text out.

use onco_core::stream_types::RawHl7Message;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const ENVELOPE_KEYS: &[&str] = &["messages", "items", "data", "results", "entries"];

pub struct Hl7FeedClient {
    http: Client,
    base: String,
}

impl Hl7FeedClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client builds with static config"),
            base: base.into(),
        }
    }

    /// Fetch the feed and coerce it to a flat list of raw messages. A JSON
    /// body is tried first; if the response isn't valid JSON at all, the
    /// raw text is coerced as JSON-lines / bare text instead.
    pub async fn get_hl7_messages(&self) -> onco_core::error::Result<Vec<RawHl7Message>> {
        let resp = self
            .http
            .get(format!("{}/hl7/messages", self.base))
            .send()
            .await
            .map_err(|e| onco_core::error::Error::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(onco_core::error::Error::Http4xx(format!("hl7 feed {}", resp.status())));
        }

        let text = resp.text().await.map_err(|e| onco_core::error::Error::Network(e.to_string()))?;
        Ok(coerce_to_list(&text))
    }
}

/// Coerce a feed payload into a flat list of raw messages, accepting:
/// a JSON array, a JSON object wrapping the list under one of
/// [`ENVELOPE_KEYS`], a single-message JSON object (has a `message` key),
/// a JSON-encoded string, or JSON-lines/plain text (one message per line).
pub fn coerce_to_list(payload: &str) -> Vec<RawHl7Message> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return coerce_value(value);
    }

    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match serde_json::from_str::<Value>(line) {
            Ok(value) => value_to_message(value),
            Err(_) => RawHl7Message {
                message: line.to_string(),
                id: None,
                source: None,
                timestamp: None,
            },
        })
        .collect()
}

fn coerce_value(value: Value) -> Vec<RawHl7Message> {
    match value {
        Value::Array(items) => items.into_iter().map(value_to_message).collect(),
        Value::Object(ref map) => {
            if map.contains_key("message") {
                return vec![value_to_message(value)];
            }
            for key in ENVELOPE_KEYS {
                if let Some(Value::Array(items)) = map.get(*key) {
                    return items.clone().into_iter().map(value_to_message).collect();
                }
            }
            Vec::new()
        }
        Value::String(s) => coerce_to_list(&s),
        _ => Vec::new(),
    }
}

fn value_to_message(value: Value) -> RawHl7Message {
    match value {
        Value::Object(ref map) => {
            let message = map
                .get("message")
                .or_else(|| map.get("raw_message"))
                .or_else(|| map.get("raw"))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default();
            RawHl7Message {
                message,
                id: map.get("id").and_then(Value::as_str).map(str::to_string),
                source: map.get("source").and_then(Value::as_str).map(str::to_string),
                timestamp: map.get("timestamp").and_then(Value::as_str).map(str::to_string),
            }
        }
        Value::String(s) => RawHl7Message { message: s, id: None, source: None, timestamp: None },
        other => RawHl7Message { message: other.to_string(), id: None, source: None, timestamp: None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_bare_array() {
        let payload = r#"[{"message": "MSH|1"}, {"message": "MSH|2"}]"#;
        let out = coerce_to_list(payload);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].message, "MSH|1");
    }

    #[test]
    fn coerces_envelope_object() {
        let payload = r#"{"messages": [{"message": "MSH|1"}]}"#;
        let out = coerce_to_list(payload);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn coerces_single_message_object() {
        let payload = r#"{"message": "MSH|1", "id": "abc"}"#;
        let out = coerce_to_list(payload);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id.as_deref(), Some("abc"));
    }

    #[test]
    fn coerces_json_lines_text() {
        let payload = "{\"message\": \"MSH|1\"}\n{\"message\": \"MSH|2\"}\n";
        let out = coerce_to_list(payload);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn coerces_plain_text_lines_with_no_json() {
        let payload = "MSH|1\rPID|1\rOBX|1\nMSH|2\rPID|1\rOBX|1";
        let out = coerce_to_list(payload);
        assert_eq!(out.len(), 2);
        assert!(out[0].message.starts_with("MSH|1"));
    }

    #[test]
    fn empty_payload_yields_empty_list() {
        assert!(coerce_to_list("").is_empty());
        assert!(coerce_to_list("   ").is_empty());
    }
}
