//! Consumes `hl7:raw` under a consumer group, turns each message into zero
//! or more [`onco_core::event::EventCommon`]s, and publishes the survivors
//! to `hl7:norm`. A message that fails to parse at all, or yields no
//! usable `OBX`, goes whole to `hl7:dlq`; an individual `OBX` that fails
//! validation is DLQ'd on its own while its siblings still publish.
//!
//! State machine: READ → EXTRACT_RAW → PARSE → EXTRACT_OBX → VALIDATE_EACH
//! → PUBLISH_ALL → ACK. The entry is only acked once every event derived
//! from it — published or DLQ'd — has been durably appended; a crash
//! before that point leaves it unacked and it is redelivered.

use onco_broker::{Broker, StreamEntry};
use onco_config::StreamSettings;
use onco_core::error::Result;
use onco_core::event::EventCommon;
use onco_core::stream_types::{DlqEntry, DlqReason};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fields tried, in order, to find the raw HL7 text on an `hl7:raw` entry.
const RAW_FIELD_PRIORITY: &[&str] = &["message", "m", "raw", "raw_message", "payload", "hl7"];

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Pull the raw HL7 text out of a raw entry's fields, trying
/// `RAW_FIELD_PRIORITY` in order. If the chosen field holds a JSON object
/// rather than plain text, unwrap its inner `message|raw_message|raw`
/// string rather than treating the envelope itself as the message.
fn extract_raw(fields: &HashMap<String, String>) -> String {
    let raw = RAW_FIELD_PRIORITY.iter().find_map(|key| fields.get(*key)).cloned().unwrap_or_default();

    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => ["message", "raw_message", "raw"]
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default(),
        _ => raw,
    }
}

fn event_fields(evt: &EventCommon) -> Result<HashMap<String, String>> {
    let mut fields = HashMap::new();
    fields.insert("e".to_string(), evt.to_norm_json()?);
    fields.insert("idempotency_key".to_string(), evt.idempotency_key.clone());
    Ok(fields)
}

pub struct Normalizer {
    broker: Arc<dyn Broker>,
    settings: StreamSettings,
}

impl Normalizer {
    pub fn new(broker: Arc<dyn Broker>, settings: StreamSettings) -> Self {
        Self { broker, settings }
    }

    /// Idempotently create the consumer group on `hl7:raw`, starting from
    /// the beginning of the stream (`0`) and creating the stream itself if
    /// it does not yet exist.
    pub async fn ensure_group(&self) -> Result<()> {
        self.broker
            .create_group(&self.settings.raw_stream, &self.settings.group, "0", true)
            .await
    }

    /// Read up to `normalize_count` pending entries, blocking up to
    /// `normalize_block`, and process each to completion. Returns the
    /// number of raw entries consumed (not the number of events produced).
    pub async fn run_once(&self) -> Result<usize> {
        let entries = self
            .broker
            .read_group(
                &self.settings.raw_stream,
                &self.settings.group,
                &self.settings.consumer,
                self.settings.normalize_count,
                self.settings.normalize_block.as_millis() as u64,
            )
            .await?;

        for entry in &entries {
            self.process_entry(entry).await?;
        }
        Ok(entries.len())
    }

    async fn dlq_whole_message(&self, entry: &StreamEntry, raw: &str, source: &str, reason: DlqReason, err: String) -> Result<()> {
        let dlq = DlqEntry {
            m: raw.to_string(),
            reason,
            raw_id: entry.id.clone(),
            source: source.to_string(),
            err,
        };
        self.broker
            .append(&self.settings.dlq_stream, &dlq.to_fields(), self.settings.dlq_maxlen, true)
            .await?;
        Ok(())
    }

    async fn process_entry(&self, entry: &StreamEntry) -> Result<()> {
        let raw = extract_raw(&entry.fields);
        let source = entry.fields.get("source").cloned().unwrap_or_default();

        if raw.trim().is_empty() {
            self.dlq_whole_message(entry, &raw, &source, DlqReason::EmptyMessage, "empty_message".into())
                .await?;
            self.broker.ack(&self.settings.raw_stream, &self.settings.group, &entry.id).await?;
            return Ok(());
        }

        let parsed = match onco_hl7::parse(&raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(raw_id = %entry.id, error = %e, "HL7 parse failed, routing to DLQ");
                self.dlq_whole_message(entry, &raw, &source, DlqReason::from_tag(e.tag()), e.to_string())
                    .await?;
                self.broker.ack(&self.settings.raw_stream, &self.settings.group, &entry.id).await?;
                return Ok(());
            }
        };

        let inputs = onco_hl7::build_event_inputs(&parsed, &raw, now_ms());
        if inputs.is_empty() {
            self.dlq_whole_message(
                entry,
                &raw,
                &source,
                DlqReason::MissingRequiredFields,
                "missing_required_fields: OBX".into(),
            )
            .await?;
            self.broker.ack(&self.settings.raw_stream, &self.settings.group, &entry.id).await?;
            return Ok(());
        }

        for input in inputs {
            match input.validate() {
                Ok(evt) => {
                    let fields = event_fields(&evt)?;
                    self.broker
                        .append(&self.settings.norm_stream, &fields, self.settings.norm_maxlen, true)
                        .await?;
                }
                Err(e) => {
                    debug!(raw_id = %entry.id, error = %e, "OBX failed validation, routing to DLQ");
                    self.dlq_whole_message(entry, &raw, &source, DlqReason::from_tag(e.tag()), e.to_string())
                        .await?;
                }
            }
        }

        self.broker.ack(&self.settings.raw_stream, &self.settings.group, &entry.id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onco_core::event::{EventCommonInput, Source, EventType};

    #[test]
    fn event_fields_carries_idempotency_key() {
        let evt = EventCommonInput {
            patient_id: Some("1".into()),
            code: Some("718-7".into()),
            value: Some("1.0".into()),
            ts: Some(0),
            idempotency_key: Some("key-1".into()),
            source: Some(Source::Hl7),
            r#type: Some(EventType::Lab),
            ..Default::default()
        }
        .validate()
        .unwrap();

        let fields = event_fields(&evt).unwrap();
        assert_eq!(fields.get("idempotency_key"), Some(&"key-1".to_string()));
        assert!(fields.get("e").unwrap().contains("718-7"));
    }

    #[test]
    fn extract_raw_prefers_message_over_later_fields() {
        let mut fields = HashMap::new();
        fields.insert("message".to_string(), "MSH|1".to_string());
        fields.insert("raw_message".to_string(), "MSH|2".to_string());
        assert_eq!(extract_raw(&fields), "MSH|1");
    }

    #[test]
    fn extract_raw_falls_back_through_priority_order() {
        let mut fields = HashMap::new();
        fields.insert("payload".to_string(), "MSH|3".to_string());
        assert_eq!(extract_raw(&fields), "MSH|3");
    }

    #[test]
    fn extract_raw_unwraps_json_envelope() {
        let mut fields = HashMap::new();
        fields.insert("raw".to_string(), r#"{"raw_message": "MSH|4"}"#.to_string());
        assert_eq!(extract_raw(&fields), "MSH|4");
    }

    #[test]
    fn extract_raw_is_empty_when_no_priority_field_present() {
        let mut fields = HashMap::new();
        fields.insert("source".to_string(), "demo".to_string());
        assert_eq!(extract_raw(&fields), "");
    }
}
