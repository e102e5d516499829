//! Environment-variable configuration, loaded once at process start.
//!
//! Mirrors the upstream `core/config.py`: look for a `.env` file in the
//! working directory or an ancestor, then read each variable, raising on
//! anything required that is missing rather than silently defaulting it.

use onco_core::error::{Error, Result};
use std::time::Duration;

fn env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::Other(format!("Missing required env var: {name}")))
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Connection details and tuning knobs for the FHIR/FDA/AI clients.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub fhir_base: String,
    pub fhir_client_id: String,
    pub fhir_client_secret: String,
    pub fhir_token_url: Option<String>,
    pub hl7_base: String,
    pub fda_base: String,
    pub ai_base: String,
}

/// Stream names, consumer-group identity, and sizing for the broker.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub redis_url: String,
    pub raw_stream: String,
    pub norm_stream: String,
    pub dlq_stream: String,
    pub group: String,
    pub consumer: String,
    pub raw_maxlen: usize,
    pub norm_maxlen: usize,
    pub dlq_maxlen: usize,
    pub ingest_batch: usize,
    pub poll_interval: Duration,
    pub normalize_count: usize,
    pub normalize_block: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub clients: ClientSettings,
    pub streams: StreamSettings,
    pub log_level: String,
}

impl Settings {
    /// Load `.env` (best-effort — a missing file is not an error) then
    /// read every variable. Fails fast on the first missing required var.
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let clients = ClientSettings {
            fhir_base: env("FHIR_BASE")?,
            fhir_client_id: env("FHIR_CLIENT_ID")?,
            fhir_client_secret: env("FHIR_CLIENT_SECRET")?,
            fhir_token_url: std::env::var("FHIR_TOKEN_URL").ok(),
            hl7_base: env("HL7_BASE")?,
            fda_base: env("FDA_BASE")?,
            ai_base: env("AI_BASE")?,
        };

        let streams = StreamSettings {
            redis_url: env("REDIS_URL")?,
            raw_stream: env_or("HL7_RAW_STREAM", "hl7:raw"),
            norm_stream: env_or("HL7_NORM_STREAM", "hl7:norm"),
            dlq_stream: env_or("HL7_DLQ_STREAM", "hl7:dlq"),
            group: env_or("HL7_GROUP", "normgrp"),
            consumer: env_or("CONSUMER", "norm-1"),
            raw_maxlen: env_parse_or("HL7_STREAM_MAXLEN", 5000),
            norm_maxlen: env_parse_or("HL7_NORM_MAXLEN", 5000),
            dlq_maxlen: env_parse_or("HL7_DLQ_MAXLEN", 5000),
            ingest_batch: env_parse_or("HL7_INGEST_BATCH", 100),
            poll_interval: Duration::from_secs_f64(env_parse_or("HL7_POLL_INTERVAL", 0.5)),
            normalize_count: env_parse_or("HL7_NORMALIZE_COUNT", 10),
            normalize_block: Duration::from_millis(env_parse_or("HL7_NORMALIZE_BLOCK_MS", 5000)),
        };

        Ok(Settings {
            clients,
            streams,
            log_level: env_or("LOGLEVEL", "info"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_or_falls_back_on_missing_or_invalid() {
        std::env::remove_var("ONCO_TEST_NUMERIC");
        assert_eq!(env_parse_or::<usize>("ONCO_TEST_NUMERIC", 42), 42);
    }

    #[test]
    fn env_or_prefers_set_value() {
        std::env::set_var("ONCO_TEST_STRING", "custom");
        assert_eq!(env_or("ONCO_TEST_STRING", "default"), "custom");
        std::env::remove_var("ONCO_TEST_STRING");
    }
}
