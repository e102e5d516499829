//! Wire types for the three broker streams (`hl7:raw`, `hl7:norm`, `hl7:dlq`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One entry on `hl7:raw`. Created by the ingestor, consumed by the
/// normalizer, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHl7Message {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl RawHl7Message {
    /// Flatten into the broker field map the way `XADD` expects it. Only
    /// non-empty optional fields are carried over, matching the ingestor's
    /// "preserve as strings" policy.
    pub fn to_fields(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        fields.insert("message".to_string(), self.message.clone());
        if let Some(id) = &self.id {
            fields.insert("id".to_string(), id.clone());
        }
        if let Some(source) = &self.source {
            fields.insert("source".to_string(), source.clone());
        }
        if let Some(ts) = &self.timestamp {
            fields.insert("timestamp".to_string(), ts.clone());
        }
        fields
    }
}

/// Reason a raw entry or an individual OBX was routed to `hl7:dlq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqReason {
    IdentityMissing,
    MissingCode,
    InvalidTs,
    SchemaValidationFailed,
    EncodingError,
    EmptyMessage,
    UnsupportedOrMixedVersion,
    MalformedHl7,
    MissingRequiredFields,
}

impl DlqReason {
    pub fn as_tag(&self) -> &'static str {
        match self {
            DlqReason::IdentityMissing => "identity_missing",
            DlqReason::MissingCode => "missing_code",
            DlqReason::InvalidTs => "invalid_ts",
            DlqReason::SchemaValidationFailed => "schema_validation_failed",
            DlqReason::EncodingError => "encoding_error",
            DlqReason::EmptyMessage => "empty_message",
            DlqReason::UnsupportedOrMixedVersion => "unsupported_or_mixed_version",
            DlqReason::MalformedHl7 => "malformed_hl7",
            DlqReason::MissingRequiredFields => "missing_required_fields",
        }
    }

    /// Map a stable error tag (see `onco_core::Error::tag`) back to a DLQ
    /// reason, defaulting to `malformed_hl7` for anything unrecognized.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "identity_missing" => DlqReason::IdentityMissing,
            "missing_code" => DlqReason::MissingCode,
            "invalid_ts" => DlqReason::InvalidTs,
            "schema_validation_failed" => DlqReason::SchemaValidationFailed,
            "encoding_error" => DlqReason::EncodingError,
            "empty_message" => DlqReason::EmptyMessage,
            "unsupported_or_mixed_version" => DlqReason::UnsupportedOrMixedVersion,
            "missing_required_fields" => DlqReason::MissingRequiredFields,
            _ => DlqReason::MalformedHl7,
        }
    }
}

/// One entry on `hl7:dlq`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    /// Original raw payload or JSON envelope, verbatim.
    pub m: String,
    pub reason: DlqReason,
    pub raw_id: String,
    pub source: String,
    pub err: String,
}

impl DlqEntry {
    pub fn to_fields(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        fields.insert("m".to_string(), self.m.clone());
        fields.insert("reason".to_string(), self.reason.as_tag().to_string());
        fields.insert("raw_id".to_string(), self.raw_id.clone());
        fields.insert("source".to_string(), self.source.clone());
        fields.insert("err".to_string(), self.err.clone());
        fields
    }
}
