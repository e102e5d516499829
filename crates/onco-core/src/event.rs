//! `EventCommon`: the canonical normalized lab/vital/pro event.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Origin of an `EventCommon`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Hl7,
    Fhir,
    Wearable,
}

/// Clinical category of an `EventCommon`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Lab,
    Vital,
    Pro,
}

/// Builder input for an `EventCommon`. Every field mirrors §3 of the design;
/// construction is fallible through [`EventCommonInput::validate`] rather
/// than through the public constructor, so a half-built event can never
/// reach `hl7:norm`.
#[derive(Debug, Clone, Default)]
pub struct EventCommonInput {
    pub patient_id: Option<String>,
    pub mrn: Option<String>,
    pub dob: Option<String>,
    pub source: Option<Source>,
    pub r#type: Option<EventType>,
    pub code: Option<String>,
    pub raw_code: Option<String>,
    pub value: Option<String>,
    pub unit: Option<String>,
    pub ts: Option<i64>,
    pub ingest_ts: Option<i64>,
    pub normalized_ts: Option<i64>,
    pub idempotency_key: Option<String>,
    pub hl7_version: Option<String>,
}

/// The canonical normalized event that is the unit of work on `hl7:norm`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCommon {
    pub schema_version: String,

    pub patient_id: Option<String>,
    pub mrn: Option<String>,
    pub dob: Option<String>,

    pub source: Source,
    pub r#type: EventType,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_code: Option<String>,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    pub ts: i64,
    pub ingest_ts: i64,
    pub normalized_ts: i64,

    pub idempotency_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hl7_version: Option<String>,
}

impl EventCommonInput {
    /// Apply the invariants from §3 and produce a validated `EventCommon`,
    /// or a single tagged [`Error`]. The validator is total: every input
    /// yields either `Ok` or exactly one tagged error.
    pub fn validate(self) -> Result<EventCommon> {
        let has_patient_id = self.patient_id.as_deref().is_some_and(|s| !s.is_empty());
        let has_mrn_dob = self.mrn.as_deref().is_some_and(|s| !s.is_empty())
            && self.dob.as_deref().is_some_and(|s| !s.is_empty());
        if !has_patient_id && !has_mrn_dob {
            return Err(Error::identity_missing(
                "provide patient_id OR (mrn AND dob)",
            ));
        }

        let code = self.code.unwrap_or_default();
        if code.trim().is_empty() {
            return Err(Error::missing_code("code must be a non-empty string"));
        }

        let ts = self.ts.ok_or_else(|| Error::InvalidTs("ts is required".into()))?;

        let value = self.value.unwrap_or_default();
        let idempotency_key = self
            .idempotency_key
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::SchemaValidationFailed("idempotency_key missing".into()))?;

        Ok(EventCommon {
            schema_version: "v1".to_string(),
            patient_id: self.patient_id,
            mrn: self.mrn,
            dob: self.dob,
            source: self.source.unwrap_or(Source::Hl7),
            r#type: self.r#type.unwrap_or(EventType::Lab),
            code,
            raw_code: self.raw_code,
            value,
            unit: self.unit,
            ts,
            ingest_ts: self.ingest_ts.unwrap_or(ts),
            normalized_ts: self.normalized_ts.unwrap_or(ts),
            idempotency_key,
            hl7_version: self.hl7_version,
        })
    }
}

impl EventCommon {
    /// Serialize to the JSON string stored in the `e` field on `hl7:norm`.
    pub fn to_norm_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Encoding(e.to_string()))
    }

    /// Deserialize an `e` field back into an `EventCommon`.
    pub fn from_norm_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> EventCommonInput {
        EventCommonInput {
            patient_id: Some("12345".into()),
            code: Some("718-7".into()),
            value: Some("12.3".into()),
            ts: Some(1_735_734_600_000),
            idempotency_key: Some("abc123".into()),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_patient_id_identity() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn accepts_mrn_and_dob_identity() {
        let input = EventCommonInput {
            patient_id: None,
            mrn: Some("MRN1".into()),
            dob: Some("19800101".into()),
            ..base()
        };
        assert!(input.validate().is_ok());
    }

    #[test]
    fn rejects_missing_identity() {
        let input = EventCommonInput {
            patient_id: None,
            mrn: None,
            dob: None,
            ..base()
        };
        let err = input.validate().unwrap_err();
        assert_eq!(err.tag(), "identity_missing");
    }

    #[test]
    fn rejects_empty_code() {
        let input = EventCommonInput {
            code: Some("".into()),
            ..base()
        };
        assert_eq!(input.validate().unwrap_err().tag(), "missing_code");
    }

    #[test]
    fn round_trips_through_json() {
        let evt = base().validate().unwrap();
        let json = evt.to_norm_json().unwrap();
        let back = EventCommon::from_norm_json(&json).unwrap();
        assert_eq!(evt, back);
    }
}
