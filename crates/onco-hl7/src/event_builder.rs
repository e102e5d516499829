//! Turns a parsed HL7 message into one [`EventCommonInput`] per `OBX`.
//!
//! Grounded on the upstream normalizer's `_to_event_common_from_obx`, with
//! one deliberate fix: the original reads `patient_id` and `mrn` from the
//! same PID-3 repetition, which makes `mrn` unreachable whenever a
//! `patient_id` is present. Here `patient_id` is taken from the PID-3
//! repetition typed `MR`, and `mrn` from the first repetition typed
//! anything else, so both can be populated from a single message.

use crate::message::ParsedMessage;
use crate::timestamp::hl7_ts_to_epoch_ms;
use onco_core::event::{EventCommonInput, EventType, Source};
use sha2::{Digest, Sha256};

/// Stable idempotency key: MSH-10 when present, else a content hash of the
/// raw message. The hash must be stable across process restarts (a
/// `HashMap`-style in-memory identity hash would not survive redelivery),
/// so this is a SHA-256 digest of the raw bytes, not a language hash.
fn idempotency_key(msh_control_id: Option<&str>, raw: &str) -> String {
    match msh_control_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            let digest = Sha256::digest(raw.as_bytes());
            format!("{digest:x}")
        }
    }
}

/// Split a message's typed PID-3 identifiers into `(patient_id, mrn)`:
/// the first repetition typed `MR` (case-insensitive) becomes `patient_id`;
/// the first repetition of any other type becomes `mrn`. A message with a
/// single untyped identifier still yields a usable `patient_id`.
fn split_patient_identity(parsed: &ParsedMessage) -> (Option<String>, Option<String>) {
    let typed = parsed.pid3_identifiers_typed();

    let patient_id = typed
        .iter()
        .find(|(_, t)| t.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("MR")))
        .map(|(id, _)| id.clone())
        .or_else(|| typed.first().map(|(id, _)| id.clone()));

    let mrn = typed
        .iter()
        .find(|(id, t)| {
            Some(id.as_str()) != patient_id.as_deref()
                && !t.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("MR"))
        })
        .map(|(id, _)| id.clone());

    (patient_id, mrn)
}

/// Build one [`EventCommonInput`] per `OBX` segment in `parsed`. Returns an
/// empty vector when there are no `OBX` segments at all (the caller treats
/// that as `missing_required_fields: OBX`, not an error here — this
/// function only shapes data, it never classifies failure).
pub fn build_event_inputs(
    parsed: &ParsedMessage,
    raw: &str,
    now_ms: i64,
) -> Vec<EventCommonInput> {
    let (patient_id, mrn) = split_patient_identity(parsed);
    let dob = parsed.pid_dob();
    let msh_control_id = parsed.msh_control_id();
    let msh_timestamp = parsed.msh_timestamp();
    let hl7_version = parsed.msh_version();
    let idem = idempotency_key(msh_control_id.as_deref(), raw);

    parsed
        .obx_list()
        .iter()
        .map(|obx| {
            let code_el = crate::accessors::obx_code(obx);
            let code = code_el.code.clone();
            let raw_code = code.clone();
            let alias = code.as_deref().map(|c| c.to_lowercase());

            let ts_str = crate::accessors::obx_datetime(obx).or_else(|| msh_timestamp.clone());
            let ts = hl7_ts_to_epoch_ms(ts_str.as_deref(), now_ms);

            EventCommonInput {
                patient_id: patient_id.clone(),
                mrn: mrn.clone(),
                dob: dob.clone(),
                source: Some(Source::Hl7),
                r#type: Some(EventType::Lab),
                code: alias.or(code),
                raw_code,
                value: crate::accessors::obx_value(obx),
                unit: crate::accessors::obx_unit(obx),
                ts: Some(ts),
                ingest_ts: Some(now_ms),
                normalized_ts: Some(now_ms),
                idempotency_key: Some(idem.clone()),
                hl7_version: hl7_version.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::parse;

    const SAMPLE: &str = "MSH|^~\\&|LIS|HOSP|EMR|HOSP|202501011230||ORU^R01|1|P|2.3\rPID|1||12345^^^HOSP^MR||DOE^JOHN||19800101|M\rOBR|1||ABC|718-7^Hemoglobin^LN\rOBX|1|NM|718-7^Hemoglobin^LN||12.3|g/dL|13-17|L|||F|202501011230\r";

    #[test]
    fn builds_one_event_per_obx() {
        let parsed = parse(SAMPLE).unwrap();
        let inputs = build_event_inputs(&parsed, SAMPLE, 0);
        assert_eq!(inputs.len(), 1);
        let evt = inputs[0].clone().validate().unwrap();
        assert_eq!(evt.code, "718-7");
        assert_eq!(evt.value, "12.3");
        assert_eq!(evt.unit.as_deref(), Some("g/dL"));
        assert_eq!(evt.patient_id.as_deref(), Some("12345"));
        assert_eq!(evt.ts, 1_735_734_600_000);
        assert_eq!(evt.idempotency_key, "1");
    }

    #[test]
    fn idempotency_key_falls_back_to_content_hash_when_no_control_id() {
        let raw = "MSH|^~\\&|LIS|HOSP|EMR|HOSP|202501011230||ORU^R01||P|2.3\rPID|1||12345^^^HOSP^MR\rOBX|1|NM|718-7^Hemoglobin^LN||12.3\r";
        let parsed = parse(raw).unwrap();
        let inputs = build_event_inputs(&parsed, raw, 0);
        let key = inputs[0].idempotency_key.clone().unwrap();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));

        // Stable: rebuilding from the same raw bytes yields the same key.
        let again = build_event_inputs(&parsed, raw, 999);
        assert_eq!(again[0].idempotency_key, Some(key));
    }

    #[test]
    fn patient_id_and_mrn_come_from_distinct_identifier_types() {
        let raw = "MSH|^~\\&|LIS|HOSP|EMR|HOSP|202501011230||ORU^R01|2|P|2.3\rPID|1||P788166^^^MR~998877^^^SSN||19800101\rOBX|1|NM|718-7^Hemoglobin^LN||12.3\r";
        let parsed = parse(raw).unwrap();
        let inputs = build_event_inputs(&parsed, raw, 0);
        let evt = inputs[0].clone().validate().unwrap();
        assert_eq!(evt.patient_id.as_deref(), Some("P788166"));
        assert_eq!(evt.mrn.as_deref(), Some("998877"));
    }

    #[test]
    fn missing_obx_yields_no_events() {
        let raw = "MSH|^~\\&|LIS|HOSP|EMR|HOSP|202501011230||ORU^R01|3|P|2.3\rPID|1||12345^^^HOSP^MR\r";
        let parsed = parse(raw).unwrap();
        assert!(build_event_inputs(&parsed, raw, 0).is_empty());
    }
}
