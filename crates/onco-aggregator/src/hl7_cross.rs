//! Out-of-band HL7 cross-match: scan the most recent raw HL7 feed for
//! messages whose `PID-3` identifiers intersect the requesting patient's
//! known ids, and fold their `OBX` observations into the response
//! alongside the FHIR-sourced labs.
//!
//! Grounded on `main.py`'s `/patients/{id}/insights` cross-match loop, with
//! the numeric-value filter re-architected per [`crate::aggregate::is_number`]
//! instead of the upstream's near-no-op `isinstance` check.

use crate::aggregate::is_number;
use onco_core::identity::normalize_alnum_lower;
use serde_json::{json, Value};
use std::collections::HashSet;

const MAX_MESSAGES_SCANNED: usize = 100;
const MAX_OBS_KEPT: usize = 12;

/// `ok_ids` is the normalized union of the patient's id and every known
/// MRN; a message matches if any of its typed `PID-3` identifiers
/// normalizes to one of them.
pub fn cross_match_hl7_observations(raw_messages: &[String], ok_ids: &HashSet<String>) -> Vec<Value> {
    let mut kept = Vec::new();

    for raw in raw_messages.iter().take(MAX_MESSAGES_SCANNED) {
        if kept.len() >= MAX_OBS_KEPT {
            break;
        }
        let Ok(parsed) = onco_hl7::parse(raw) else { continue };

        let ids: Vec<String> = parsed
            .pid3_identifiers()
            .into_iter()
            .map(|id| normalize_alnum_lower(&id))
            .collect();
        if !ids.iter().any(|id| ok_ids.contains(id)) {
            continue;
        }

        for obx in parsed.obx_list() {
            if kept.len() >= MAX_OBS_KEPT {
                break;
            }
            let code_el = onco_hl7::obx_code(obx);
            let Some(value) = onco_hl7::obx_value(obx) else { continue };
            if !is_number(&value) {
                continue;
            }

            kept.push(json!({
                "code": code_el.code,
                "name": code_el.display,
                "value": value,
                "unit": onco_hl7::obx_unit(obx),
                "effective_dt": onco_hl7::obx_datetime(obx),
                "flag": onco_hl7::obx_flag(obx),
                "source": "HL7",
            }));
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    const MSG: &str = "MSH|^~\\&|LIS|HOSP|EMR|HOSP|202501011230||ORU^R01|1|P|2.3\rPID|1||12345^^^HOSP^MR||DOE^JOHN||19800101|M\rOBR|1||ABC|718-7^Hemoglobin^LN\rOBX|1|NM|718-7^Hemoglobin^LN||12.3|g/dL|13-17|L|||F|202501011230\r";

    #[test]
    fn matches_on_normalized_patient_id() {
        let mut ok = HashSet::new();
        ok.insert(normalize_alnum_lower("12345"));
        let kept = cross_match_hl7_observations(&[MSG.to_string()], &ok);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["value"], "12.3");
    }

    #[test]
    fn skips_messages_with_no_matching_identity() {
        let mut ok = HashSet::new();
        ok.insert(normalize_alnum_lower("99999"));
        let kept = cross_match_hl7_observations(&[MSG.to_string()], &ok);
        assert!(kept.is_empty());
    }
}
