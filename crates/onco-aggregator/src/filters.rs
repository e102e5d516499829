//! Subject-identity filtering applied to every FHIR bundle before it is
//! allowed to influence a response. Grounded on the upstream
//! `services/filters.py`: entries for a resource type we care about are
//! kept only when their subject reference matches one of the patient's
//! known identities; everything else passes through uncounted.

use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualityCounters {
    pub total: u32,
    pub kept: u32,
    pub wrong_subject: u32,
    pub cancelled: u32,
    pub missing_subject: u32,
}

impl QualityCounters {
    pub fn merge(&mut self, other: &QualityCounters) {
        self.total += other.total;
        self.kept += other.kept;
        self.wrong_subject += other.wrong_subject;
        self.cancelled += other.cancelled;
        self.missing_subject += other.missing_subject;
    }
}

const SUBJECT_CHECKED_TYPES: &[&str] = &["Observation", "MedicationRequest", "MedicationStatement"];

fn subject_reference(resource: &Value) -> Option<&str> {
    resource.get("subject").and_then(|s| s.get("reference")).and_then(Value::as_str)
}

/// Filter a searchset bundle's entries to only those whose subject is in
/// `ok_subjects`, dropping cancelled resources. Non-`entry` fields of the
/// bundle are preserved verbatim; resource types outside
/// [`SUBJECT_CHECKED_TYPES`] (e.g. an included `Medication`) pass through
/// without being counted.
pub fn filter_bundle_by_subject(bundle: &Value, ok_subjects: &HashSet<String>) -> (Value, QualityCounters) {
    let mut counters = QualityCounters::default();
    let mut kept_entries = Vec::new();

    for entry in bundle.get("entry").and_then(Value::as_array).into_iter().flatten() {
        let resource = entry.get("resource").cloned().unwrap_or(Value::Null);
        let resource_type = resource.get("resourceType").and_then(Value::as_str).unwrap_or("");

        if !SUBJECT_CHECKED_TYPES.contains(&resource_type) {
            kept_entries.push(entry.clone());
            continue;
        }

        counters.total += 1;

        let status = resource.get("status").and_then(Value::as_str).unwrap_or("").to_lowercase();
        if status == "cancelled" {
            counters.cancelled += 1;
            continue;
        }

        match subject_reference(&resource) {
            None => counters.missing_subject += 1,
            Some(r) if ok_subjects.contains(r) => {
                counters.kept += 1;
                kept_entries.push(entry.clone());
            }
            Some(_) => counters.wrong_subject += 1,
        }
    }

    let mut out = bundle.clone();
    out["entry"] = Value::Array(kept_entries);
    (out, counters)
}

/// Sum per-resource-type quality counters into one overall view, used for
/// the response's `data_quality.overall` field.
pub fn merge_quality(per_resource: &[QualityCounters]) -> QualityCounters {
    let mut overall = QualityCounters::default();
    for q in per_resource {
        overall.merge(q);
    }
    overall
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_matching_subject_drops_others() {
        let bundle = json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {"resourceType": "Observation", "status": "final", "subject": {"reference": "Patient/1"}}},
                {"resource": {"resourceType": "Observation", "status": "final", "subject": {"reference": "Patient/2"}}},
                {"resource": {"resourceType": "Observation", "status": "cancelled", "subject": {"reference": "Patient/1"}}},
                {"resource": {"resourceType": "Observation", "status": "final"}},
            ]
        });
        let mut ok = HashSet::new();
        ok.insert("Patient/1".to_string());

        let (filtered, q) = filter_bundle_by_subject(&bundle, &ok);
        assert_eq!(filtered["entry"].as_array().unwrap().len(), 1);
        assert_eq!(q.total, 4);
        assert_eq!(q.kept, 1);
        assert_eq!(q.wrong_subject, 1);
        assert_eq!(q.cancelled, 1);
        assert_eq!(q.missing_subject, 1);
    }

    #[test]
    fn passes_through_unrelated_resource_types() {
        let bundle = json!({"entry": [{"resource": {"resourceType": "Medication", "id": "med-1"}}]});
        let (filtered, q) = filter_bundle_by_subject(&bundle, &HashSet::new());
        assert_eq!(filtered["entry"].as_array().unwrap().len(), 1);
        assert_eq!(q.total, 0);
    }
}
