//! Shaping helpers that turn filtered FHIR bundles and FDA fragments into
//! the response's `patient`, `structured_summary`, `drug_interactions`,
//! and `citations` fields, plus the context handed to the AI `analyze`
//! call. Grounded on the upstream `services/aggregate.py`.

use onco_clients::FdaQueryResult;
use serde_json::{json, Value};
use std::collections::HashSet;

const FDA_EVIDENCE_TRUNCATE: usize = 500;
const INTERACTION_TEXT_TRUNCATE: usize = 300;

/// Whether `value` parses as a number. Replaces the upstream's
/// `isinstance(value, (int, float, float.__class__))` check, which is
/// `float.__class__ == type` and therefore tests almost nothing — every
/// HL7 field is a string on the wire, so the original filter silently
/// passed through values it meant to exclude. Values here are always
/// strings, so this is the only form of the check that can do anything.
pub fn is_number(value: &str) -> bool {
    value.trim().parse::<f64>().is_ok()
}

fn unique_case_insensitive(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let key = item.to_lowercase();
        if seen.insert(key) {
            out.push(item);
        }
    }
    out
}

/// Pull human-readable drug names out of a `MedicationRequest` bundle,
/// resolving `medicationReference` against any included `Medication`
/// resources, deduped case-insensitively while preserving first-seen order.
pub fn extract_med_names(bundle: &Value) -> Vec<String> {
    let entries: Vec<&Value> = bundle.get("entry").and_then(Value::as_array).into_iter().flatten().collect();

    let mut by_id = std::collections::HashMap::new();
    for entry in &entries {
        let resource = entry.get("resource").cloned().unwrap_or(Value::Null);
        if resource.get("resourceType").and_then(Value::as_str) == Some("Medication") {
            if let Some(id) = resource.get("id").and_then(Value::as_str) {
                by_id.insert(id.to_string(), resource.clone());
            }
        }
    }

    let mut names = Vec::new();
    for entry in &entries {
        let resource = entry.get("resource").cloned().unwrap_or(Value::Null);
        if resource.get("resourceType").and_then(Value::as_str) != Some("MedicationRequest") {
            continue;
        }

        if let Some(name) = resource
            .get("medicationCodeableConcept")
            .and_then(|c| c.get("text").or_else(|| c.get("coding").and_then(|c| c.get(0)).and_then(|c| c.get("display"))))
            .and_then(Value::as_str)
        {
            names.push(name.to_string());
            continue;
        }

        if let Some(reference) = resource
            .get("medicationReference")
            .and_then(|r| r.get("reference"))
            .and_then(Value::as_str)
        {
            let id = reference.strip_prefix("Medication/").unwrap_or(reference);
            if let Some(med) = by_id.get(id) {
                if let Some(name) = med
                    .get("code")
                    .and_then(|c| c.get("text").or_else(|| c.get("coding").and_then(|c| c.get(0)).and_then(|c| c.get("display"))))
                    .and_then(Value::as_str)
                {
                    names.push(name.to_string());
                }
            }
        }
    }

    unique_case_insensitive(names)
}

/// Normalize a filtered `Observation` bundle into simple lab dicts.
pub fn fhir_observations(bundle: &Value) -> Vec<Value> {
    bundle
        .get("entry")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let resource = entry.get("resource")?;
            if resource.get("resourceType").and_then(Value::as_str) != Some("Observation") {
                return None;
            }
            let code = resource
                .get("code")
                .and_then(|c| c.get("coding").and_then(|c| c.get(0)).and_then(|c| c.get("code")))
                .and_then(Value::as_str);
            let name = resource
                .get("code")
                .and_then(|c| c.get("text").or_else(|| c.get("coding").and_then(|c| c.get(0)).and_then(|c| c.get("display"))))
                .and_then(Value::as_str);
            let value = resource.get("valueQuantity").and_then(|v| v.get("value"));
            let unit = resource.get("valueQuantity").and_then(|v| v.get("unit")).and_then(Value::as_str);
            let effective_dt = resource.get("effectiveDateTime").and_then(Value::as_str);
            let flag = resource
                .get("interpretation")
                .and_then(|i| i.get(0))
                .and_then(|i| i.get("coding").and_then(|c| c.get(0)).and_then(|c| c.get("code")))
                .and_then(Value::as_str);

            Some(json!({
                "code": code,
                "name": name,
                "value": value,
                "unit": unit,
                "effective_dt": effective_dt,
                "flag": flag,
                "source": "FHIR",
            }))
        })
        .collect()
}

pub fn min_patient(patient: &Value) -> Value {
    let name = patient
        .get("name")
        .and_then(Value::as_array)
        .and_then(|names| names.first())
        .map(|n| {
            n.get("text")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| {
                    let given = n
                        .get("given")
                        .and_then(Value::as_array)
                        .and_then(|g| g.first())
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    let family = n.get("family").and_then(Value::as_str).unwrap_or("");
                    format!("{given} {family}").trim().to_string()
                })
        });

    json!({
        "id": patient.get("id"),
        "name": name,
        "birth_date": patient.get("birthDate"),
        "gender": patient.get("gender"),
    })
}

/// Merge FHIR labs with out-of-band HL7 labs, capped to `max_labs` combined,
/// alongside the distilled medication list.
pub fn summary(meds_bundle: &Value, obs_bundle: &Value, hl7_obs: &[Value], max_labs: usize) -> Value {
    let meds = extract_med_names(meds_bundle);
    let mut labs = fhir_observations(obs_bundle);
    labs.extend(hl7_obs.iter().cloned());
    labs.truncate(max_labs);

    json!({
        "medications": meds,
        "abnormal_labs": labs,
    })
}

/// Whether a JSON value is "truthy" in the Python sense the upstream's
/// `if key in payload and payload[key]:` check relies on: `None`, `false`,
/// `0`, and empty strings/arrays/objects are all falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// First two elements of a list, first two `(key, value)` pairs of an
/// object, or a single truncated string representation of anything else.
fn sample_of_2(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().take(2).cloned().collect()),
        Value::Object(map) => Value::Array(map.iter().take(2).map(|(k, v)| json!([k, v])).collect()),
        other => Value::Array(vec![Value::String(other.to_string().chars().take(INTERACTION_TEXT_TRUNCATE).collect())]),
    }
}

/// One item per FDA fragment, carrying the drug it was queried for and a
/// sample of whichever `interactions|warnings|contraindications|results`
/// keys its payload has populated at the top level.
pub fn distill_interactions(fragments: &[FdaQueryResult]) -> Vec<Value> {
    const KEYS: &[&str] = &["interactions", "warnings", "contraindications", "results"];

    fragments
        .iter()
        .map(|fragment| {
            let evidence: Vec<Value> = fragment
                .payload
                .iter()
                .flat_map(|payload| {
                    KEYS.iter().filter_map(move |key| {
                        let value = payload.get(*key)?;
                        is_truthy(value).then(|| json!({ *key: sample_of_2(value) }))
                    })
                })
                .collect();

            json!({
                "drug": fragment.drug,
                "source": fragment.endpoint,
                "evidence": evidence,
            })
        })
        .collect()
}

/// Citation order: a `DemoOverride` entry first when the medication list
/// came from `demo_meds` rather than FHIR, then FDA endpoints in drug
/// order, then one entry per surviving knowledge-search hit.
pub fn citations(fragments: &[FdaQueryResult], knowledge_hits: &[Value], demo_override: bool) -> Vec<Value> {
    let mut out = Vec::new();
    if demo_override {
        out.push(json!({"source": "DemoOverride", "title": "medications"}));
    }

    out.extend(
        fragments
            .iter()
            .filter_map(|f| f.endpoint.as_ref())
            .map(|endpoint| json!({"source": "OpenFDA", "endpoint": endpoint})),
    );

    out.extend(knowledge_hits.iter().map(|hit| {
        let title = hit
            .get("title")
            .and_then(Value::as_str)
            .or_else(|| hit.get("name").and_then(Value::as_str))
            .unwrap_or("doc");
        let url = hit
            .get("url")
            .and_then(Value::as_str)
            .or_else(|| hit.get("link").and_then(Value::as_str))
            .unwrap_or("");
        json!({"source": "KnowledgeSearch", "title": title, "url": url})
    }));

    out
}

fn truncate_json_string(value: &Value, max_len: usize) -> Value {
    match value {
        Value::String(s) => Value::String(s.chars().take(max_len).collect()),
        other => Value::String(other.to_string().chars().take(max_len).collect()),
    }
}

/// Assemble the context object handed to `AiClient::analyze`.
pub fn build_patient_context(
    patient: &Value,
    meds: &[String],
    labs: &[Value],
    fda_fragments: &[FdaQueryResult],
    rag_sources: &[Value],
) -> Value {
    let fda_evidence: Vec<Value> = fda_fragments
        .iter()
        .filter_map(|f| {
            let payload = f.payload.as_ref()?;
            Some(json!({
                "endpoint": f.endpoint,
                "evidence": truncate_json_string(payload, FDA_EVIDENCE_TRUNCATE),
            }))
        })
        .collect();

    json!({
        "patient": min_patient(patient),
        "medications": meds,
        "labs": labs.iter().take(20).collect::<Vec<_>>(),
        "fda_evidence": fda_evidence,
        "rag_sources": rag_sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn is_number_accepts_numeric_strings_only() {
        assert!(is_number("12.3"));
        assert!(is_number("  7 "));
        assert!(!is_number("L"));
        assert!(!is_number(""));
    }

    #[test]
    fn extract_med_names_dedupes_case_insensitively() {
        let bundle = json!({"entry": [
            {"resource": {"resourceType": "MedicationRequest", "medicationCodeableConcept": {"text": "Aspirin"}}},
            {"resource": {"resourceType": "MedicationRequest", "medicationCodeableConcept": {"text": "aspirin"}}},
            {"resource": {"resourceType": "MedicationRequest", "medicationCodeableConcept": {"text": "Ibuprofen"}}},
        ]});
        assert_eq!(extract_med_names(&bundle), vec!["Aspirin", "Ibuprofen"]);
    }

    #[test]
    fn extract_med_names_resolves_medication_reference() {
        let bundle = json!({"entry": [
            {"resource": {"resourceType": "Medication", "id": "med-1", "code": {"text": "Metformin"}}},
            {"resource": {"resourceType": "MedicationRequest", "medicationReference": {"reference": "Medication/med-1"}}},
        ]});
        assert_eq!(extract_med_names(&bundle), vec!["Metformin"]);
    }

    #[test]
    fn min_patient_builds_name_from_given_family_fallback() {
        let patient = json!({"id": "1", "name": [{"given": ["John"], "family": "Doe"}], "birthDate": "1980-01-01"});
        let out = min_patient(&patient);
        assert_eq!(out["name"], "John Doe");
    }

    #[test]
    fn summary_key_is_abnormal_labs() {
        let out = summary(&json!({"entry": []}), &json!({"entry": []}), &[], 10);
        assert!(out.get("abnormal_labs").is_some());
        assert!(out.get("labs").is_none());
    }

    #[test]
    fn distill_interactions_reads_top_level_payload_keys_per_fragment() {
        let fragments = vec![
            FdaQueryResult {
                drug: "Warfarin".to_string(),
                endpoint: Some("/drug/interactions.json".to_string()),
                payload: Some(json!({"interactions": ["avoid NSAIDs", "monitor INR"], "results": []})),
            },
            FdaQueryResult { drug: "Metformin".to_string(), endpoint: None, payload: None },
        ];
        let out = distill_interactions(&fragments);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["drug"], "Warfarin");
        assert_eq!(out[0]["source"], "/drug/interactions.json");
        assert_eq!(out[0]["evidence"], json!([{"interactions": ["avoid NSAIDs", "monitor INR"]}]));
        assert_eq!(out[1]["drug"], "Metformin");
        assert_eq!(out[1]["evidence"], json!([]));
    }

    #[test]
    fn citations_includes_one_entry_per_knowledge_hit() {
        let fragments = vec![FdaQueryResult {
            drug: "Warfarin".to_string(),
            endpoint: Some("/drug/interactions.json".to_string()),
            payload: None,
        }];
        let hits = vec![json!({"title": "Drug interaction review", "url": "https://example.org/a"}), json!({"name": "doc without title"})];
        let out = citations(&fragments, &hits, false);
        assert_eq!(out[0], json!({"source": "OpenFDA", "endpoint": "/drug/interactions.json"}));
        assert_eq!(out[1], json!({"source": "KnowledgeSearch", "title": "Drug interaction review", "url": "https://example.org/a"}));
        assert_eq!(out[2], json!({"source": "KnowledgeSearch", "title": "doc without title", "url": ""}));
    }
}
