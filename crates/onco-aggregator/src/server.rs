//! Axum HTTP surface: `/health`, `/patients`, `/patients/{id}/insights`.
//!
//! `/patients/{id}/insights` is the composition endpoint: one token fetch,
//! one patient read, then medications/observations/HL7-cross-match/FDA
//! lookups fan out concurrently and fan back in before the AI `analyze`
//! call and response assembly. Grounded on `main.py`'s handler of the
//! same name.

use crate::aggregate::{build_patient_context, citations, distill_interactions, extract_med_names, min_patient, summary};
use crate::error::AppError;
use crate::filters::{filter_bundle_by_subject, merge_quality, QualityCounters};
use crate::hl7_cross::cross_match_hl7_observations;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use futures::future::join_all;
use onco_clients::{AiResponse, FdaQueryResult};
use onco_core::identity::normalize_alnum_lower;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use tower_http::trace::TraceLayer;

const MAX_OBSERVATION_ITEMS: usize = 200;
const OBSERVATION_PAGE_LIMIT: u32 = 5;
const KNOWLEDGE_SEARCH_K: u32 = 5;
const KNOWLEDGE_MIN_SCORE: f64 = 0.40;
const KNOWLEDGE_ALLOWED_SOURCES: &[&str] = &["ASCO", "NCCN", "ESMO", "NIH", "NCI", "WHO", "PUBMED", "UPTODATE"];

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/patients", get(list_patients))
        .route("/patients/{patient_id}/insights", get(insights))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

#[derive(Deserialize)]
struct ListPatientsQuery {
    count: Option<u32>,
}

async fn list_patients(State(state): State<AppState>, Query(q): Query<ListPatientsQuery>) -> Result<Json<Value>, AppError> {
    let token = state
        .fhir
        .get_token(false)
        .await
        .map_err(|e| AppError::TokenUnavailable(e.to_string()))?;
    let bundle = state.fhir.list_patients(q.count.unwrap_or(20), &token).await?;
    Ok(Json(bundle))
}

/// Every `MedicationRequest`/`Identifier` entry typed as a medical record
/// number, so the cross-match id set covers both the FHIR id and any MRNs
/// the patient resource carries.
fn mrns_from_patient(patient: &Value) -> Vec<String> {
    patient
        .get("identifier")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|identifier| {
            let type_text = identifier
                .get("type")
                .and_then(|t| t.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("");
            let system = identifier.get("system").and_then(Value::as_str).unwrap_or("");
            type_text.eq_ignore_ascii_case("MR") || system.to_lowercase().contains("mrn")
        })
        .filter_map(|identifier| identifier.get("value").and_then(Value::as_str).map(str::to_string))
        .collect()
}

fn filter_knowledge_hits(hits: Vec<onco_clients::KnowledgeHit>) -> Vec<Value> {
    hits.into_iter()
        .filter(|h| h.score.unwrap_or(0.0) >= KNOWLEDGE_MIN_SCORE)
        .filter(|h| {
            h.source
                .as_deref()
                .map(|s| KNOWLEDGE_ALLOWED_SOURCES.iter().any(|allowed| allowed.eq_ignore_ascii_case(s)))
                .unwrap_or(false)
        })
        .take(5)
        .map(|h| {
            let url = h
                .raw
                .get("url")
                .and_then(Value::as_str)
                .or_else(|| h.raw.get("link").and_then(Value::as_str))
                .unwrap_or("");
            json!({"title": h.title, "source": h.source, "score": h.score, "url": url})
        })
        .collect()
}

#[derive(Deserialize)]
struct InsightsQuery {
    strict: Option<bool>,
    max_fda: Option<usize>,
    max_labs: Option<usize>,
    demo_meds: Option<String>,
}

async fn insights(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
    Query(q): Query<InsightsQuery>,
) -> Result<Json<Value>, AppError> {
    let strict = q.strict.unwrap_or(true);
    let max_fda = q.max_fda.unwrap_or(3);
    let max_labs = q.max_labs.unwrap_or(10);

    let token = state
        .fhir
        .get_token(false)
        .await
        .map_err(|e| AppError::TokenUnavailable(e.to_string()))?;

    let patient = state
        .fhir
        .fetch_patient(&patient_id, &token)
        .await
        .map_err(|_| AppError::PatientNotFound(patient_id.clone()))?;

    let returned_id = patient.get("id").and_then(Value::as_str).unwrap_or("");
    if strict && returned_id != patient_id {
        return Err(AppError::IdentityMismatch);
    }

    let mut ok_subjects = HashSet::new();
    ok_subjects.insert(format!("Patient/{patient_id}"));

    let mut ok_ids = HashSet::new();
    ok_ids.insert(normalize_alnum_lower(&patient_id));
    let mrns_ok = mrns_from_patient(&patient);
    for mrn in &mrns_ok {
        ok_ids.insert(normalize_alnum_lower(mrn));
    }

    let mut unavailable = Vec::new();

    let (meds_result, obs_result, raw_hl7_result) = tokio::join!(
        state.fhir.fetch_medications(&patient_id, &token),
        state
            .fhir
            .fetch_observations(&patient_id, &token, MAX_OBSERVATION_ITEMS, OBSERVATION_PAGE_LIMIT),
        state.hl7_feed.get_hl7_messages(),
    );

    let meds_bundle = meds_result.unwrap_or_else(|_| {
        unavailable.push("medications".to_string());
        json!({"resourceType": "Bundle", "entry": []})
    });
    let obs_bundle = obs_result.unwrap_or_else(|_| {
        unavailable.push("observations".to_string());
        json!({"resourceType": "Bundle", "entry": []})
    });
    let raw_hl7: Vec<String> = raw_hl7_result
        .map(|messages| messages.into_iter().map(|m| m.message).collect())
        .unwrap_or_else(|_| {
            unavailable.push("hl7".to_string());
            Vec::new()
        });

    let (meds_filtered, meds_quality) = filter_bundle_by_subject(&meds_bundle, &ok_subjects);
    let (obs_filtered, obs_quality) = filter_bundle_by_subject(&obs_bundle, &ok_subjects);
    let hl7_obs = cross_match_hl7_observations(&raw_hl7, &ok_ids);

    let mut med_names = extract_med_names(&meds_filtered);
    let mut demo_override = false;
    if med_names.is_empty() {
        if let Some(csv) = &q.demo_meds {
            med_names = csv.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
            demo_override = !med_names.is_empty();
        }
    }

    let fda_fragments: Vec<FdaQueryResult> =
        join_all(med_names.iter().take(max_fda).map(|name| state.fda.query_openfda(name))).await;
    if fda_fragments.iter().all(|f| f.endpoint.is_none()) && !med_names.is_empty() {
        unavailable.push("FDA".to_string());
    }

    let structured_summary = summary(&meds_filtered, &obs_filtered, &hl7_obs, max_labs);
    let labs_for_rag: Vec<String> = structured_summary["abnormal_labs"]
        .as_array()
        .into_iter()
        .flatten()
        .take(2)
        .filter_map(|l| l.get("name").and_then(Value::as_str).map(str::to_string))
        .collect();
    let rag_query = format!(
        "oncology adherence and drug interactions; meds: {}; labs: {}",
        med_names.join(", "),
        labs_for_rag.join(", ")
    );

    let knowledge_hits = state
        .ai
        .knowledge_search(&rag_query, KNOWLEDGE_SEARCH_K)
        .await
        .map(filter_knowledge_hits)
        .unwrap_or_default();

    let context = build_patient_context(&patient, &med_names, structured_summary["abnormal_labs"].as_array().unwrap_or(&Vec::new()), &fda_fragments, &knowledge_hits);

    let ai_insights = match state.ai.analyze(&context, "adherence_and_interactions").await {
        Ok(response) => ai_response_to_json(response),
        Err(e) => json!({"status": "degraded", "reason": e.to_string()}),
    };

    let overall: QualityCounters = merge_quality(&[meds_quality.clone(), obs_quality.clone()]);
    let status = if unavailable.is_empty() && overall.wrong_subject == 0 {
        "ok"
    } else {
        "partial"
    };

    Ok(Json(json!({
        "patient": min_patient(&patient),
        "structured_summary": structured_summary,
        "drug_interactions": distill_interactions(&fda_fragments),
        "citations": citations(&fda_fragments, &knowledge_hits, demo_override),
        "ai_insights": ai_insights,
        "data_quality": {
            "by_resource": {
                "medications": quality_json(&meds_quality),
                "observations": quality_json(&obs_quality),
            },
            "overall": quality_json(&overall),
            "notes": ["subject-identity filtering applied to all FHIR resources", "HL7 cross-match limited to the most recent feed window"],
        },
        "unavailable_sources": unavailable,
        "status": status,
    })))
}

fn quality_json(q: &QualityCounters) -> Value {
    json!({
        "total": q.total,
        "kept": q.kept,
        "wrong_subject": q.wrong_subject,
        "cancelled": q.cancelled,
        "missing_subject": q.missing_subject,
    })
}

fn ai_response_to_json(response: AiResponse) -> Value {
    match response {
        AiResponse::Insights { key_findings, next_best_actions, patient_friendly_advice, risk_score } => json!({
            "key_findings": key_findings,
            "next_best_actions": next_best_actions,
            "patient_friendly_advice": patient_friendly_advice,
            "risk_score": risk_score,
        }),
        AiResponse::Summary(s) => json!({"summary": s}),
        AiResponse::Bullets(items) => json!({"bullets": items}),
        AiResponse::Raw(v) => v,
        AiResponse::Empty => json!({"status": "ok"}),
    }
}

/// Liveness check axum wires before the router is constructed; kept here
/// so a handler-level smoke test doesn't need a live upstream.
pub async fn health_status() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mrns_from_patient_reads_type_text_and_system() {
        let patient = json!({"identifier": [
            {"type": {"text": "MR"}, "value": "998877"},
            {"system": "urn:oid:mrn", "value": "12345"},
            {"system": "urn:oid:ssn", "value": "555-00-1111"},
        ]});
        let mrns = mrns_from_patient(&patient);
        assert_eq!(mrns, vec!["998877".to_string(), "12345".to_string()]);
    }

    #[test]
    fn filter_knowledge_hits_drops_low_score_and_disallowed_source() {
        let hits = vec![
            onco_clients::KnowledgeHit { title: Some("a".into()), source: Some("ASCO".into()), score: Some(0.9), raw: Value::Null },
            onco_clients::KnowledgeHit { title: Some("b".into()), source: Some("ASCO".into()), score: Some(0.1), raw: Value::Null },
            onco_clients::KnowledgeHit { title: Some("c".into()), source: Some("RANDOM".into()), score: Some(0.9), raw: Value::Null },
        ];
        let kept = filter_knowledge_hits(hits);
        assert_eq!(kept.len(), 1);
    }
}
