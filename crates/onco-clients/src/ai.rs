//! AI service client: knowledge search and insight analysis, both shape-
//! coerced because the upstream AI service's response shape is not
//! contractually fixed.
//!
//! `AIResponse` replaces the upstream `_coerce_ai_insights` dict-or-string-
//! or-list juggling with an explicit enum, per the redesign called for in
//! the design notes — callers match on a closed set of variants instead of
//! probing a `serde_json::Value` at every call site.

use onco_core::error::{Error, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// The shapes an AI `/ai/analyze` response can take, normalized from
/// whatever JSON the upstream service actually returned.
#[derive(Debug, Clone, PartialEq)]
pub enum AiResponse {
    /// A structured insight: the upstream returned an object carrying at
    /// least one recognized key.
    Insights {
        key_findings: Vec<String>,
        next_best_actions: Vec<String>,
        patient_friendly_advice: Option<String>,
        risk_score: Option<f64>,
    },
    /// The upstream returned a plain string; truncated to 1200 chars.
    Summary(String),
    /// The upstream returned a list with no recognized object shape.
    Bullets(Vec<String>),
    /// The upstream returned JSON of some other shape (number, unrecognized
    /// object); carried through verbatim rather than discarded.
    Raw(Value),
    /// The upstream returned nothing usable.
    Empty,
}

impl AiResponse {
    /// Coerce an arbitrary JSON value into one of the closed variants
    /// above, mirroring `_coerce_ai_insights`'s dict/str/list/else cases.
    pub fn from_untyped(value: Value) -> Self {
        match value {
            Value::Null => AiResponse::Empty,
            Value::Object(ref map) => {
                let has_recognized_key = ["key_findings", "next_best_actions", "patient_friendly_advice", "risk_score"]
                    .iter()
                    .any(|k| map.contains_key(*k));
                if has_recognized_key {
                    AiResponse::Insights {
                        key_findings: string_list(map.get("key_findings")),
                        next_best_actions: string_list(map.get("next_best_actions")),
                        patient_friendly_advice: map
                            .get("patient_friendly_advice")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        risk_score: map.get("risk_score").and_then(Value::as_f64),
                    }
                } else {
                    AiResponse::Raw(value)
                }
            }
            Value::String(s) => AiResponse::Summary(s.chars().take(1200).collect()),
            Value::Array(items) => {
                let bullets: Vec<String> = items
                    .iter()
                    .take(10)
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                    .collect();
                AiResponse::Bullets(bullets)
            }
            other => AiResponse::Raw(other),
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Flattened `/ai/knowledge-search` hit, normalized out of whichever of
/// `results|hits|items|data` the upstream wrapped its list in.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeHit {
    pub title: Option<String>,
    pub source: Option<String>,
    pub score: Option<f64>,
    pub raw: Value,
}

#[derive(Serialize)]
struct KnowledgeSearchRequest<'a> {
    query: &'a str,
    k: u32,
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    context: &'a Value,
    task: &'a str,
}

/// Knowledge search is a cheap lookup; `analyze` runs a model over a full
/// patient context, so it gets a longer per-call timeout rather than
/// sharing one client-wide budget with the lookup.
const KNOWLEDGE_SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const ANALYZE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct AiClient {
    http: Client,
    base: String,
}

impl AiClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: Client::builder().build().expect("reqwest client builds with static config"),
            base: base.into(),
        }
    }

    pub async fn knowledge_search(&self, query: &str, k: u32) -> Result<Vec<KnowledgeHit>> {
        let resp = self
            .http
            .post(format!("{}/ai/knowledge-search", self.base))
            .timeout(KNOWLEDGE_SEARCH_TIMEOUT)
            .json(&KnowledgeSearchRequest { query, k })
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::Http4xx(format!("knowledge-search {}", resp.status())));
        }

        let body: Value = resp.json().await.map_err(|e| Error::Network(e.to_string()))?;
        Ok(unwrap_hit_list(body))
    }

    pub async fn analyze(&self, context: &Value, task: &str) -> Result<AiResponse> {
        let resp = self
            .http
            .post(format!("{}/ai/analyze", self.base))
            .timeout(ANALYZE_TIMEOUT)
            .json(&AnalyzeRequest { context, task })
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::Http4xx(format!("analyze {}", resp.status())));
        }

        let body: Value = resp.json().await.map_err(|e| Error::Network(e.to_string()))?;
        Ok(AiResponse::from_untyped(body))
    }
}

/// Unwrap a response body that may be a bare list, or an object wrapping
/// the list under `results|hits|items|data`.
fn unwrap_hit_list(body: Value) -> Vec<KnowledgeHit> {
    let items: Vec<Value> = match body {
        Value::Array(items) => items,
        Value::Object(ref map) => ["results", "hits", "items", "data"]
            .iter()
            .find_map(|k| map.get(*k))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    items
        .into_iter()
        .map(|v| KnowledgeHit {
            title: v.get("title").and_then(Value::as_str).map(str::to_string),
            source: v.get("source").and_then(Value::as_str).map(str::to_string),
            score: v.get("score").and_then(Value::as_f64),
            raw: v,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_object_with_recognized_key_to_insights() {
        let value = json!({"key_findings": ["a", "b"], "risk_score": 0.7});
        match AiResponse::from_untyped(value) {
            AiResponse::Insights { key_findings, risk_score, .. } => {
                assert_eq!(key_findings, vec!["a", "b"]);
                assert_eq!(risk_score, Some(0.7));
            }
            other => panic!("expected Insights, got {other:?}"),
        }
    }

    #[test]
    fn coerces_plain_string_to_summary_truncated() {
        let long = "x".repeat(2000);
        match AiResponse::from_untyped(Value::String(long.clone())) {
            AiResponse::Summary(s) => assert_eq!(s.len(), 1200),
            other => panic!("expected Summary, got {other:?}"),
        }
    }

    #[test]
    fn coerces_list_to_bullets_capped_at_ten() {
        let items: Vec<Value> = (0..20).map(|i| Value::String(format!("item{i}"))).collect();
        match AiResponse::from_untyped(Value::Array(items)) {
            AiResponse::Bullets(bullets) => assert_eq!(bullets.len(), 10),
            other => panic!("expected Bullets, got {other:?}"),
        }
    }

    #[test]
    fn coerces_unrecognized_object_to_raw() {
        let value = json!({"status": "weird"});
        match AiResponse::from_untyped(value.clone()) {
            AiResponse::Raw(v) => assert_eq!(v, value),
            other => panic!("expected Raw, got {other:?}"),
        }
    }

    #[test]
    fn unwraps_hit_list_from_results_key() {
        let body = json!({"results": [{"title": "t1", "score": 0.9}]});
        let hits = unwrap_hit_list(body);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title.as_deref(), Some("t1"));
    }
}
