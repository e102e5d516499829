//! OpenFDA drug-label/interaction lookups.
//!
//! Grounded on the upstream `fda_client.py`: normalize the drug name, try
//! the interactions endpoint, fall back to the label endpoint, and treat
//! any transport error or 5xx as "try the next path" rather than a hard
//! failure — a missing FDA fragment degrades the aggregator's response,
//! it never fails the request.

use onco_core::identity::normalize_drug_name;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const CANDIDATE_ENDPOINTS: &[&str] = &["/drug/interactions.json", "/drug/label.json"];
const SERVER_ERROR_SLEEP: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct FdaQueryResult {
    pub drug: String,
    pub endpoint: Option<String>,
    pub payload: Option<Value>,
}

pub struct FdaClient {
    http: Client,
    base: String,
}

impl FdaClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client builds with static config"),
            base: base.into(),
        }
    }

    /// Query each candidate endpoint in turn for `drug`, normalized the
    /// same way for every attempt. Returns `{endpoint: None, payload: None}`
    /// when nothing answers — never an error.
    pub async fn query_openfda(&self, drug: &str) -> FdaQueryResult {
        let normalized = normalize_drug_name(drug);
        if normalized.is_empty() {
            return FdaQueryResult { drug: drug.to_string(), endpoint: None, payload: None };
        }
        let search = format!("search={normalized}");

        for path in CANDIDATE_ENDPOINTS {
            let url = format!("{}{}?{}", self.base, path, search);
            let resp = match self.http.get(&url).send().await {
                Ok(r) => r,
                Err(_) => continue,
            };

            if resp.status().is_server_error() {
                tokio::time::sleep(SERVER_ERROR_SLEEP).await;
                continue;
            }
            if !resp.status().is_success() {
                continue;
            }

            match resp.json::<Value>().await {
                Ok(body) => {
                    return FdaQueryResult {
                        drug: drug.to_string(),
                        endpoint: Some((*path).to_string()),
                        payload: Some(body),
                    }
                }
                Err(_) => continue,
            }
        }

        FdaQueryResult { drug: drug.to_string(), endpoint: None, payload: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_construction_does_not_panic() {
        let _ = FdaClient::new("https://api.fda.gov");
    }

    #[tokio::test]
    async fn query_openfda_carries_the_original_drug_name_even_when_empty() {
        let client = FdaClient::new("https://api.fda.gov");
        let result = client.query_openfda("###").await;
        assert_eq!(result.drug, "###");
        assert!(result.endpoint.is_none());
    }
}
