//! Shared application state: one client per upstream system, constructed
//! once at startup and handed to every request as an `Arc`.

use onco_clients::{AiClient, FdaClient, FhirClient, FhirConfig, Hl7FeedClient};
use onco_config::ClientSettings;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub fhir: Arc<FhirClient>,
    pub fda: Arc<FdaClient>,
    pub ai: Arc<AiClient>,
    pub hl7_feed: Arc<Hl7FeedClient>,
}

impl AppState {
    pub fn new(settings: &ClientSettings) -> onco_core::error::Result<Self> {
        let fhir = FhirClient::new(FhirConfig {
            base: settings.fhir_base.clone(),
            client_id: settings.fhir_client_id.clone(),
            client_secret: settings.fhir_client_secret.clone(),
            token_url: settings.fhir_token_url.clone(),
        })?;

        Ok(Self {
            fhir: Arc::new(fhir),
            fda: Arc::new(FdaClient::new(settings.fda_base.clone())),
            ai: Arc::new(AiClient::new(settings.ai_base.clone())),
            hl7_feed: Arc::new(Hl7FeedClient::new(settings.hl7_base.clone())),
        })
    }
}
