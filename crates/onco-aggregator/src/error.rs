//! HTTP-facing error type for the aggregator's handlers. Wraps
//! [`onco_core::error::Error`] with the status-code mapping the design
//! calls for: a token failure degrades to `504`, a patient identity
//! mismatch to `404`, everything else upstream passes the recovered FHIR
//! status through where one exists and falls back to `502` otherwise.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("token unavailable: {0}")]
    TokenUnavailable(String),
    #[error("patient not found: {0}")]
    PatientNotFound(String),
    #[error("patient identity mismatch")]
    IdentityMismatch,
    #[error("upstream failure: {0}")]
    Upstream(#[from] onco_core::error::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, reason) = match &self {
            AppError::TokenUnavailable(_) => (StatusCode::GATEWAY_TIMEOUT, self.to_string()),
            AppError::PatientNotFound(_) | AppError::IdentityMismatch => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Upstream(e) => {
                // `/patients` passes the upstream FHIR status through rather than
                // flattening every list failure to one code; anything we can't
                // recover a status from (network errors, timeouts) still maps to 502.
                let status = e
                    .http_status()
                    .and_then(|code| StatusCode::from_u16(code).ok())
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                (status, e.to_string())
            }
        };
        (status, Json(json!({"error": reason}))).into_response()
    }
}
