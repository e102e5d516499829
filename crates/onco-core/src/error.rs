//! Error taxonomy for the pipeline and aggregator.
//!
//! Every tag here is stable: it is persisted verbatim into DLQ entries and
//! surfaced in `unavailable_sources`, so renaming a variant's `tag()` is a
//! wire-format change, not a refactor.

use thiserror::Error;

/// Result type alias used across the pipeline crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the oncology pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("identity_missing: {0}")]
    IdentityMissing(String),

    #[error("missing_code: {0}")]
    MissingCode(String),

    #[error("invalid_ts: {0}")]
    InvalidTs(String),

    #[error("schema_validation_failed: {0}")]
    SchemaValidationFailed(String),

    #[error("encoding_error: {0}")]
    Encoding(String),

    #[error("empty_message")]
    EmptyMessage,

    #[error("unsupported_or_mixed_version: {0}")]
    UnsupportedOrMixedVersion(String),

    #[error("malformed_hl7: {0}")]
    MalformedHl7(String),

    #[error("missing_required_fields: {0}")]
    MissingRequiredFields(String),

    #[error("network_timeout: {0}")]
    NetworkTimeout(String),

    #[error("network_error: {0}")]
    Network(String),

    #[error("http_5xx: {0}")]
    Http5xx(String),

    #[error("http_4xx: {0}")]
    Http4xx(String),

    #[error("operation_outcome: {0}")]
    OperationOutcome(String),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an `identity_missing` error.
    pub fn identity_missing<S: Into<String>>(msg: S) -> Self {
        Error::IdentityMissing(msg.into())
    }

    /// Create a `missing_code` error.
    pub fn missing_code<S: Into<String>>(msg: S) -> Self {
        Error::MissingCode(msg.into())
    }

    /// Stable DLQ/telemetry tag for this error, matching the taxonomy in the
    /// system design (§7). Written verbatim into DLQ entries and surfaced in
    /// `unavailable_sources`.
    pub fn tag(&self) -> &'static str {
        match self {
            Error::IdentityMissing(_) => "identity_missing",
            Error::MissingCode(_) => "missing_code",
            Error::InvalidTs(_) => "invalid_ts",
            Error::SchemaValidationFailed(_) => "schema_validation_failed",
            Error::Encoding(_) => "encoding_error",
            Error::EmptyMessage => "empty_message",
            Error::UnsupportedOrMixedVersion(_) => "unsupported_or_mixed_version",
            Error::MalformedHl7(_) => "malformed_hl7",
            Error::MissingRequiredFields(_) => "missing_required_fields",
            Error::NetworkTimeout(_) => "network_timeout",
            Error::Network(_) => "network_error",
            Error::Http5xx(_) => "http_5xx",
            Error::Http4xx(_) => "http_4xx",
            Error::OperationOutcome(_) => "operation_outcome",
            Error::Broker(_) => "broker_error",
            Error::Other(_) => "malformed_hl7",
        }
    }

    /// The upstream HTTP status embedded in an `Http4xx`/`Http5xx`/
    /// `OperationOutcome` message, if one can be recovered, for callers that
    /// want to pass the upstream status through rather than flattening every
    /// upstream failure to a single code. `OperationOutcome` carries a
    /// status too: it's the FHIR error envelope a compliant server wraps
    /// 4xx/5xx bodies in, so a 404 can arrive either way.
    pub fn http_status(&self) -> Option<u16> {
        let text = match self {
            Error::Http4xx(s) | Error::Http5xx(s) | Error::OperationOutcome(s) => s,
            _ => return None,
        };
        text.split_whitespace().find_map(|tok| tok.parse::<u16>().ok().filter(|code| (100..600).contains(code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_recovers_the_numeric_code() {
        assert_eq!(Error::Http4xx("FHIR 404 Not Found".into()).http_status(), Some(404));
        assert_eq!(Error::Http5xx("FHIR 503 Service Unavailable".into()).http_status(), Some(503));
    }

    #[test]
    fn http_status_recovers_the_code_from_an_operation_outcome() {
        assert_eq!(Error::OperationOutcome("FHIR 404 Not Found: not-found: no such patient".into()).http_status(), Some(404));
    }

    #[test]
    fn http_status_is_none_for_non_http_variants() {
        assert_eq!(Error::Network("connection refused".into()).http_status(), None);
        assert_eq!(Error::IdentityMissing("no id".into()).http_status(), None);
    }
}
