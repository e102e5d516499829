//! HTTP clients for the three external systems the aggregator composes
//! (FHIR, OpenFDA, the AI service) plus the HL7 feed source the ingestor
//! polls.

pub mod ai;
pub mod fda;
pub mod fhir;
pub mod hl7_feed;

pub use ai::{AiClient, AiResponse, KnowledgeHit};
pub use fda::{FdaClient, FdaQueryResult};
pub use fhir::{FhirClient, FhirConfig};
pub use hl7_feed::Hl7FeedClient;
