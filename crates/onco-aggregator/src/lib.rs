//! Concurrent FHIR/FDA/AI insight aggregator: composes a single patient's
//! medications, labs, drug-interaction evidence, and AI-generated insights
//! behind one HTTP endpoint, filtering every upstream resource to the
//! requesting patient's identity before it can influence the response.

pub mod aggregate;
pub mod error;
pub mod filters;
pub mod hl7_cross;
pub mod server;
pub mod state;

pub use error::AppError;
pub use server::router;
pub use state::AppState;
