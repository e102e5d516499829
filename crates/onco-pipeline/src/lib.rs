//! The two streaming workers: the ingestor (feed → `hl7:raw`) and the
//! normalizer (`hl7:raw` → `hl7:norm` / `hl7:dlq`).

pub mod ingestor;
pub mod normalizer;

pub use ingestor::Ingestor;
pub use normalizer::Normalizer;
