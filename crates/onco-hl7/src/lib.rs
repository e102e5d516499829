//! Tolerant HL7 v2.x parsing: raw pipe-delimited text in, a segment/field
//! map and typed accessors out. Every accessor is individually fallible;
//! the only hard failure the parser itself raises is "no segments parsed".

pub mod accessors;
pub mod escape;
pub mod event_builder;
pub mod message;
pub mod segment;
pub mod timestamp;

pub use accessors::{obx_code, obx_datetime, obx_flag, obx_unit, obx_value, CodedElement};
pub use event_builder::build_event_inputs;
pub use message::{parse, ParsedMessage};
pub use segment::Hl7Segment;
pub use timestamp::hl7_ts_to_epoch_ms;
