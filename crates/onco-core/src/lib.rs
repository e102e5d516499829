//! Core data structures and traits shared by every pipeline crate:
//! the error taxonomy, the canonical `EventCommon` event, identity
//! normalization, and the wire types for the broker streams.

pub mod error;
pub mod event;
pub mod identity;
pub mod stream_types;

pub use error::{Error, Result};
pub use event::{EventCommon, EventCommonInput, EventType, Source};
pub use identity::{normalize_alnum_lower, normalize_drug_name};
pub use stream_types::{DlqEntry, DlqReason, RawHl7Message};
