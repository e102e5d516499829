//! A single HL7 segment: its name plus its raw (still-escaped) field
//! strings, addressable by the usual 1-based HL7 field number.

use crate::escape;

/// One occurrence of a named segment (e.g. one `OBX` line). Field access is
/// entirely optional-returning: a missing field, repetition, or component
/// is `None`, never a parse failure — only "no segments at all" is fatal
/// at the message level.
#[derive(Debug, Clone)]
pub struct Hl7Segment {
    pub name: String,
    /// 1-based: `fields[0]` is field 1. For `MSH`, field 1 is the field
    /// separator character itself and field 2 is the encoding-characters
    /// string, matching the HL7 convention that MSH's own delimiters
    /// cannot be field-split out of the segment the normal way.
    fields: Vec<String>,
}

impl Hl7Segment {
    pub(crate) fn new(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Raw (still-escaped, still-repeated/componentized) value of field
    /// `n` (1-based).
    pub fn field_raw(&self, n: usize) -> Option<&str> {
        if n == 0 {
            return None;
        }
        self.fields.get(n - 1).map(|s| s.as_str())
    }

    /// All repetitions of field `n`, split on `~`. Empty fields yield an
    /// empty vector rather than a single empty repetition, so callers can
    /// treat "field absent" and "field present but blank" the same way.
    pub fn repetitions(&self, n: usize) -> Vec<&str> {
        match self.field_raw(n) {
            Some(raw) if !raw.is_empty() => raw.split('~').collect(),
            _ => Vec::new(),
        }
    }

    /// Component `c` (1-based) of repetition `r` (0-based) of field `n`,
    /// escape-decoded.
    pub fn component_of(&self, n: usize, r: usize, c: usize) -> Option<String> {
        let reps = self.repetitions(n);
        let rep = reps.get(r)?;
        if c == 0 {
            return None;
        }
        let comp = rep.split('^').nth(c - 1)?;
        if comp.is_empty() {
            return None;
        }
        Some(escape::decode(comp))
    }

    /// Component `c` (1-based) of the first repetition of field `n`.
    pub fn component(&self, n: usize, c: usize) -> Option<String> {
        self.component_of(n, 0, c)
    }

    /// Whole-field value (first repetition, undivided into components),
    /// escape-decoded.
    pub fn value(&self, n: usize) -> Option<String> {
        let raw = self.repetitions(n).first().copied()?;
        if raw.is_empty() {
            return None;
        }
        Some(escape::decode(raw))
    }
}
