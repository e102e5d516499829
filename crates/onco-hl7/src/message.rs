//! Tolerant top-level parse: `&str -> ParsedMessage`.
//!
//! Groups are **not** materialized (`find_groups=off`): segment discovery
//! is a flat per-name collection rather than a tree walk, which is
//! equivalent to a recursive walk when no groups exist to nest into. The
//! only hard failure is "no segments parsed at all".

use crate::segment::Hl7Segment;
use onco_core::error::{Error, Result};
use std::collections::HashMap;

/// An in-memory parse of one HL7 message: segment name -> every occurrence
/// of that segment, in document order.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    segments: HashMap<String, Vec<Hl7Segment>>,
}

impl ParsedMessage {
    pub fn get(&self, name: &str) -> &[Hl7Segment] {
        self.segments.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn msh(&self) -> Option<&Hl7Segment> {
        self.get("MSH").first()
    }

    pub fn pid(&self) -> Option<&Hl7Segment> {
        self.get("PID").first()
    }

    /// Every `OBX` segment found anywhere in the message, in document
    /// order, regardless of nesting under `OBR`/`ORDER_OBSERVATION`
    /// groups (since groups are never materialized, this is already the
    /// full recursive collection).
    pub fn obx_list(&self) -> &[Hl7Segment] {
        self.get("OBX")
    }

    /// MSH-7: message timestamp, raw HL7 form.
    pub fn msh_timestamp(&self) -> Option<String> {
        self.msh()?.value(7)
    }

    /// MSH-10: message control id (natural idempotency source).
    pub fn msh_control_id(&self) -> Option<String> {
        self.msh()?.value(10)
    }

    /// MSH-12: HL7 version.
    pub fn msh_version(&self) -> Option<String> {
        self.msh()?.value(12)
    }

    /// PID-3 repetitions as `(identifier, type_code)` pairs, decoded.
    /// `type_code` is read from CX.5 (identifier type code) when present,
    /// falling back to CX.4 (assigning authority) for feeds that pack the
    /// type there instead — both shapes appear in the wild.
    pub fn pid3_identifiers_typed(&self) -> Vec<(String, Option<String>)> {
        let Some(pid) = self.pid() else {
            return Vec::new();
        };
        let reps = pid.repetitions(3);
        reps.iter()
            .enumerate()
            .filter_map(|(idx, _)| {
                let id = pid.component_of(3, idx, 1)?;
                let type_code = pid
                    .component_of(3, idx, 5)
                    .or_else(|| pid.component_of(3, idx, 4));
                Some((id, type_code))
            })
            .collect()
    }

    /// Just the PID-3 identifier values (CX.1 of every repetition), for
    /// cross-matching against a FHIR patient id or MRN set.
    pub fn pid3_identifiers(&self) -> Vec<String> {
        self.pid3_identifiers_typed()
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    /// PID-7: date of birth, raw HL7 form.
    pub fn pid_dob(&self) -> Option<String> {
        self.pid()?.value(7)
    }
}

/// Split a segment line into its 1-based field list, handling `MSH`'s
/// self-referential delimiter layout (MSH-1 is the field separator
/// character itself, MSH-2 the encoding characters).
fn split_fields(name: &str, rest: &str) -> Vec<String> {
    if rest.is_empty() {
        return Vec::new();
    }

    if name.eq_ignore_ascii_case("MSH") {
        let field_sep = rest.chars().next().unwrap_or('|');
        let after_sep = &rest[field_sep.len_utf8()..];
        let mut fields = vec![field_sep.to_string()];
        match after_sep.find(field_sep) {
            Some(idx) => {
                fields.push(after_sep[..idx].to_string());
                let remainder = &after_sep[idx + field_sep.len_utf8()..];
                fields.extend(remainder.split(field_sep).map(|s| s.to_string()));
            }
            None => fields.push(after_sep.to_string()),
        }
        fields
    } else {
        let rest = rest.strip_prefix('|').unwrap_or(rest);
        rest.split('|').map(|s| s.to_string()).collect()
    }
}

/// Parse a raw HL7 v2.x message with permissive rules: segment separator
/// `\r` (tolerating bare `\n` too), field separator `|`, component `^`,
/// repetition `~`, escape `\`.
pub fn parse(raw: &str) -> Result<ParsedMessage> {
    let lines: Vec<&str> = raw
        .split('\r')
        .flat_map(|s| s.split('\n'))
        .map(|s| s.trim_end_matches(['\r', '\n']))
        .filter(|s| !s.is_empty())
        .collect();

    if lines.is_empty() {
        return Err(Error::MalformedHl7("no segments parsed".into()));
    }

    let mut segments: HashMap<String, Vec<Hl7Segment>> = HashMap::new();
    let mut any_recognized = false;

    for line in lines {
        if line.len() < 3 {
            continue;
        }
        let name = &line[0..3];
        if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            continue;
        }
        let rest = &line[3..];
        let fields = split_fields(name, rest);
        segments
            .entry(name.to_string())
            .or_default()
            .push(Hl7Segment::new(name, fields));
        any_recognized = true;
    }

    if !any_recognized {
        return Err(Error::MalformedHl7("no segments parsed".into()));
    }

    Ok(ParsedMessage { segments })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "MSH|^~\\&|LIS|HOSP|EMR|HOSP|202501011230||ORU^R01|1|P|2.3\rPID|1||12345^^^HOSP^MR||DOE^JOHN||19800101|M\rOBR|1||ABC|718-7^Hemoglobin^LN\rOBX|1|NM|718-7^Hemoglobin^LN||12.3|g/dL|13-17|L|||F|202501011230\r";

    #[test]
    fn parses_msh_fields() {
        let parsed = parse(SAMPLE).unwrap();
        assert_eq!(parsed.msh_timestamp().as_deref(), Some("202501011230"));
        assert_eq!(parsed.msh_control_id().as_deref(), Some("1"));
        assert_eq!(parsed.msh_version().as_deref(), Some("2.3"));
    }

    #[test]
    fn finds_obx_in_document_order() {
        let parsed = parse(SAMPLE).unwrap();
        let obx = parsed.obx_list();
        assert_eq!(obx.len(), 1);
        assert_eq!(obx[0].component(3, 1).as_deref(), Some("718-7"));
    }

    #[test]
    fn reads_pid3_type_and_identifier() {
        let parsed = parse(SAMPLE).unwrap();
        let typed = parsed.pid3_identifiers_typed();
        assert_eq!(typed, vec![("12345".to_string(), Some("MR".to_string()))]);
    }

    #[test]
    fn pid3_cross_match_repetitions() {
        let raw = "MSH|^~\\&|LIS|HOSP|EMR|HOSP|202501011230||ORU^R01|2|P|2.3\rPID|1||P788166^^^MR~12345^^^SSN\r";
        let parsed = parse(raw).unwrap();
        assert_eq!(
            parsed.pid3_identifiers(),
            vec!["P788166".to_string(), "12345".to_string()]
        );
    }

    #[test]
    fn empty_message_is_malformed() {
        assert!(parse("").is_err());
        assert!(parse("\r\r\r").is_err());
    }

    #[test]
    fn missing_field_is_none_not_error() {
        let parsed = parse(SAMPLE).unwrap();
        // PID-4 (patient alias) absent between consecutive `||`.
        assert_eq!(parsed.pid().unwrap().value(4), None);
    }

    #[test]
    fn reads_pid_dob() {
        let parsed = parse(SAMPLE).unwrap();
        assert_eq!(parsed.pid_dob().as_deref(), Some("19800101"));
    }
}
