//! OBX-specific field accessors, kept separate from the generic
//! [`crate::segment::Hl7Segment`] so that segment stays a dumb field-store.

use crate::segment::Hl7Segment;

/// A coded element pulled out of OBX-3: `(code, display)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CodedElement {
    pub code: Option<String>,
    pub display: Option<String>,
}

/// OBX-3: the observation identifier, `CE.1` (code) and `CE.2` (display).
pub fn obx_code(obx: &Hl7Segment) -> CodedElement {
    CodedElement {
        code: obx.component(3, 1),
        display: obx.component(3, 2),
    }
}

/// OBX-5: the observation value, preserved as a string regardless of the
/// declared value type (NM, TX, ...).
pub fn obx_value(obx: &Hl7Segment) -> Option<String> {
    obx.value(5)
}

/// OBX-6: units. Prefers the text component (`CE.2`) over the coded
/// component (`CE.1`).
pub fn obx_unit(obx: &Hl7Segment) -> Option<String> {
    obx.component(6, 2).or_else(|| obx.component(6, 1))
}

/// OBX-8: abnormal flag.
pub fn obx_flag(obx: &Hl7Segment) -> Option<String> {
    obx.value(8)
}

/// OBX-14: observation date/time, raw HL7 form.
pub fn obx_datetime(obx: &Hl7Segment) -> Option<String> {
    obx.value(14)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::parse;

    const SAMPLE: &str = "MSH|^~\\&|LIS|HOSP|EMR|HOSP|202501011230||ORU^R01|1|P|2.3\rPID|1||12345^^^HOSP^MR||DOE^JOHN||19800101|M\rOBR|1||ABC|718-7^Hemoglobin^LN\rOBX|1|NM|718-7^Hemoglobin^LN||12.3|g/dL|13-17|L|||F|202501011230\r";

    #[test]
    fn extracts_obx_fields() {
        let parsed = parse(SAMPLE).unwrap();
        let obx = &parsed.obx_list()[0];
        assert_eq!(
            obx_code(obx),
            CodedElement {
                code: Some("718-7".into()),
                display: Some("Hemoglobin".into()),
            }
        );
        assert_eq!(obx_value(obx).as_deref(), Some("12.3"));
        assert_eq!(obx_unit(obx).as_deref(), Some("g/dL"));
        assert_eq!(obx_flag(obx).as_deref(), Some("L"));
        // This sample OBX line is truncated before field 14 (it ends at
        // field 12); the normalizer falls back to MSH-7 in that case.
        assert_eq!(obx_datetime(obx), None);
    }
}
