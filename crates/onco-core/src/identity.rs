//! Identity normalization.
//!
//! Two normalization functions are required and must be kept in sync:
//! (a) alphanumeric-lowercase, used for PID-3 cross-match against a FHIR
//! patient id or MRN; (b) NFKD-ASCII-lowercase, used for FDA drug-name
//! lookups. They are not interchangeable — a drug name containing an
//! accented character needs NFKD decomposition, an identifier never does.

use unicode_normalization::UnicodeNormalization;

/// Strip everything but ASCII alphanumerics and lowercase the rest. Used to
/// compare PID-3 identifier components against a patient id or MRN.
pub fn normalize_alnum_lower(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// NFKD-decompose, drop non-ASCII, trim, and lowercase. Used to build the
/// OpenFDA search query from a free-text drug name.
pub fn normalize_drug_name(s: &str) -> String {
    s.nfkd()
        .filter(|c| c.is_ascii())
        .collect::<String>()
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alnum_lower_strips_punctuation() {
        assert_eq!(normalize_alnum_lower("P788166^^^MR"), "p788166mr");
    }

    #[test]
    fn drug_name_strips_accents() {
        assert_eq!(normalize_drug_name("Café-Aspirin "), "cafe-aspirin");
    }
}
