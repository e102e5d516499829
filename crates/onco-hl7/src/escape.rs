//! HL7 escape-sequence decoding (`\F\`, `\S\`, `\T\`, `\R\`, `\E\`, `\Xnn\`).
//!
//! Decoding is best-effort: an unrecognized escape sequence is passed
//! through verbatim rather than failing the parse, consistent with the
//! parser's "every field accessor is individually fallible, never a hard
//! parse failure" policy.

pub fn decode(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }

        let mut escape_seq = String::new();
        let mut closed = false;
        while let Some(&next_ch) = chars.peek() {
            if next_ch == '\\' {
                chars.next();
                closed = true;
                break;
            }
            escape_seq.push(next_ch);
            chars.next();
        }

        if !closed {
            result.push('\\');
            result.push_str(&escape_seq);
            continue;
        }

        match escape_seq.as_str() {
            "F" => result.push('|'),
            "S" => result.push('^'),
            "T" => result.push('&'),
            "R" => result.push('~'),
            "E" => result.push('\\'),
            seq if seq.starts_with('X') => {
                if let Ok(code) = u32::from_str_radix(&seq[1..], 16) {
                    if let Some(c) = char::from_u32(code) {
                        result.push(c);
                        continue;
                    }
                }
                result.push('\\');
                result.push_str(&escape_seq);
                result.push('\\');
            }
            seq => {
                result.push('\\');
                result.push_str(seq);
                result.push('\\');
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_field_separator_escape() {
        assert_eq!(decode("a\\F\\b"), "a|b");
    }

    #[test]
    fn passes_through_plain_text() {
        assert_eq!(decode("Hemoglobin"), "Hemoglobin");
    }

    #[test]
    fn decodes_hex_escape() {
        assert_eq!(decode("a\\X0A\\b"), "a\nb");
    }
}
