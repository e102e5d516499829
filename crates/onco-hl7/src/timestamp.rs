//! HL7 timestamp (`YYYYMMDD[HHMMSS]`) to epoch-millisecond conversion.

use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Convert an HL7-format timestamp to epoch milliseconds (UTC). Anything
/// that isn't a recognized `YYYYMMDD` or `YYYYMMDDHHMMSS` prefix falls back
/// to `now_ms`, matching the normalize-time clock policy in §4.1.
pub fn hl7_ts_to_epoch_ms(raw: Option<&str>, now_ms: i64) -> i64 {
    let Some(raw) = raw else { return now_ms };
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();

    if digits.len() >= 14 {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&digits[..14], "%Y%m%d%H%M%S") {
            return Utc.from_utc_datetime(&dt).timestamp_millis();
        }
    } else if digits.len() >= 8 {
        if let Ok(date) = NaiveDate::parse_from_str(&digits[..8], "%Y%m%d") {
            let dt = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
            return Utc.from_utc_datetime(&dt).timestamp_millis();
        }
    }

    now_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_datetime() {
        let ms = hl7_ts_to_epoch_ms(Some("202501011230"), 0);
        assert_eq!(ms, 1_735_734_600_000);
    }

    #[test]
    fn parses_date_only() {
        let ms = hl7_ts_to_epoch_ms(Some("20250101"), 0);
        assert_eq!(ms, 1_735_689_600_000);
    }

    #[test]
    fn falls_back_to_clock_on_garbage() {
        assert_eq!(hl7_ts_to_epoch_ms(Some("not-a-date"), 42), 42);
        assert_eq!(hl7_ts_to_epoch_ms(None, 42), 42);
    }
}
