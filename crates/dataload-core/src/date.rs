//! Date node parsing
//!
//! Values are tried against a zoned primary format first, then a fixed list
//! of fallbacks. Zoned values are converted to UTC; the others are taken as
//! written.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

/// Value matched none of the accepted formats
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised date '{0}'")]
pub struct DateParseError(pub String);

const ZONED: &[&str] = &["%Y-%m-%d %H:%M:%S%.f %z", "%Y-%m-%d %H:%M:%S %z"];

const LOCAL: &[&str] = &[
    "%Y-%m-%d %I:%M:%S%.f %p",
    "%Y-%m-%d %I:%M:%S%p",
    "%Y-%m-%d %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
];

const DATE_ONLY: &[&str] = &["%d/%m/%Y", "%Y-%m-%d"];

/// Parse a date node value
///
/// An empty value is no date.
///
/// # Errors
/// Returns [`DateParseError`] if no format matches.
pub fn parse(value: &str) -> Result<Option<NaiveDateTime>, DateParseError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if let Some(zoned) = with_numeric_zone(trimmed) {
        for format in ZONED {
            if let Ok(parsed) = DateTime::parse_from_str(&zoned, format) {
                return Ok(Some(parsed.naive_utc()));
            }
        }
    }
    let upper = trimmed.to_ascii_uppercase();
    for format in LOCAL {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(&upper, format) {
            return Ok(Some(parsed));
        }
    }
    for format in DATE_ONLY {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(Some(parsed.and_time(NaiveTime::MIN)));
        }
    }
    Err(DateParseError(value.to_owned()))
}

/// Rewrite a trailing zone as ` +hhmm`
fn with_numeric_zone(value: &str) -> Option<String> {
    value.char_indices().find_map(|(i, _)| {
        let (head, zone) = value.split_at(i);
        let preceding = head.chars().next_back()?;
        if !(preceding.is_ascii_digit() || preceding.is_whitespace()) {
            return None;
        }
        let offset = zone_offset(zone)?;
        Some(format!("{} {offset}", head.trim_end()))
    })
}

fn zone_offset(zone: &str) -> Option<String> {
    let upper = zone.to_ascii_uppercase();
    let rest = upper
        .strip_prefix("GMT")
        .or_else(|| upper.strip_prefix("UTC"))
        .unwrap_or(&upper);
    if rest.is_empty() {
        return (rest.len() != upper.len()).then(|| "+0000".to_owned());
    }
    if rest == "Z" {
        return Some("+0000".to_owned());
    }
    let sign = match rest.chars().next()? {
        c @ ('+' | '-') => c,
        _ => return None,
    };
    let digits: String = rest[1..].chars().filter(|c| *c != ':').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.as_str(), "00"),
        4 => digits.split_at(2),
        _ => return None,
    };
    Some(format!("{sign}{hours:0>2}{minutes}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn empty_is_no_date() {
        assert_eq!(parse(""), Ok(None));
        assert_eq!(parse("  "), Ok(None));
    }

    #[test]
    fn zoned_values_convert_to_utc() {
        assert_eq!(parse("2008-01-01 10:00:00.0 GMT"), Ok(Some(at(2008, 1, 1, 10, 0, 0))));
        assert_eq!(parse("2008-01-01 10:00:00 UTC"), Ok(Some(at(2008, 1, 1, 10, 0, 0))));
        assert_eq!(parse("2008-01-01 10:00:00+10:00"), Ok(Some(at(2008, 1, 1, 0, 0, 0))));
        assert_eq!(parse("2008-01-01 10:00:00 GMT-02:00"), Ok(Some(at(2008, 1, 1, 12, 0, 0))));
    }

    #[test]
    fn local_formats() {
        assert_eq!(parse("2008-01-01 10:30:00.0 pm"), Ok(Some(at(2008, 1, 1, 22, 30, 0))));
        assert_eq!(parse("2008-01-01 09:15:00AM"), Ok(Some(at(2008, 1, 1, 9, 15, 0))));
        assert_eq!(parse("2008-01-01 23:59:59"), Ok(Some(at(2008, 1, 1, 23, 59, 59))));
        assert_eq!(parse("25/12/2007 08:00:00"), Ok(Some(at(2007, 12, 25, 8, 0, 0))));
    }

    #[test]
    fn date_only_formats() {
        assert_eq!(parse("25/12/2007"), Ok(Some(at(2007, 12, 25, 0, 0, 0))));
        assert_eq!(parse("2007-12-25"), Ok(Some(at(2007, 12, 25, 0, 0, 0))));
    }

    #[test]
    fn unrecognised_value_is_error() {
        assert_eq!(parse("yesterday"), Err(DateParseError("yesterday".into())));
        assert!(parse("2008-13-01").is_err());
    }

    #[test]
    fn zone_offsets() {
        assert_eq!(zone_offset("GMT").as_deref(), Some("+0000"));
        assert_eq!(zone_offset("z").as_deref(), Some("+0000"));
        assert_eq!(zone_offset("+5").as_deref(), Some("+0500"));
        assert_eq!(zone_offset("-0330").as_deref(), Some("-0330"));
        assert_eq!(zone_offset("PM"), None);
        assert_eq!(zone_offset("0"), None);
    }
}
