use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::error::{Error, Result};

/// Timestamp shapes seen in Marine Cadastre exports. Tried in order; the
/// first match wins.
const TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
];

/// Parse a temporal attribute value into a timestamp. Bare dates are
/// accepted as midnight.
pub fn parse_time_value(field: &str, value: &Value) -> Result<NaiveDateTime> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    for format in TIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(&text, format) {
            return Ok(ts);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
        if let Some(ts) = date.and_hms_opt(0, 0, 0) {
            return Ok(ts);
        }
    }
    Err(Error::InvalidTimestamp {
        field: field.to_string(),
        value: text,
    })
}

/// Partition key for a record with a temporal value: its calendar date.
pub fn key_from_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d").to_string()
}

/// Partition key from a filename stem: the first run of exactly four
/// consecutive digits, taken verbatim as a year. Longer digit runs are not
/// year tokens. No plausibility check on the value.
pub fn year_from_stem(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i - start == 4 {
                return Some(stem[start..i].to_string());
            }
        } else {
            i += 1;
        }
    }
    None
}

/// Filename-based resolution where failure is fatal for the file.
pub fn require_year_from_stem(stem: &str) -> Result<String> {
    year_from_stem(stem).ok_or_else(|| Error::UnresolvedPartitionKey {
        stem: stem.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_token_from_typical_stems() {
        assert_eq!(year_from_stem("AISVTC2023Atlantic"), Some("2023".into()));
        assert_eq!(year_from_stem("AISVesselTracks2022"), Some("2022".into()));
        assert_eq!(year_from_stem("2019_counts"), Some("2019".into()));
    }

    #[test]
    fn first_year_token_wins() {
        assert_eq!(year_from_stem("tracks_2021_vs_2022"), Some("2021".into()));
    }

    #[test]
    fn longer_digit_runs_are_not_years() {
        assert_eq!(year_from_stem("grid20234x"), None);
        assert_eq!(year_from_stem("a123b12345c2020"), Some("2020".into()));
    }

    #[test]
    fn no_token_resolves_to_none() {
        assert_eq!(year_from_stem("vessel_tracks"), None);
        assert!(require_year_from_stem("vessel_tracks").is_err());
    }

    #[test]
    fn parses_marine_cadastre_timestamps() {
        let formats = [
            "2023-05-01T12:30:00",
            "2023-05-01 12:30:00",
            "05/01/2023 12:30:00",
        ];
        for text in formats {
            let ts = parse_time_value("BaseDateTime", &Value::from(text)).unwrap();
            assert_eq!(key_from_timestamp(&ts), "2023-05-01");
        }
    }

    #[test]
    fn bare_date_parses_as_midnight() {
        let ts = parse_time_value("TIMESTAMP", &Value::from("2023-05-02")).unwrap();
        assert_eq!(ts.format("%H:%M:%S").to_string(), "00:00:00");
    }

    #[test]
    fn garbage_timestamp_is_fatal() {
        let err = parse_time_value("TIMESTAMP", &Value::from("not a time")).unwrap_err();
        assert!(matches!(err, Error::InvalidTimestamp { .. }));
    }
}
