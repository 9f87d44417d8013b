//! Timestamp and file-naming helpers

use chrono::{DateTime, Utc};

/// UTC timestamp used throughout records and snapshots
pub type Timestamp = DateTime<Utc>;

/// Current UTC time
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Microsecond-resolution stamp used in output and snapshot names
/// (`20250101_120000_000123`)
pub fn precise_file_stamp(ts: &Timestamp) -> String {
    ts.format("%Y%m%d_%H%M%S_%6f").to_string()
}

/// True when `s` can be used as a single path component.
///
/// Region and campaign ids become directory and file names, so they must
/// not be empty, contain separators, or walk upwards.
pub fn is_safe_segment(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_stamps() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(precise_file_stamp(&ts), "20250309_070501_000000");
    }

    #[test]
    fn test_safe_segment() {
        assert!(is_safe_segment("tokyo_subway"));
        assert!(is_safe_segment("spring-2025.v2"));
        assert!(!is_safe_segment(""));
        assert!(!is_safe_segment(".."));
        assert!(!is_safe_segment("a/b"));
        assert!(!is_safe_segment("a b"));
    }
}
