// LogSift - core/parser.rs
//
// Line classification and sort-key extraction.
// Core layer: a pure function of the line text and its offset.
//
// Recognised shape:
//   YYYY-MM-DD HH:MM:SS[.fff|,fff] [LEVEL|[LEVEL]|LEVEL:] message
//
// Anything else is malformed. Malformed is a classification, never an error.

use crate::core::model::{Level, LogEntry};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Leading timestamp, optional fraction, optional level token, message.
///
/// The level token must be followed by whitespace or end of line so that
/// `ERRORS occurred` is read as a message rather than level `ERROR`.
const LINE_PATTERN: &str = r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})(?:[.,](\d{1,9}))?(?:\s+(?:\[?(ERROR|WARNING|WARN|INFO|DEBUG|TRACE)\]?:?(?:\s+|$))?(.*))?$";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn line_regex() -> &'static Regex {
    static LINE_RE: OnceLock<Regex> = OnceLock::new();
    LINE_RE.get_or_init(|| Regex::new(LINE_PATTERN).expect("parser: invalid line regex"))
}

/// Parse one raw line (without its newline) located at `offset`.
///
/// On a match the entry is well-formed and carries a timestamp. On a
/// mismatch, or when the timestamp is not a real calendar instant, the
/// entry is malformed and the full line becomes its message.
pub fn parse_line(raw_line: &str, offset: u64) -> LogEntry {
    // A BOM only ever appears on the first line; ignore it for matching.
    let candidate = raw_line.strip_prefix('\u{feff}').unwrap_or(raw_line);

    let Some(caps) = line_regex().captures(candidate) else {
        return LogEntry::malformed(raw_line, offset);
    };

    let Some(timestamp) = caps
        .get(1)
        .and_then(|m| parse_timestamp(m.as_str(), caps.get(2).map(|f| f.as_str())))
    else {
        return LogEntry::malformed(raw_line, offset);
    };

    let level = caps.get(3).and_then(|m| m.as_str().parse::<Level>().ok());
    let message = caps
        .get(4)
        .map(|m| m.as_str().trim_end().to_string())
        .unwrap_or_default();

    LogEntry {
        raw_text: raw_line.to_string(),
        timestamp: Some(timestamp),
        level,
        message,
        source_offset: offset,
        well_formed: true,
    }
}

/// Parse the `YYYY-MM-DD HH:MM:SS` prefix plus an optional fraction of up to
/// nine digits. Returns `None` for calendar-invalid values.
fn parse_timestamp(base: &str, fraction: Option<&str>) -> Option<DateTime<Utc>> {
    let ndt = NaiveDateTime::parse_from_str(base, TIMESTAMP_FORMAT).ok()?;
    let ndt = match fraction {
        Some(digits) => {
            // Right-pad to nanoseconds: "5" -> 500_000_000.
            let nanos: u32 = format!("{digits:0<9}").parse().ok()?;
            ndt.with_nanosecond(nanos)?
        }
        None => ndt,
    };
    Some(ndt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, h, m, s).unwrap()
    }

    #[test]
    fn test_parse_basic_line() {
        let e = parse_line("2024-01-15 10:00:03 ERROR boom", 120);
        assert!(e.well_formed);
        assert_eq!(e.timestamp, Some(ts(10, 0, 3)));
        assert_eq!(e.level, Some(Level::Error));
        assert_eq!(e.message, "boom");
        assert_eq!(e.source_offset, 120);
        assert_eq!(e.raw_text, "2024-01-15 10:00:03 ERROR boom");
    }

    #[test]
    fn test_parse_without_level() {
        let e = parse_line("2024-01-15 10:00:03 service started", 0);
        assert!(e.well_formed);
        assert_eq!(e.level, None);
        assert_eq!(e.message, "service started");
    }

    #[test]
    fn test_parse_warning_alias_and_brackets() {
        let e = parse_line("2024-01-15 10:00:03 WARNING disk low", 0);
        assert_eq!(e.level, Some(Level::Warn));
        assert_eq!(e.message, "disk low");

        let e = parse_line("2024-01-15 10:00:03 [DEBUG] cache miss", 0);
        assert_eq!(e.level, Some(Level::Debug));
        assert_eq!(e.message, "cache miss");

        let e = parse_line("2024-01-15 10:00:03 INFO: ready", 0);
        assert_eq!(e.level, Some(Level::Info));
        assert_eq!(e.message, "ready");
    }

    #[test]
    fn test_level_word_prefix_is_message() {
        let e = parse_line("2024-01-15 10:00:03 ERRORS were counted", 0);
        assert!(e.well_formed);
        assert_eq!(e.level, None);
        assert_eq!(e.message, "ERRORS were counted");
    }

    #[test]
    fn test_level_only_line() {
        let e = parse_line("2024-01-15 10:00:03 TRACE", 0);
        assert_eq!(e.level, Some(Level::Trace));
        assert_eq!(e.message, "");
    }

    #[test]
    fn test_timestamp_only_line() {
        let e = parse_line("2024-01-15 10:00:03", 0);
        assert!(e.well_formed);
        assert_eq!(e.message, "");
    }

    #[test]
    fn test_fractional_seconds() {
        let e = parse_line("2024-01-15 10:00:03.25 INFO tick", 0);
        let t = e.timestamp.unwrap();
        assert_eq!(t.nanosecond(), 250_000_000);

        let e = parse_line("2024-01-15 10:00:03,123 INFO log4j style", 0);
        assert_eq!(e.timestamp.unwrap().nanosecond(), 123_000_000);
        assert_eq!(e.message, "log4j style");
    }

    #[test]
    fn test_malformed_lines() {
        for line in [
            "",
            "   ",
            "no timestamp here",
            "2024/01/15 10:00:03 ERROR slashes",
            "2024-01-15T10:00:03 ERROR iso t separator",
            "2024-01-15 10:00:031 glued digits",
            "2024-13-45 10:00:03 ERROR impossible date",
            "  2024-01-15 10:00:03 ERROR indented",
        ] {
            let e = parse_line(line, 7);
            assert!(!e.well_formed, "should be malformed: {line:?}");
            assert!(e.timestamp.is_none());
            assert_eq!(e.message, line);
            assert_eq!(e.source_offset, 7);
        }
    }

    #[test]
    fn test_bom_ignored_for_matching() {
        let raw = "\u{feff}2024-01-15 10:00:03 INFO first";
        let e = parse_line(raw, 0);
        assert!(e.well_formed);
        assert_eq!(e.raw_text, raw);
        assert_eq!(e.message, "first");
    }

    #[test]
    fn test_trailing_whitespace_trimmed_from_message() {
        let e = parse_line("2024-01-15 10:00:03 INFO padded   ", 0);
        assert_eq!(e.message, "padded");
    }
}
