// LogSift - core/normalize.rs
//
// Message normalisation for repeated-pattern detection.
// Variable parts of a message (timestamps, ids, addresses, numbers) are
// replaced with placeholders so that lines produced by the same statement
// collapse onto one template.

use regex::Regex;
use std::sync::OnceLock;

pub const PH_TIMESTAMP: &str = "<TS>";
pub const PH_UUID: &str = "<UUID>";
pub const PH_IP: &str = "<IP>";
pub const PH_HEX: &str = "<HEX>";
pub const PH_B64: &str = "<B64>";
pub const PH_NUM: &str = "<NUM>";

/// Placeholder for tokens that differ between merged templates.
pub const WILDCARD: &str = "<*>";

struct Maskers {
    timestamp: Regex,
    uuid: Regex,
    ipv4: Regex,
    hex_prefixed: Regex,
    hex_long: Regex,
    base64: Regex,
    number: Regex,
}

fn maskers() -> &'static Maskers {
    static MASKERS: OnceLock<Maskers> = OnceLock::new();
    MASKERS.get_or_init(|| Maskers {
        timestamp: Regex::new(
            r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d{1,9})?(?:Z|[+-]\d{2}:?\d{2})?",
        )
        .expect("normalize: timestamp regex"),
        uuid: Regex::new(
            r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b",
        )
        .expect("normalize: uuid regex"),
        ipv4: Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}(?::\d{1,5})?\b")
            .expect("normalize: ipv4 regex"),
        hex_prefixed: Regex::new(r"\b0[xX][0-9a-fA-F]+\b").expect("normalize: hex regex"),
        hex_long: Regex::new(r"\b[0-9a-fA-F]{16,}\b").expect("normalize: long hex regex"),
        base64: Regex::new(r"\b[A-Za-z0-9+/]{20,}={0,2}").expect("normalize: base64 regex"),
        number: Regex::new(r"\d+(?:\.\d+)?").expect("normalize: number regex"),
    })
}

/// Reduce a message to its template.
///
/// Masks are applied from most to least specific so that, for example, the
/// digits of an IP address are not first consumed as plain numbers.
/// Whitespace runs collapse to a single space.
pub fn normalize_message(message: &str) -> String {
    let m = maskers();
    let s = m.timestamp.replace_all(message, PH_TIMESTAMP);
    let s = m.uuid.replace_all(&s, PH_UUID);
    let s = m.ipv4.replace_all(&s, PH_IP);
    let s = m.hex_prefixed.replace_all(&s, PH_HEX);
    let s = m.hex_long.replace_all(&s, PH_HEX);
    let s = m.base64.replace_all(&s, PH_B64);
    let s = m.number.replace_all(&s, PH_NUM);
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fraction of positions at which two equal-length token lists agree.
/// A [`WILDCARD`] on either side agrees with anything. Lists of different
/// lengths have similarity 0.
pub fn token_similarity(a: &[String], b: &[String]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    if a.is_empty() {
        return 1.0;
    }
    let same = a
        .iter()
        .zip(b)
        .filter(|(x, y)| x == y || *x == WILDCARD || *y == WILDCARD)
        .count();
    same as f64 / a.len() as f64
}
