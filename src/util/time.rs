use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?(?:(\d+)ms)?$").expect("valid regex")
    })
}

/// Parse a duration like `1h30m`, `45m`, `90s`, `1500ms`, or a bare
/// millisecond count. Returns `None` on anything else.
pub fn parse_duration_ms(input: &str) -> Option<i64> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(ms) = input.parse::<i64>() {
        return (ms >= 0).then_some(ms);
    }

    let caps = duration_re().captures(input)?;
    let part = |i: usize| -> Option<i64> { caps.get(i).map(|m| m.as_str().parse().unwrap_or(0)) };
    let (h, m, s, ms) = (part(1), part(2), part(3), part(4));
    if h.is_none() && m.is_none() && s.is_none() && ms.is_none() {
        return None;
    }
    Some(
        h.unwrap_or(0) * 3_600_000
            + m.unwrap_or(0) * 60_000
            + s.unwrap_or(0) * 1000
            + ms.unwrap_or(0),
    )
}

/// Format a millisecond duration in the same `1h30m` syntax `parse_duration_ms`
/// accepts.
pub fn format_duration_ms(ms: i64) -> String {
    if ms < 0 {
        return format!("-{}", format_duration_ms(-ms));
    }
    if ms == 0 {
        return "0ms".to_string();
    }
    let mut out = String::new();
    let (h, rem) = (ms / 3_600_000, ms % 3_600_000);
    let (m, rem) = (rem / 60_000, rem % 60_000);
    let (s, rem) = (rem / 1000, rem % 1000);
    if h > 0 {
        out.push_str(&format!("{}h", h));
    }
    if m > 0 {
        out.push_str(&format!("{}m", m));
    }
    if s > 0 {
        out.push_str(&format!("{}s", s));
    }
    if rem > 0 {
        out.push_str(&format!("{}ms", rem));
    }
    out
}

/// Parse an absolute instant: RFC 3339 (`2026-08-08T07:30:00Z`), a naive
/// `YYYY-MM-DD HH:MM[:SS]` treated as UTC, or bare epoch milliseconds.
pub fn parse_instant_ms(input: &str) -> Option<i64> {
    let input = input.trim();
    if let Ok(ms) = input.parse::<i64>() {
        return Some(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    None
}

/// Render an epoch-millisecond instant as UTC for display
pub fn format_instant_ms(ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("{}ms", ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compound_durations() {
        assert_eq!(parse_duration_ms("1h30m"), Some(5_400_000));
        assert_eq!(parse_duration_ms("45m"), Some(2_700_000));
        assert_eq!(parse_duration_ms("90s"), Some(90_000));
        assert_eq!(parse_duration_ms("1500ms"), Some(1500));
        assert_eq!(parse_duration_ms("1h30m20s"), Some(5_420_000));
        assert_eq!(parse_duration_ms("250"), Some(250));
        assert_eq!(parse_duration_ms("0"), Some(0));
    }

    #[test]
    fn rejects_junk_durations() {
        assert_eq!(parse_duration_ms(""), None);
        assert_eq!(parse_duration_ms("fast"), None);
        assert_eq!(parse_duration_ms("5x"), None);
        assert_eq!(parse_duration_ms("-100"), None);
        assert_eq!(parse_duration_ms("h"), None);
    }

    #[test]
    fn duration_format_round_trips() {
        for ms in [0, 1, 999, 1000, 90_000, 5_400_000, 5_420_500] {
            let formatted = format_duration_ms(ms);
            assert_eq!(parse_duration_ms(&formatted), Some(ms), "{}", formatted);
        }
    }

    #[test]
    fn parses_instants() {
        assert_eq!(parse_instant_ms("0"), Some(0));
        assert_eq!(parse_instant_ms("1700000000000"), Some(1_700_000_000_000));
        assert_eq!(
            parse_instant_ms("1970-01-01T00:00:01Z"),
            Some(1000)
        );
        assert_eq!(parse_instant_ms("1970-01-01 00:00:01"), Some(1000));
        assert_eq!(parse_instant_ms("1970-01-01 00:01"), Some(60_000));
        assert_eq!(parse_instant_ms("yesterday"), None);
    }

    #[test]
    fn formats_instants_as_utc() {
        assert_eq!(format_instant_ms(1000), "1970-01-01 00:00:01");
    }
}
