use chrono::Duration;
use sha1::{Digest, Sha1};

use super::structs::Span;

/// Hex characters kept from the SHA-1 digest (80 bits). Collision resistance
/// within one transaction is all that is needed.
pub const FINGERPRINT_HEX_LEN: usize = 20;

/// Stable content fingerprint of a span: truncated SHA-1 of `op + description`.
///
/// Returns `None` when either field is missing or empty.
pub fn fingerprint_span(span: &Span) -> Option<String> {
    let op = span.op()?;
    let description = span.description()?;

    let mut hasher = Sha1::new();
    hasher.update(op.as_bytes());
    hasher.update(description.as_bytes());
    let full_fingerprint = format!("{:x}", hasher.finalize());

    Some(full_fingerprint[..FINGERPRINT_HEX_LEN].to_string())
}

/// Coarse fingerprint: the span op verbatim
pub fn fingerprint_span_op(span: &Span) -> Option<String> {
    span.op().map(str::to_string)
}

/// Convert epoch seconds to a duration with microsecond resolution
pub fn seconds_to_duration(seconds: f64) -> Duration {
    if !seconds.is_finite() {
        return Duration::zero();
    }
    Duration::microseconds((seconds * 1_000_000.0).round() as i64)
}

/// Convert a millisecond threshold to a duration
pub fn millis_to_duration(millis: f64) -> Duration {
    seconds_to_duration(millis / 1000.0)
}

/// Fractional milliseconds of a duration
pub fn duration_ms(duration: Duration) -> f64 {
    match duration.num_microseconds() {
        Some(micros) => micros as f64 / 1000.0,
        None => duration.num_milliseconds() as f64,
    }
}

/// End minus start. Zero and negative durations are passed through as-is.
pub fn span_duration(span: &Span) -> Duration {
    seconds_to_duration(span.timestamp) - seconds_to_duration(span.start_timestamp)
}

/// First allowed prefix the op starts with.
///
/// An empty allow-list matches every op; the op itself is then reported as
/// the matched prefix.
pub fn find_span_prefix<'a>(allowed_span_ops: &'a [String], span_op: &'a str) -> Option<&'a str> {
    if allowed_span_ops.is_empty() {
        return Some(span_op);
    }
    allowed_span_ops
        .iter()
        .find(|prefix| span_op.starts_with(prefix.as_str()))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_span_known_value() {
        let span = Span::new("db", "SELECT * FROM users WHERE id = %s", "a", 0.0, 0.1);
        assert_eq!(fingerprint_span(&span).as_deref(), Some("815550bb09c365c80ee2"));

        let span = Span::new("http.client", "GET /api/0/organizations/", "b", 0.0, 0.1);
        assert_eq!(fingerprint_span(&span).as_deref(), Some("33d6ff87a8deeeea7b63"));
    }

    #[test]
    fn test_fingerprint_span_is_deterministic() {
        let first = Span::new("db", "SELECT 1", "a", 0.0, 0.1);
        let second = Span::new("db", "SELECT 1", "b", 5.0, 9.0);
        let fp = fingerprint_span(&first).unwrap();
        assert_eq!(fp.len(), FINGERPRINT_HEX_LEN);
        assert_eq!(Some(fp), fingerprint_span(&second));

        let other = Span::new("db", "SELECT 2", "c", 0.0, 0.1);
        assert_ne!(fingerprint_span(&first), fingerprint_span(&other));
    }

    #[test]
    fn test_fingerprint_requires_op_and_description() {
        let mut span = Span::new("db", "SELECT 1", "a", 0.0, 0.1);
        span.description = None;
        assert_eq!(fingerprint_span(&span), None);
        assert_eq!(fingerprint_span_op(&span).as_deref(), Some("db"));

        span.description = Some("SELECT 1".to_string());
        span.op = None;
        assert_eq!(fingerprint_span(&span), None);
        assert_eq!(fingerprint_span_op(&span), None);
    }

    #[test]
    fn test_span_duration() {
        let span = Span::new("db", "SELECT 1", "a", 100.0, 100.25);
        assert_eq!(span_duration(&span), Duration::milliseconds(250));

        let backwards = Span::new("db", "SELECT 1", "a", 100.25, 100.0);
        assert_eq!(span_duration(&backwards), Duration::milliseconds(-250));
        assert_eq!(duration_ms(span_duration(&backwards)), -250.0);
    }

    #[test]
    fn test_find_span_prefix() {
        let allowed = vec!["db".to_string(), "http".to_string()];
        assert_eq!(find_span_prefix(&allowed, "db.query"), Some("db"));
        assert_eq!(find_span_prefix(&allowed, "http.client"), Some("http"));
        assert_eq!(find_span_prefix(&allowed, "ui.load"), None);

        let empty: Vec<String> = Vec::new();
        assert_eq!(find_span_prefix(&empty, "anything"), Some("anything"));

        // First listed prefix wins on overlap
        let overlapping = vec!["http".to_string(), "http.client".to_string()];
        assert_eq!(find_span_prefix(&overlapping, "http.client"), Some("http"));
    }
}
