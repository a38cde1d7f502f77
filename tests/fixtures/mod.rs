#![allow(dead_code)]

use span_inspector::span::{Span, TransactionEvent, FCP_MEASUREMENT};

/// Transaction start used by every fixture (2023-11-14T22:13:20Z)
pub const TX_START: f64 = 1_700_000_000.0;

/// Create a span positioned relative to the fixture transaction start
pub fn create_span(op: &str, description: &str, span_id: &str, start_offset_ms: f64, duration_ms: f64) -> Span {
    let start = TX_START + start_offset_ms / 1000.0;
    Span::new(op, description, span_id, start, start + duration_ms / 1000.0)
}

/// `count` spans with the same op and description, laid out back to back with
/// `gap_ms` between the end of one and the start of the next
pub fn create_repeated_spans(
    op: &str,
    description: &str,
    id_prefix: &str,
    count: usize,
    duration_ms: f64,
    gap_ms: f64,
) -> Vec<Span> {
    (0..count)
        .map(|i| {
            let offset = i as f64 * (duration_ms + gap_ms);
            create_span(op, description, &format!("{}{}", id_prefix, i), offset, duration_ms)
        })
        .collect()
}

/// Near-concurrent http.client calls, 1ms apart, the typical N+1 shape
pub fn create_n_plus_one_burst(id_prefix: &str, count: usize, start_offset_ms: f64) -> Vec<Span> {
    (0..count)
        .map(|i| {
            create_span(
                "http.client",
                "GET /api/0/projects/?id=%s",
                &format!("{}{}", id_prefix, i),
                start_offset_ms + i as f64,
                20.0,
            )
        })
        .collect()
}

/// Create a transaction from spans, sorted by start time the way the
/// ingestion pipeline delivers them
pub fn create_transaction(event_id: &str, mut spans: Vec<Span>) -> TransactionEvent {
    spans.sort_by(|a, b| a.start_timestamp.total_cmp(&b.start_timestamp));
    TransactionEvent::new(event_id, 1, TX_START, spans)
}

/// Same as [`create_transaction`] with an FCP measurement in milliseconds
pub fn create_browser_transaction(event_id: &str, spans: Vec<Span>, fcp_ms: f64) -> TransactionEvent {
    create_transaction(event_id, spans).with_measurement(FCP_MEASUREMENT, fcp_ms, Some("millisecond"))
}
