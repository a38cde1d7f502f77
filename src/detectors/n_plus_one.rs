use rustc_hash::FxHashMap;
use tracing::debug;

use super::{matching_op, settings_for_span, DetectorType, IssueStore, PerformanceDetector, PerformanceSpanIssue};
use crate::settings::{DetectionSettings, NPlusOneSpanSettings};
use crate::span::{fingerprint_span_op, millis_to_duration, seconds_to_duration, Span};

/// Finds bursts of near-concurrent calls with the same op, the signature of a
/// missing batch endpoint.
///
/// Non-greedy: only the first `count` spans of the first qualifying burst per
/// op are reported, not the whole burst and not later bursts. Spans of one op
/// must arrive in ascending `start_timestamp` order.
#[derive(Debug)]
pub struct NPlusOneSpanDetector {
    settings: Vec<NPlusOneSpanSettings>,
    spans_involved: FxHashMap<String, Vec<String>>,
    most_recent_start_time: FxHashMap<String, f64>,
    stored_issues: IssueStore,
}

impl NPlusOneSpanDetector {
    pub fn new(settings: &DetectionSettings) -> Self {
        let mut detector = Self {
            settings: settings.n_plus_one_spans.clone(),
            spans_involved: FxHashMap::default(),
            most_recent_start_time: FxHashMap::default(),
            stored_issues: IssueStore::new(),
        };
        detector.init();
        detector
    }
}

impl PerformanceDetector for NPlusOneSpanDetector {
    fn detector_type(&self) -> DetectorType {
        DetectorType::NPlusOneSpans
    }

    fn init(&mut self) {
        self.spans_involved.clear();
        self.most_recent_start_time.clear();
        self.stored_issues.clear();
    }

    fn visit_span(&mut self, span: &Span) {
        let Some(ctx) = settings_for_span(&self.settings, span) else {
            return;
        };
        let Some(fingerprint) = fingerprint_span_op(span) else {
            return;
        };

        let start_time_threshold = millis_to_duration(ctx.settings.start_time_threshold);
        let previous_start = self
            .most_recent_start_time
            .insert(fingerprint.clone(), span.start_timestamp);

        // The first span of an op always opens a new group
        let is_sequential = match previous_start {
            Some(previous_start) => {
                seconds_to_duration(span.start_timestamp - previous_start) >= start_time_threshold
            }
            None => true,
        };

        let involved = self.spans_involved.entry(fingerprint.clone()).or_default();
        if is_sequential {
            involved.clear();
            involved.push(ctx.span_id.to_string());
            return;
        }
        involved.push(ctx.span_id.to_string());

        if involved.len() >= ctx.settings.count {
            let recorded = self.stored_issues.insert_with(&fingerprint, || {
                PerformanceSpanIssue::new(ctx.span_id, ctx.op_prefix, involved.clone())
            });
            if recorded {
                debug!(op = %fingerprint, span_id = ctx.span_id, count = involved.len(), "🔂 N+1 spans detected");
            }
        }
    }

    fn stored_issues(&self) -> &IssueStore {
        &self.stored_issues
    }

    fn ordering_key<'a>(&self, span: &'a Span) -> Option<&'a str> {
        matching_op(&self.settings, span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(span_id: &str, start: f64) -> Span {
        Span::new("http.client", "GET /api/items/?id=%s", span_id, start, start + 0.2)
    }

    #[test]
    fn test_five_concurrent_calls_trigger_on_fifth() {
        let mut detector = NPlusOneSpanDetector::new(&DetectionSettings::default());
        let starts = [10.000, 10.001, 10.002, 10.003];
        for (i, start) in starts.iter().enumerate() {
            detector.visit_span(&call(&format!("c{}", i), *start));
        }
        assert!(detector.stored_issues().is_empty());

        detector.visit_span(&call("c4", 10.004));
        let issue = detector.stored_issues().get("http.client").unwrap();
        assert_eq!(issue.span_id, "c4");
        assert_eq!(issue.allowed_op, "http.client");
        assert_eq!(issue.spans_involved, vec!["c0", "c1", "c2", "c3", "c4"]);
    }

    #[test]
    fn test_large_gap_restarts_group() {
        let mut detector = NPlusOneSpanDetector::new(&DetectionSettings::default());
        detector.visit_span(&call("c0", 10.000));
        detector.visit_span(&call("c1", 10.001));
        // 10ms after c1
        detector.visit_span(&call("c2", 10.011));
        detector.visit_span(&call("c3", 10.012));
        detector.visit_span(&call("c4", 10.013));
        detector.visit_span(&call("c5", 10.014));
        assert!(detector.stored_issues().is_empty());

        detector.visit_span(&call("c6", 10.015));
        let issue = detector.stored_issues().get("http.client").unwrap();
        assert_eq!(issue.spans_involved, vec!["c2", "c3", "c4", "c5", "c6"]);
    }

    #[test]
    fn test_only_first_burst_is_reported() {
        let mut detector = NPlusOneSpanDetector::new(&DetectionSettings::default());
        for i in 0..8 {
            detector.visit_span(&call(&format!("a{}", i), 10.0 + i as f64 * 0.001));
        }
        for i in 0..8 {
            detector.visit_span(&call(&format!("b{}", i), 20.0 + i as f64 * 0.001));
        }

        assert_eq!(detector.stored_issues().len(), 1);
        let issue = detector.stored_issues().get("http.client").unwrap();
        assert_eq!(issue.span_id, "a4");
        assert_eq!(issue.spans_involved.len(), 5);
    }

    #[test]
    fn test_sequential_calls_do_not_trigger() {
        let mut detector = NPlusOneSpanDetector::new(&DetectionSettings::default());
        for i in 0..10 {
            detector.visit_span(&call(&format!("c{}", i), 10.0 + i as f64 * 0.25));
        }
        assert!(detector.stored_issues().is_empty());
    }

    #[test]
    fn test_db_spans_are_not_considered() {
        let mut detector = NPlusOneSpanDetector::new(&DetectionSettings::default());
        for i in 0..10 {
            detector.visit_span(&Span::new("db", "SELECT 1", &format!("d{}", i), 10.0, 10.1));
        }
        assert!(detector.stored_issues().is_empty());
    }
}
