use chrono::Duration;
use rustc_hash::FxHashMap;
use tracing::debug;

use super::{settings_for_span, DetectorType, IssueStore, PerformanceDetector, PerformanceSpanIssue};
use crate::settings::{DetectionSettings, DuplicateSpanSettings};
use crate::span::{fingerprint_span, millis_to_duration, Span};

/// Running totals per grouping key, shared by both duplicate detectors
#[derive(Debug, Default)]
pub(crate) struct DuplicateTracker {
    cumulative_durations: FxHashMap<String, Duration>,
    spans_involved: FxHashMap<String, Vec<String>>,
}

impl DuplicateTracker {
    /// Count `span_id` under `key` and return the spans seen so far if the
    /// key now meets both thresholds. A span whose duration would overflow the
    /// running total is not counted.
    pub(crate) fn observe(
        &mut self,
        key: &str,
        span_id: &str,
        duration: Duration,
        settings: &DuplicateSpanSettings,
    ) -> Option<&[String]> {
        let cumulative = self
            .cumulative_durations
            .entry(key.to_string())
            .or_insert_with(Duration::zero);
        // A total past the Duration range means absurd timestamps; leave the key as it was
        let total = cumulative.checked_add(&duration)?;
        *cumulative = total;
        let cumulative = total;

        let involved = self.spans_involved.entry(key.to_string()).or_default();
        involved.push(span_id.to_string());

        let meets_thresholds = involved.len() >= settings.count
            && cumulative >= millis_to_duration(settings.cumulative_duration);
        if meets_thresholds {
            Some(involved.as_slice())
        } else {
            None
        }
    }

    pub(crate) fn clear(&mut self) {
        self.cumulative_durations.clear();
        self.spans_involved.clear();
    }
}

/// Broad check for the same span (same op and description) repeated many times
#[derive(Debug)]
pub struct DuplicateSpanDetector {
    settings: Vec<DuplicateSpanSettings>,
    tracker: DuplicateTracker,
    stored_issues: IssueStore,
}

impl DuplicateSpanDetector {
    pub fn new(settings: &DetectionSettings) -> Self {
        let mut detector = Self {
            settings: settings.duplicate_spans.clone(),
            tracker: DuplicateTracker::default(),
            stored_issues: IssueStore::new(),
        };
        detector.init();
        detector
    }
}

impl PerformanceDetector for DuplicateSpanDetector {
    fn detector_type(&self) -> DetectorType {
        DetectorType::DuplicateSpans
    }

    fn init(&mut self) {
        self.tracker.clear();
        self.stored_issues.clear();
    }

    fn visit_span(&mut self, span: &Span) {
        let Some(ctx) = settings_for_span(&self.settings, span) else {
            return;
        };
        let Some(fingerprint) = fingerprint_span(span) else {
            return;
        };

        let Some(involved) = self.tracker.observe(&fingerprint, ctx.span_id, ctx.duration, ctx.settings) else {
            return;
        };

        let recorded = self.stored_issues.insert_with(&fingerprint, || {
            PerformanceSpanIssue::new(ctx.span_id, ctx.op_prefix, involved.to_vec())
        });
        if recorded {
            debug!(
                fingerprint = %fingerprint,
                span_id = ctx.span_id,
                count = involved.len(),
                "🔁 Duplicate spans detected"
            );
        }
    }

    fn stored_issues(&self) -> &IssueStore {
        &self.stored_issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_span(span_id: &str, start: f64, duration_ms: f64) -> Span {
        Span::new("db", "SELECT * FROM users WHERE id = %s", span_id, start, start + duration_ms / 1000.0)
    }

    #[test]
    fn test_five_duplicates_trigger_one_issue() {
        let mut detector = DuplicateSpanDetector::new(&DetectionSettings::default());

        for i in 0..5 {
            detector.visit_span(&db_span(&format!("s{}", i), i as f64, 120.0));
        }
        assert_eq!(detector.stored_issues().len(), 1);

        let (fingerprint, issue) = detector.stored_issues().first().unwrap();
        assert_eq!(fingerprint, "815550bb09c365c80ee2");
        assert_eq!(issue.span_id, "s4");
        assert_eq!(issue.allowed_op, "db");
        assert_eq!(issue.spans_involved, vec!["s0", "s1", "s2", "s3", "s4"]);
        assert_eq!(issue.fingerprint, None);

        // A sixth identical span leaves the first issue untouched
        detector.visit_span(&db_span("s5", 5.0, 120.0));
        assert_eq!(detector.stored_issues().len(), 1);
        assert_eq!(detector.stored_issues().first().unwrap().1.span_id, "s4");
    }

    #[test]
    fn test_count_without_duration_does_not_trigger() {
        let mut detector = DuplicateSpanDetector::new(&DetectionSettings::default());
        for i in 0..5 {
            detector.visit_span(&db_span(&format!("s{}", i), i as f64, 50.0));
        }
        assert!(detector.stored_issues().is_empty());

        // Cumulative finally crosses 500ms on the 10th span
        for i in 5..10 {
            detector.visit_span(&db_span(&format!("s{}", i), i as f64, 50.0));
        }
        assert_eq!(detector.stored_issues().first().unwrap().1.span_id, "s9");
    }

    #[test]
    fn test_duration_without_count_does_not_trigger() {
        let mut detector = DuplicateSpanDetector::new(&DetectionSettings::default());
        for i in 0..4 {
            detector.visit_span(&db_span(&format!("s{}", i), i as f64, 900.0));
        }
        assert!(detector.stored_issues().is_empty());
    }

    #[test]
    fn test_disallowed_op_and_missing_description_are_ignored() {
        let mut detector = DuplicateSpanDetector::new(&DetectionSettings::default());
        for i in 0..6 {
            detector.visit_span(&Span::new("ui.render", "paint", &format!("u{}", i), i as f64, i as f64 + 0.2));
            let mut bare = db_span(&format!("b{}", i), i as f64, 200.0);
            bare.description = None;
            detector.visit_span(&bare);
        }
        assert!(detector.stored_issues().is_empty());
    }

    #[test]
    fn test_init_resets_state() {
        let mut detector = DuplicateSpanDetector::new(&DetectionSettings::default());
        for i in 0..5 {
            detector.visit_span(&db_span(&format!("s{}", i), i as f64, 120.0));
        }
        assert_eq!(detector.stored_issues().len(), 1);

        detector.init();
        assert!(detector.stored_issues().is_empty());
        detector.visit_span(&db_span("again", 0.0, 120.0));
        assert!(detector.stored_issues().is_empty());
    }

    #[test]
    fn test_absurd_timestamps_do_not_overflow_total() {
        let mut detector = DuplicateSpanDetector::new(&DetectionSettings::default());
        for i in 0..600 {
            detector.visit_span(&Span::new("db", "SELECT 1", &format!("s{}", i), -1e300, 1e300));
        }

        assert_eq!(detector.stored_issues().len(), 1);
        assert_eq!(detector.stored_issues().first().unwrap().1.span_id, "s4");
    }
}
