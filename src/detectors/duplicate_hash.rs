use tracing::debug;

use super::duplicate::DuplicateTracker;
use super::{settings_for_span, DetectorType, IssueStore, PerformanceDetector, PerformanceSpanIssue};
use crate::settings::{DetectionSettings, DuplicateSpanSettings};
use crate::span::Span;

/// Duplicate detection keyed on the upstream span grouping hash instead of the
/// raw description, which catches parameterized repeats more accurately.
#[derive(Debug)]
pub struct DuplicateSpanHashDetector {
    settings: Vec<DuplicateSpanSettings>,
    tracker: DuplicateTracker,
    stored_issues: IssueStore,
}

impl DuplicateSpanHashDetector {
    pub fn new(settings: &DetectionSettings) -> Self {
        let mut detector = Self {
            settings: settings.duplicate_spans_hash.clone(),
            tracker: DuplicateTracker::default(),
            stored_issues: IssueStore::new(),
        };
        detector.init();
        detector
    }
}

impl PerformanceDetector for DuplicateSpanHashDetector {
    fn detector_type(&self) -> DetectorType {
        DetectorType::DuplicateSpansHash
    }

    fn init(&mut self) {
        self.tracker.clear();
        self.stored_issues.clear();
    }

    fn visit_span(&mut self, span: &Span) {
        let Some(ctx) = settings_for_span(&self.settings, span) else {
            return;
        };
        let Some(hash) = span.hash() else {
            return;
        };

        let Some(involved) = self.tracker.observe(hash, ctx.span_id, ctx.duration, ctx.settings) else {
            return;
        };

        let recorded = self.stored_issues.insert_with(hash, || {
            PerformanceSpanIssue::new(ctx.span_id, ctx.op_prefix, involved.to_vec()).with_fingerprint(hash)
        });
        if recorded {
            debug!(hash, span_id = ctx.span_id, count = involved.len(), "🔁 Duplicate hashed spans detected");
        }
    }

    fn stored_issues(&self) -> &IssueStore {
        &self.stored_issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashed_span(span_id: &str, description: &str, start: f64) -> Span {
        Span::new("http.client", description, span_id, start, start + 0.15).with_hash("a1b2c3d4e5f60718")
    }

    #[test]
    fn test_groups_by_hash_not_description() {
        let mut detector = DuplicateSpanHashDetector::new(&DetectionSettings::default());

        // Descriptions differ (different ids in the URL) but the hash is shared
        for i in 0..5 {
            detector.visit_span(&hashed_span(&format!("s{}", i), &format!("GET /users/{}", i), i as f64));
        }

        assert_eq!(detector.stored_issues().len(), 1);
        let issue = detector.stored_issues().get("a1b2c3d4e5f60718").unwrap();
        assert_eq!(issue.span_id, "s4");
        assert_eq!(issue.allowed_op, "http");
        assert_eq!(issue.fingerprint.as_deref(), Some("a1b2c3d4e5f60718"));
        assert_eq!(issue.spans_involved.len(), 5);
    }

    #[test]
    fn test_spans_without_hash_are_skipped() {
        let mut detector = DuplicateSpanHashDetector::new(&DetectionSettings::default());
        for i in 0..8 {
            let mut span = hashed_span(&format!("s{}", i), "GET /users", i as f64);
            span.hash = None;
            detector.visit_span(&span);
        }
        assert!(detector.stored_issues().is_empty());
    }

    #[test]
    fn test_db_spans_are_not_allowed() {
        let mut detector = DuplicateSpanHashDetector::new(&DetectionSettings::default());
        for i in 0..8 {
            let span = Span::new("db", "SELECT 1", &format!("s{}", i), i as f64, i as f64 + 0.5).with_hash("ffff");
            detector.visit_span(&span);
        }
        assert!(detector.stored_issues().is_empty());
    }
}
