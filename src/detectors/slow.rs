use tracing::debug;

use super::{settings_for_span, DetectorType, IssueStore, PerformanceDetector, PerformanceSpanIssue};
use crate::settings::{DetectionSettings, SlowSpanSettings};
use crate::span::{fingerprint_span, millis_to_duration, Span};

/// Flags individual spans slower than the threshold for their op (e.g. slow db queries)
#[derive(Debug)]
pub struct SlowSpanDetector {
    settings: Vec<SlowSpanSettings>,
    stored_issues: IssueStore,
}

impl SlowSpanDetector {
    pub fn new(settings: &DetectionSettings) -> Self {
        let mut detector = Self {
            settings: settings.slow_span.clone(),
            stored_issues: IssueStore::new(),
        };
        detector.init();
        detector
    }
}

impl PerformanceDetector for SlowSpanDetector {
    fn detector_type(&self) -> DetectorType {
        DetectorType::SlowSpan
    }

    fn init(&mut self) {
        self.stored_issues.clear();
    }

    fn visit_span(&mut self, span: &Span) {
        let Some(ctx) = settings_for_span(&self.settings, span) else {
            return;
        };
        let Some(fingerprint) = fingerprint_span(span) else {
            return;
        };

        if ctx.duration < millis_to_duration(ctx.settings.duration_threshold) {
            return;
        }

        let recorded = self.stored_issues.insert_with(&fingerprint, || {
            PerformanceSpanIssue::new(ctx.span_id, ctx.op_prefix, vec![ctx.span_id.to_string()])
        });
        if recorded {
            debug!(
                fingerprint = %fingerprint,
                span_id = ctx.span_id,
                duration_ms = ctx.duration.num_milliseconds(),
                "🐢 Slow span detected"
            );
        }
    }

    fn stored_issues(&self) -> &IssueStore {
        &self.stored_issues
    }
}
