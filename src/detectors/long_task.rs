use chrono::Duration;
use tracing::debug;

use super::{settings_for_span, DetectorType, IssueStore, PerformanceDetector, PerformanceSpanIssue};
use crate::settings::{DetectionSettings, LongTaskSpanSettings};
use crate::span::{fingerprint_span, millis_to_duration, Span};

/// Sums browser long-task spans across the whole transaction.
///
/// The accumulator is global to the detector, not per fingerprint. Once the
/// total crosses the threshold, every qualifying span from then on records an
/// issue under its own fingerprint (if that fingerprint has none yet).
#[derive(Debug)]
pub struct LongTaskSpanDetector {
    settings: Vec<LongTaskSpanSettings>,
    cumulative_duration: Duration,
    spans_involved: Vec<String>,
    stored_issues: IssueStore,
}

impl LongTaskSpanDetector {
    pub fn new(settings: &DetectionSettings) -> Self {
        let mut detector = Self {
            settings: settings.long_task_spans.clone(),
            cumulative_duration: Duration::zero(),
            spans_involved: Vec::new(),
            stored_issues: IssueStore::new(),
        };
        detector.init();
        detector
    }

    /// Total long-task time seen so far in this run
    pub fn cumulative_duration(&self) -> Duration {
        self.cumulative_duration
    }
}

impl PerformanceDetector for LongTaskSpanDetector {
    fn detector_type(&self) -> DetectorType {
        DetectorType::LongTaskSpans
    }

    fn init(&mut self) {
        self.cumulative_duration = Duration::zero();
        self.spans_involved.clear();
        self.stored_issues.clear();
    }

    fn visit_span(&mut self, span: &Span) {
        let Some(ctx) = settings_for_span(&self.settings, span) else {
            return;
        };
        let Some(fingerprint) = fingerprint_span(span) else {
            return;
        };

        let Some(cumulative_duration) = self.cumulative_duration.checked_add(&ctx.duration) else {
            debug!(span_id = ctx.span_id, "Long task duration overflows running total, skipped");
            return;
        };
        self.cumulative_duration = cumulative_duration;
        self.spans_involved.push(ctx.span_id.to_string());

        if self.cumulative_duration < millis_to_duration(ctx.settings.cumulative_duration) {
            return;
        }

        let spans_involved = &self.spans_involved;
        let recorded = self.stored_issues.insert_with(&fingerprint, || {
            PerformanceSpanIssue::new(ctx.span_id, ctx.op_prefix, spans_involved.clone())
        });
        if recorded {
            debug!(
                fingerprint = %fingerprint,
                span_id = ctx.span_id,
                cumulative_ms = self.cumulative_duration.num_milliseconds(),
                "🧱 Long tasks detected"
            );
        }
    }

    fn stored_issues(&self) -> &IssueStore {
        &self.stored_issues
    }
}
