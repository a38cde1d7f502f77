use chrono::Duration;
use rustc_hash::FxHashMap;
use tracing::debug;

use super::{matching_op, settings_for_span, DetectorType, IssueStore, PerformanceDetector, PerformanceSpanIssue};
use crate::settings::{DetectionSettings, SequentialSlowSpanSettings};
use crate::span::{fingerprint_span_op, millis_to_duration, seconds_to_duration, Span};

/// Finds runs of slow, strictly back-to-back spans of the same op that could
/// have been issued in parallel.
///
/// Any overlap between two spans of the same op breaks the run: that op's
/// accumulator is discarded and the overlapping span is not counted.
#[derive(Debug)]
pub struct SequentialSlowSpanDetector {
    settings: Vec<SequentialSlowSpanSettings>,
    cumulative_durations: FxHashMap<String, Duration>,
    spans_involved: FxHashMap<String, Vec<String>>,
    /// End timestamp of the last counted span per op
    last_span_seen: FxHashMap<String, Duration>,
    stored_issues: IssueStore,
}

impl SequentialSlowSpanDetector {
    pub fn new(settings: &DetectionSettings) -> Self {
        let mut detector = Self {
            settings: settings.sequential_slow_spans.clone(),
            cumulative_durations: FxHashMap::default(),
            spans_involved: FxHashMap::default(),
            last_span_seen: FxHashMap::default(),
            stored_issues: IssueStore::new(),
        };
        detector.init();
        detector
    }
}

impl PerformanceDetector for SequentialSlowSpanDetector {
    fn detector_type(&self) -> DetectorType {
        DetectorType::SequentialSlowSpans
    }

    fn init(&mut self) {
        self.cumulative_durations.clear();
        self.spans_involved.clear();
        self.last_span_seen.clear();
        self.stored_issues.clear();
    }

    fn visit_span(&mut self, span: &Span) {
        let Some(ctx) = settings_for_span(&self.settings, span) else {
            return;
        };
        let Some(fingerprint) = fingerprint_span_op(span) else {
            return;
        };

        let span_end = seconds_to_duration(span.timestamp);
        let involved = self.spans_involved.entry(fingerprint.clone()).or_default();

        let Some(&last_span_end) = self.last_span_seen.get(&fingerprint) else {
            // First span of a run only seeds the accumulator
            involved.push(ctx.span_id.to_string());
            self.last_span_seen.insert(fingerprint.clone(), span_end);
            self.cumulative_durations.insert(fingerprint, ctx.duration);
            return;
        };

        let current_span_start = seconds_to_duration(span.start_timestamp);
        if current_span_start <= last_span_end {
            debug!(op = %fingerprint, span_id = ctx.span_id, "Overlapping span resets sequential run");
            self.last_span_seen.remove(&fingerprint);
            involved.clear();
            self.cumulative_durations.insert(fingerprint, Duration::zero());
            return;
        }

        let cumulative = self
            .cumulative_durations
            .entry(fingerprint.clone())
            .or_insert_with(Duration::zero);
        let Some(total) = cumulative.checked_add(&ctx.duration) else {
            debug!(op = %fingerprint, span_id = ctx.span_id, "Span duration overflows sequential total, skipped");
            return;
        };
        *cumulative = total;
        involved.push(ctx.span_id.to_string());
        self.last_span_seen.insert(fingerprint.clone(), span_end);

        if self.stored_issues.contains(&fingerprint) {
            return;
        }
        if involved.len() >= ctx.settings.count
            && *cumulative >= millis_to_duration(ctx.settings.cumulative_duration)
        {
            let count = involved.len();
            self.stored_issues.insert_with(&fingerprint, || {
                PerformanceSpanIssue::new(ctx.span_id, ctx.op_prefix, involved.clone())
            });
            debug!(op = %fingerprint, span_id = ctx.span_id, count, "⏳ Sequential slow spans detected");
        }
    }

    fn stored_issues(&self) -> &IssueStore {
        &self.stored_issues
    }

    fn ordering_key<'a>(&self, span: &'a Span) -> Option<&'a str> {
        matching_op(&self.settings, span)
    }
}
