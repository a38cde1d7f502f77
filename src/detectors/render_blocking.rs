use chrono::Duration;
use tracing::debug;

use super::{DetectorType, IssueStore, PerformanceDetector, PerformanceSpanIssue};
use crate::settings::{DetectionSettings, RenderBlockingAssetSettings};
use crate::span::{
    duration_ms, fingerprint_span, millis_to_duration, seconds_to_duration, span_duration, Measurement, Span,
    TransactionEvent, FCP_MEASUREMENT,
};

const MILLISECOND_UNIT: &str = "millisecond";

/// All allowed asset ops share one ordering
const ASSET_ORDERING_KEY: &str = "render_blocking_assets";

/// Flags scripts and stylesheets that finish loading before first contentful
/// paint and take up a large share of it.
///
/// Only active when the transaction reports an FCP inside the configured
/// window. Allowed asset spans must arrive in ascending start order: the first
/// one starting at or after FCP switches the detector off for the rest of the run.
#[derive(Debug)]
pub struct RenderBlockingAssetSpanDetector {
    settings: RenderBlockingAssetSettings,
    transaction_start: Duration,
    fcp_measurement: Option<Measurement>,
    /// FCP relative to transaction start; `None` once inert
    fcp: Option<Duration>,
    stored_issues: IssueStore,
}

impl RenderBlockingAssetSpanDetector {
    pub fn new(settings: &DetectionSettings, event: &TransactionEvent) -> Self {
        let mut detector = Self {
            settings: settings.render_blocking_asset_span.clone(),
            transaction_start: seconds_to_duration(event.start_timestamp),
            fcp_measurement: event.measurement(FCP_MEASUREMENT).cloned(),
            fcp: None,
            stored_issues: IssueStore::new(),
        };
        detector.init();
        detector
    }

    /// Whether FCP tracking is still live
    pub fn is_active(&self) -> bool {
        self.fcp.is_some()
    }

    /// FCP in range, or `None` if absent, zero, in a non-millisecond unit or
    /// outside `[fcp_minimum_threshold, fcp_maximum_threshold)`
    fn resolve_fcp(&self) -> Option<Duration> {
        let measurement = self.fcp_measurement.as_ref()?;
        let value = measurement.value.filter(|value| *value != 0.0 && value.is_finite())?;
        if let Some(unit) = measurement.unit.as_deref() {
            if unit != MILLISECOND_UNIT {
                debug!(unit, "FCP reported in unsupported unit, render-blocking detection inert");
                return None;
            }
        }

        let fcp = millis_to_duration(value);
        let minimum = millis_to_duration(self.settings.fcp_minimum_threshold);
        let maximum = millis_to_duration(self.settings.fcp_maximum_threshold);
        if fcp >= minimum && fcp < maximum {
            Some(fcp)
        } else {
            None
        }
    }

    fn is_allowed_op(&self, op: &str) -> bool {
        self.settings.allowed_span_ops.iter().any(|allowed| allowed == op)
    }

    fn is_blocking_render(&self, span: &Span, fcp: Duration, fcp_timestamp: Duration) -> bool {
        let span_end_timestamp = seconds_to_duration(span.timestamp);
        if span_end_timestamp >= fcp_timestamp {
            return false;
        }

        duration_ms(span_duration(span)) / duration_ms(fcp) > self.settings.fcp_ratio_threshold
    }
}

impl PerformanceDetector for RenderBlockingAssetSpanDetector {
    fn detector_type(&self) -> DetectorType {
        DetectorType::RenderBlockingAssetSpan
    }

    fn init(&mut self) {
        self.stored_issues.clear();
        self.fcp = self.resolve_fcp();
    }

    fn visit_span(&mut self, span: &Span) {
        let Some(fcp) = self.fcp else {
            return;
        };
        let Some(op) = span.op() else {
            return;
        };
        if !self.is_allowed_op(op) {
            return;
        }

        let fcp_timestamp = self.transaction_start + fcp;

        if self.is_blocking_render(span, fcp, fcp_timestamp) {
            if let (Some(span_id), Some(fingerprint)) = (span.span_id(), fingerprint_span(span)) {
                let recorded = self.stored_issues.insert_with(&fingerprint, || {
                    PerformanceSpanIssue::new(span_id, op, vec![span_id.to_string()])
                });
                if recorded {
                    debug!(fingerprint = %fingerprint, span_id, "🚧 Render-blocking asset detected");
                }
            }
        }

        // Everything render-blocking has been seen once a span starts after FCP
        if seconds_to_duration(span.start_timestamp) >= fcp_timestamp {
            self.fcp = None;
        }
    }

    fn stored_issues(&self) -> &IssueStore {
        &self.stored_issues
    }

    fn ordering_key<'a>(&self, span: &'a Span) -> Option<&'a str> {
        let op = span.op()?;
        (self.is_active() && self.is_allowed_op(op)).then_some(ASSET_ORDERING_KEY)
    }
}
