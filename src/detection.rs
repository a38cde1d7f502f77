//! Orchestration of a detection pass.
//!
//! [`detect_performance_issues`] is the strict core: it validates settings,
//! builds fresh detectors, streams every span through them once and returns a
//! report. [`PerformanceDetection`] wraps it with sampling, timing, metrics and
//! the fail-soft boundary the ingestion pipeline relies on.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, error, info, warn};

use crate::detectors::{
    DuplicateSpanDetector, DuplicateSpanHashDetector, LongTaskSpanDetector, NPlusOneSpanDetector,
    PerformanceDetector, RenderBlockingAssetSpanDetector, SequentialSlowSpanDetector, SlowSpanDetector,
};
use crate::errors::DetectionError;
use crate::metrics::DetectionMetrics;
use crate::reporting::{report_for_detectors, DetectionReport};
use crate::settings::DetectionSettings;
use crate::span::{Span, TransactionEvent};

/// Inputs resolved by the host before detection runs
#[derive(Debug, Clone)]
pub struct DetectionOptions {
    /// Fraction of transactions to analyze, 0.0..=1.0
    pub sample_rate: f64,
    pub settings: DetectionSettings,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            sample_rate: 1.0,
            settings: DetectionSettings::default(),
        }
    }
}

/// One fresh instance of every detector, in reporting order
pub fn build_detectors(settings: &DetectionSettings, event: &TransactionEvent) -> Vec<Box<dyn PerformanceDetector>> {
    vec![
        Box::new(DuplicateSpanDetector::new(settings)),
        Box::new(DuplicateSpanHashDetector::new(settings)),
        Box::new(SlowSpanDetector::new(settings)),
        Box::new(SequentialSlowSpanDetector::new(settings)),
        Box::new(LongTaskSpanDetector::new(settings)),
        Box::new(RenderBlockingAssetSpanDetector::new(settings, event)),
        Box::new(NPlusOneSpanDetector::new(settings)),
    ]
}

/// Stream every span through every detector once.
///
/// Each detector names the ordering it relies on through
/// [`PerformanceDetector::ordering_key`]. A span starting before an earlier
/// span with the same key is out of order for that detector and withheld from
/// it, so it is skipped rather than misgrouped. Other detectors still see it.
/// Returns the number of spans withheld from at least one detector.
pub fn run_detectors(detectors: &mut [Box<dyn PerformanceDetector>], spans: &[Span]) -> usize {
    let mut latest_starts: Vec<FxHashMap<String, f64>> = vec![FxHashMap::default(); detectors.len()];
    let mut out_of_order_spans = 0;

    for span in spans {
        let mut withheld = false;

        for (detector, latest_starts) in detectors.iter_mut().zip(latest_starts.iter_mut()) {
            if let Some(key) = detector.ordering_key(span) {
                match latest_starts.get_mut(key) {
                    Some(latest_start) if span.start_timestamp < *latest_start => {
                        withheld = true;
                        continue;
                    }
                    Some(latest_start) => *latest_start = span.start_timestamp,
                    None => {
                        latest_starts.insert(key.to_string(), span.start_timestamp);
                    }
                }
            }
            detector.visit_span(span);
        }

        if withheld {
            out_of_order_spans += 1;
        }
    }

    out_of_order_spans
}

/// Run all detectors over one transaction
pub fn detect_performance_issues(
    event: &TransactionEvent,
    settings: &DetectionSettings,
) -> Result<DetectionReport, DetectionError> {
    settings.validate()?;

    let mut detectors = build_detectors(settings, event);
    let out_of_order_spans = run_detectors(&mut detectors, &event.spans);
    if out_of_order_spans > 0 {
        warn!(
            event_id = event.event_id.as_deref().unwrap_or("unknown"),
            out_of_order_spans,
            "⚠️ Spans not sorted by start time, order-sensitive detectors skipped them"
        );
    }

    Ok(report_for_detectors(event, &detectors, out_of_order_spans))
}

/// Sampling decision: analyze when `roll` (uniform in [0, 1)) falls under the rate
pub fn should_sample(sample_rate: f64, roll: f64) -> bool {
    sample_rate > 0.0 && sample_rate > roll
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Fail-soft detection facade used by the ingestion pipeline
pub struct PerformanceDetection {
    options: DetectionOptions,
    metrics: Option<Arc<DetectionMetrics>>,
}

impl PerformanceDetection {
    pub fn new(options: DetectionOptions) -> Self {
        Self { options, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<DetectionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn options(&self) -> &DetectionOptions {
        &self.options
    }

    /// Roll the sampling dice for one transaction
    pub fn should_analyze(&self) -> bool {
        should_sample(self.options.sample_rate, rand::random::<f64>())
    }

    /// Sample, then analyze. `None` if skipped or if the pass failed.
    pub fn detect(&self, event: &TransactionEvent) -> Option<DetectionReport> {
        if !self.should_analyze() {
            return None;
        }
        self.analyze(event)
    }

    /// Analyze without sampling.
    ///
    /// Never fails and never panics: errors and panics inside the pass are
    /// logged, counted and turned into `None`.
    pub fn analyze(&self, event: &TransactionEvent) -> Option<DetectionReport> {
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| detect_performance_issues(event, &self.options.settings)))
            .unwrap_or_else(|payload| Err(DetectionError::Panicked(panic_message(payload))));
        let elapsed = started.elapsed();

        match outcome {
            Ok(report) => {
                if let Some(metrics) = &self.metrics {
                    metrics.observe_duration(elapsed.as_secs_f64());
                    metrics.record(&report);
                }
                if report.has_issues {
                    info!(
                        event_id = report.event_id.as_deref().unwrap_or("unknown"),
                        issue_count = report.issue_count,
                        elapsed_us = elapsed.as_micros() as u64,
                        "🔎 Performance issues detected"
                    );
                } else {
                    debug!(
                        event_id = report.event_id.as_deref().unwrap_or("unknown"),
                        spans = event.spans.len(),
                        "No performance issues"
                    );
                }
                Some(report)
            }
            Err(e) => {
                error!(
                    event_id = event.event_id.as_deref().unwrap_or("unknown"),
                    error_type = e.kind(),
                    "❌ Performance detection failed: {}",
                    e
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_error(&e);
                }
                None
            }
        }
    }

    /// Analyze independent transactions in parallel, one pass each.
    /// Results line up with `events`.
    pub fn detect_batch(&self, events: &[TransactionEvent]) -> Vec<Option<DetectionReport>> {
        events.par_iter().map(|event| self.detect(event)).collect()
    }
}
