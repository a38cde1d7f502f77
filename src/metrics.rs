/// Prometheus counters for performance issue detection
///
/// Mirrors what the host pipeline used to emit after each detection pass:
/// per-detector issue counts, an aggregate count and a detected/not-detected
/// counter bucketed by project.
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use tracing::debug;

use crate::errors::DetectionError;
use crate::reporting::DetectionReport;

pub struct DetectionMetrics {
    registry: Registry,

    /// Issues found, by detector
    pub issues_total: IntCounterVec,
    /// Issues found, by detector and matched op prefix
    pub issues_by_op_total: IntCounterVec,
    pub issues_aggregate_total: IntCounter,
    /// One increment per analyzed transaction
    pub detected_total: IntCounterVec,
    pub detection_duration: Histogram,
    pub detection_errors_total: IntCounterVec,
}

impl DetectionMetrics {
    /// Create and register all detection counters on a fresh registry
    pub fn new() -> Result<Self, DetectionError> {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Result<Self, DetectionError> {
        let issues_total = IntCounterVec::new(
            Opts::new("performance_issue_total", "Performance issues detected per detector"),
            &["detector"],
        )?;

        let issues_by_op_total = IntCounterVec::new(
            Opts::new("performance_issue_by_op_total", "Performance issues detected per detector and span op"),
            &["detector", "allowed_op"],
        )?;

        let issues_aggregate_total = IntCounter::new(
            "performance_issue_aggregate_total",
            "Performance issues detected across all detectors",
        )?;

        let detected_total = IntCounterVec::new(
            Opts::new("performance_issue_detected_total", "Transactions analyzed, split by outcome"),
            &["has_issues", "project_id_bucket", "is_main_project"],
        )?;

        let detection_duration = Histogram::with_opts(
            HistogramOpts::new(
                "performance_detection_duration_seconds",
                "Time spent running all detectors over one transaction",
            )
            .buckets(vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05]),
        )?;

        let detection_errors_total = IntCounterVec::new(
            Opts::new("performance_detection_errors_total", "Detection passes aborted by an error"),
            &["error_type"],
        )?;

        registry.register(Box::new(issues_total.clone()))?;
        registry.register(Box::new(issues_by_op_total.clone()))?;
        registry.register(Box::new(issues_aggregate_total.clone()))?;
        registry.register(Box::new(detected_total.clone()))?;
        registry.register(Box::new(detection_duration.clone()))?;
        registry.register(Box::new(detection_errors_total.clone()))?;

        Ok(Self {
            registry,
            issues_total,
            issues_by_op_total,
            issues_aggregate_total,
            detected_total,
            detection_duration,
            detection_errors_total,
        })
    }

    /// Count the findings of one report
    pub fn record(&self, report: &DetectionReport) {
        for summary in report.detectors.iter().filter(|summary| summary.found) {
            let detector_key = summary.detector_type.key();
            self.issues_total
                .with_label_values(&[detector_key])
                .inc_by(summary.issue_count as u64);
            for entry in &summary.issues {
                self.issues_by_op_total
                    .with_label_values(&[detector_key, entry.issue.allowed_op.as_str()])
                    .inc();
            }
        }

        if report.has_issues {
            self.issues_aggregate_total.inc_by(report.issue_count as u64);
        }

        let bucket = report.project_id_bucket.to_string();
        self.detected_total
            .with_label_values(&[
                bool_label(report.has_issues),
                bucket.as_str(),
                bool_label(report.is_main_project),
            ])
            .inc();
    }

    pub fn observe_duration(&self, seconds: f64) {
        self.detection_duration.observe(seconds);
    }

    pub fn record_error(&self, error: &DetectionError) {
        self.detection_errors_total.with_label_values(&[error.kind()]).inc();
    }

    /// Text exposition of every registered metric
    pub fn gather_text(&self) -> Result<String, DetectionError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        debug!("📊 Encoded {} metric families", metric_families.len());
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn bool_label(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
