//! Turns detector results into the tags and counts handed to the host pipeline.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::detectors::{DetectorType, PerformanceDetector, PerformanceSpanIssue};
use crate::span::TransactionEvent;

/// Transaction tag prefix for performance issue tags
pub const TAG_PREFIX: &str = "_pi_";

/// Projects treated as the "main" project for the detected counter
const MAIN_PROJECT_IDS: &[u64] = &[1];

/// An issue together with the key it was stored under
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FingerprintedIssue {
    pub fingerprint: String,
    pub issue: PerformanceSpanIssue,
}

/// Outcome of one detector for one transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorSummary {
    pub detector_type: DetectorType,
    pub found: bool,
    pub issue_count: usize,
    /// Grouping hash of the first issue, if the detector records one
    pub first_fingerprint: Option<String>,
    pub first_span_id: Option<String>,
    /// Distinct allowed ops across all issues, sorted
    pub allowed_ops: Vec<String>,
    pub issues: Vec<FingerprintedIssue>,
}

impl DetectorSummary {
    pub fn from_detector(detector: &dyn PerformanceDetector) -> Self {
        let stored_issues = detector.stored_issues();
        let first_issue = stored_issues.first().map(|(_, issue)| issue);

        let mut allowed_ops: Vec<String> = stored_issues.iter().map(|(_, issue)| issue.allowed_op.clone()).collect();
        allowed_ops.sort();
        allowed_ops.dedup();

        Self {
            detector_type: detector.detector_type(),
            found: !stored_issues.is_empty(),
            issue_count: stored_issues.len(),
            first_fingerprint: first_issue.and_then(|issue| issue.fingerprint.clone()),
            first_span_id: first_issue.map(|issue| issue.span_id.clone()),
            allowed_ops,
            issues: stored_issues
                .iter()
                .map(|(fingerprint, issue)| FingerprintedIssue {
                    fingerprint: fingerprint.to_string(),
                    issue: issue.clone(),
                })
                .collect(),
        }
    }
}

/// Everything a single detection pass produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    pub event_id: Option<String>,
    pub project_id: u64,
    /// One entry per detector, in detector construction order
    pub detectors: Vec<DetectorSummary>,
    pub issue_count: usize,
    pub has_issues: bool,
    /// Tags to set on the containing transaction
    pub tags: BTreeMap<String, String>,
    pub project_id_bucket: u64,
    pub is_main_project: bool,
    /// Spans withheld from order-sensitive detectors
    pub out_of_order_spans: usize,
}

impl DetectionReport {
    pub fn summary(&self, detector_type: DetectorType) -> Option<&DetectorSummary> {
        self.detectors.iter().find(|summary| summary.detector_type == detector_type)
    }

    /// Issues recorded by one detector, empty if it found nothing
    pub fn issues(&self, detector_type: DetectorType) -> &[FingerprintedIssue] {
        self.summary(detector_type)
            .map(|summary| summary.issues.as_slice())
            .unwrap_or(&[])
    }
}

/// Build the report for a finished run
pub fn report_for_detectors(
    event: &TransactionEvent,
    detectors: &[Box<dyn PerformanceDetector>],
    out_of_order_spans: usize,
) -> DetectionReport {
    let mut tags = BTreeMap::new();
    let mut issue_count = 0;
    let mut summaries = Vec::with_capacity(detectors.len());

    for detector in detectors {
        let summary = DetectorSummary::from_detector(detector.as_ref());
        let detector_key = summary.detector_type.key();

        if summary.found {
            issue_count += summary.issue_count;

            if let Some(fingerprint) = &summary.first_fingerprint {
                tags.insert(format!("{}{}_fp", TAG_PREFIX, detector_key), fingerprint.clone());
            }
            if let Some(span_id) = &summary.first_span_id {
                tags.insert(format!("{}{}", TAG_PREFIX, detector_key), span_id.clone());
            }
        }

        summaries.push(summary);
    }

    let has_issues = issue_count > 0;
    if has_issues {
        tags.insert(format!("{}all_issue_count", TAG_PREFIX), issue_count.to_string());
        if let Some(event_id) = &event.event_id {
            tags.insert(format!("{}transaction", TAG_PREFIX), event_id.clone());
        }
    }

    DetectionReport {
        event_id: event.event_id.clone(),
        project_id: event.project_id,
        detectors: summaries,
        issue_count,
        has_issues,
        tags,
        project_id_bucket: event.project_id % 10,
        is_main_project: MAIN_PROJECT_IDS.contains(&event.project_id),
        out_of_order_spans,
    }
}
