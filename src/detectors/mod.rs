//! Single-pass streaming detectors.
//!
//! Every detector is visited once per span, in transaction order, and keeps
//! whatever per-fingerprint state it needs until the run ends.

pub mod duplicate;
pub mod duplicate_hash;
pub mod issue;
pub mod long_task;
pub mod n_plus_one;
pub mod render_blocking;
pub mod sequential;
pub mod slow;

use chrono::Duration;
use serde::{Serialize, Serializer};

use crate::settings::SpanOpRule;
use crate::span::{find_span_prefix, span_duration, Span};

pub use duplicate::DuplicateSpanDetector;
pub use duplicate_hash::DuplicateSpanHashDetector;
pub use issue::{IssueStore, PerformanceSpanIssue};
pub use long_task::LongTaskSpanDetector;
pub use n_plus_one::NPlusOneSpanDetector;
pub use render_blocking::RenderBlockingAssetSpanDetector;
pub use sequential::SequentialSlowSpanDetector;
pub use slow::SlowSpanDetector;

/// Issue pattern a detector looks for. [`DetectorType::key`] doubles as the
/// serialized form, the tag and the metric label, so it has to stay short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DetectorType {
    SlowSpan,
    DuplicateSpansHash,
    DuplicateSpans,
    SequentialSlowSpans,
    LongTaskSpans,
    RenderBlockingAssetSpan,
    NPlusOneSpans,
}

impl DetectorType {
    pub fn all() -> &'static [DetectorType] {
        &[
            Self::DuplicateSpans,
            Self::DuplicateSpansHash,
            Self::SlowSpan,
            Self::SequentialSlowSpans,
            Self::LongTaskSpans,
            Self::RenderBlockingAssetSpan,
            Self::NPlusOneSpans,
        ]
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::SlowSpan => "slow_span",
            Self::DuplicateSpansHash => "dupes_hash",
            Self::DuplicateSpans => "duplicates",
            Self::SequentialSlowSpans => "sequential",
            Self::LongTaskSpans => "long_task",
            Self::RenderBlockingAssetSpan => "render_blocking_assets",
            Self::NPlusOneSpans => "n_plus_one",
        }
    }
}

impl Serialize for DetectorType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl std::fmt::Display for DetectorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Contract shared by all detectors.
///
/// Detectors hold their own state and never see each other. `visit_span` is
/// called exactly once per span and is never retried.
pub trait PerformanceDetector: Send {
    fn detector_type(&self) -> DetectorType;

    /// Reset per-run state
    fn init(&mut self);

    fn visit_span(&mut self, span: &Span);

    fn stored_issues(&self) -> &IssueStore;

    /// Key under which this detector needs spans in ascending start order.
    ///
    /// `None` when the span's position does not matter to the detector. The
    /// orchestrator withholds a span whose start precedes an earlier span with
    /// the same key.
    fn ordering_key<'a>(&self, _span: &'a Span) -> Option<&'a str> {
        None
    }
}

/// What a detector needs to know about a span once a threshold group applies
#[derive(Debug, Clone, Copy)]
pub struct SpanContext<'a, S> {
    pub op: &'a str,
    pub span_id: &'a str,
    /// Allowed prefix that matched `op`
    pub op_prefix: &'a str,
    pub duration: Duration,
    pub settings: &'a S,
}

/// Resolve the first threshold group whose allowed ops match the span.
///
/// Spans without an op or span id resolve to nothing and are skipped.
pub fn settings_for_span<'a, S: SpanOpRule>(groups: &'a [S], span: &'a Span) -> Option<SpanContext<'a, S>> {
    let op = span.op()?;
    let span_id = span.span_id()?;

    groups.iter().find_map(|settings| {
        find_span_prefix(settings.allowed_span_ops(), op).map(|op_prefix| SpanContext {
            op,
            span_id,
            op_prefix,
            duration: span_duration(span),
            settings,
        })
    })
}

/// The span's op, if any threshold group allows it
pub fn matching_op<'a, S: SpanOpRule>(groups: &[S], span: &'a Span) -> Option<&'a str> {
    let op = span.op()?;
    groups
        .iter()
        .any(|settings| find_span_prefix(settings.allowed_span_ops(), op).is_some())
        .then_some(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{DetectionSettings, SlowSpanSettings};

    #[test]
    fn test_settings_for_span_picks_matching_group() {
        let settings = DetectionSettings::default();
        let span = Span::new("http.client", "GET /", "s1", 10.0, 10.5);

        let ctx = settings_for_span(&settings.slow_span, &span).unwrap();
        assert_eq!(ctx.op, "http.client");
        assert_eq!(ctx.span_id, "s1");
        assert_eq!(ctx.op_prefix, "http");
        assert_eq!(ctx.settings.duration_threshold, 2000.0);
        assert_eq!(ctx.duration, Duration::milliseconds(500));
    }

    #[test]
    fn test_settings_for_span_skips_malformed_spans() {
        let settings = DetectionSettings::default();

        let mut no_id = Span::new("db", "SELECT 1", "s1", 0.0, 1.0);
        no_id.span_id = None;
        assert!(settings_for_span(&settings.slow_span, &no_id).is_none());

        let mut no_op = Span::new("db", "SELECT 1", "s1", 0.0, 1.0);
        no_op.op = None;
        assert!(settings_for_span(&settings.slow_span, &no_op).is_none());

        let unmatched = Span::new("ui.load", "render", "s1", 0.0, 1.0);
        assert!(settings_for_span(&settings.slow_span, &unmatched).is_none());
    }

    #[test]
    fn test_matching_op() {
        let settings = DetectionSettings::default();
        let span = Span::new("http.client", "GET /", "s1", 0.0, 1.0);
        assert_eq!(matching_op(&settings.n_plus_one_spans, &span), Some("http.client"));

        let unmatched = Span::new("db", "SELECT 1", "s2", 0.0, 1.0);
        assert_eq!(matching_op(&settings.n_plus_one_spans, &unmatched), None);
    }

    #[test]
    fn test_empty_allow_list_matches_everything() {
        let groups = vec![SlowSpanSettings {
            duration_threshold: 1.0,
            allowed_span_ops: Vec::new(),
        }];
        let span = Span::new("custom.op", "work", "s1", 0.0, 1.0);
        let ctx = settings_for_span(&groups, &span).unwrap();
        assert_eq!(ctx.op_prefix, "custom.op");
    }

    #[test]
    fn test_detector_type_keys() {
        let keys: Vec<&str> = DetectorType::all().iter().map(DetectorType::key).collect();
        assert_eq!(
            keys,
            vec!["duplicates", "dupes_hash", "slow_span", "sequential", "long_task", "render_blocking_assets", "n_plus_one"]
        );
        for detector_type in DetectorType::all() {
            assert_eq!(
                serde_json::to_string(detector_type).unwrap(),
                format!("\"{}\"", detector_type.key())
            );
        }
    }
}
