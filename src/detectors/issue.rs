use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A detected performance problem within one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSpanIssue {
    /// Span that pushed the pattern over its thresholds
    pub span_id: String,
    /// Allowed op prefix the triggering span matched
    pub allowed_op: String,
    /// Span ids participating in the pattern, in visit order
    pub spans_involved: Vec<String>,
    /// Upstream grouping hash, when the detector keys on one
    pub fingerprint: Option<String>,
}

impl PerformanceSpanIssue {
    pub fn new(span_id: &str, allowed_op: &str, spans_involved: Vec<String>) -> Self {
        Self {
            span_id: span_id.to_string(),
            allowed_op: allowed_op.to_string(),
            spans_involved,
            fingerprint: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: &str) -> Self {
        self.fingerprint = Some(fingerprint.to_string());
        self
    }
}

/// Fingerprint-keyed issues of one detector.
///
/// Holds at most one issue per fingerprint; the first insert wins and is never
/// replaced. Iteration follows insertion order.
#[derive(Debug, Clone, Default)]
pub struct IssueStore {
    order: Vec<String>,
    issues: FxHashMap<String, PerformanceSpanIssue>,
}

impl IssueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.issues.contains_key(fingerprint)
    }

    /// Store the issue built by `make_issue` unless the fingerprint already has
    /// one. Returns whether an insert happened.
    pub fn insert_with<F>(&mut self, fingerprint: &str, make_issue: F) -> bool
    where
        F: FnOnce() -> PerformanceSpanIssue,
    {
        if self.issues.contains_key(fingerprint) {
            return false;
        }
        self.issues.insert(fingerprint.to_string(), make_issue());
        self.order.push(fingerprint.to_string());
        true
    }

    pub fn get(&self, fingerprint: &str) -> Option<&PerformanceSpanIssue> {
        self.issues.get(fingerprint)
    }

    /// Earliest recorded issue
    pub fn first(&self) -> Option<(&str, &PerformanceSpanIssue)> {
        self.iter().next()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PerformanceSpanIssue)> + '_ {
        self.order
            .iter()
            .filter_map(move |fingerprint| self.issues.get(fingerprint).map(|issue| (fingerprint.as_str(), issue)))
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.issues.clear();
    }
}
