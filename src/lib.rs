//! Streaming performance issue detection over a transaction's spans.
//!
//! One pass, seven independent detectors, one report per transaction.

pub mod config;
pub mod detection;
pub mod detectors;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod reporting;
pub mod settings;
pub mod span;

pub use detection::{detect_performance_issues, DetectionOptions, PerformanceDetection};
pub use detectors::{DetectorType, PerformanceDetector, PerformanceSpanIssue};
pub use errors::DetectionError;
pub use reporting::DetectionReport;
pub use settings::DetectionSettings;
pub use span::{Span, TransactionEvent};
