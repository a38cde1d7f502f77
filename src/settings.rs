//! Per-detector thresholds and allowed operation prefixes.
//!
//! Durations are milliseconds. Allowed span ops are prefixes: `http` matches a
//! span whose op is `http.client`. The one exception is the render-blocking
//! group, whose ops must match exactly.

use serde::{Deserialize, Serialize};

use crate::errors::{invalid_settings, DetectionError};

/// Anything carrying an allow-list of span op prefixes
pub trait SpanOpRule {
    fn allowed_span_ops(&self) -> &[String];
}

/// Thresholds shared by both duplicate-span detectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateSpanSettings {
    /// Minimum number of identical spans
    pub count: usize,
    /// Minimum summed duration of those spans (ms)
    pub cumulative_duration: f64,
    pub allowed_span_ops: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequentialSlowSpanSettings {
    pub count: usize,
    pub cumulative_duration: f64,
    pub allowed_span_ops: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowSpanSettings {
    /// Single-span duration that counts as slow (ms)
    pub duration_threshold: f64,
    pub allowed_span_ops: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongTaskSpanSettings {
    pub cumulative_duration: f64,
    pub allowed_span_ops: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderBlockingAssetSettings {
    /// Lower bound of the FCP window (inclusive, ms)
    pub fcp_minimum_threshold: f64,
    /// Upper bound of the FCP window (exclusive, ms)
    pub fcp_maximum_threshold: f64,
    /// Span duration must exceed this fraction of FCP
    pub fcp_ratio_threshold: f64,
    pub allowed_span_ops: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NPlusOneSpanSettings {
    pub count: usize,
    /// Start-time gap below which two spans count as concurrent (ms)
    pub start_time_threshold: f64,
    pub allowed_span_ops: Vec<String>,
}

macro_rules! impl_span_op_rule {
    ($($settings:ty),* $(,)?) => {
        $(
            impl SpanOpRule for $settings {
                fn allowed_span_ops(&self) -> &[String] {
                    &self.allowed_span_ops
                }
            }
        )*
    };
}

impl_span_op_rule!(
    DuplicateSpanSettings,
    SequentialSlowSpanSettings,
    SlowSpanSettings,
    LongTaskSpanSettings,
    RenderBlockingAssetSettings,
    NPlusOneSpanSettings,
);

/// Full settings table handed to a detection run. Never mutated during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub duplicate_spans: Vec<DuplicateSpanSettings>,
    pub duplicate_spans_hash: Vec<DuplicateSpanSettings>,
    pub sequential_slow_spans: Vec<SequentialSlowSpanSettings>,
    pub slow_span: Vec<SlowSpanSettings>,
    pub long_task_spans: Vec<LongTaskSpanSettings>,
    pub render_blocking_asset_span: RenderBlockingAssetSettings,
    pub n_plus_one_spans: Vec<NPlusOneSpanSettings>,
}

fn ops(prefixes: &[&str]) -> Vec<String> {
    prefixes.iter().map(|prefix| prefix.to_string()).collect()
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            duplicate_spans: vec![DuplicateSpanSettings {
                count: 5,
                cumulative_duration: 500.0,
                allowed_span_ops: ops(&["db", "http"]),
            }],
            duplicate_spans_hash: vec![DuplicateSpanSettings {
                count: 5,
                cumulative_duration: 500.0,
                allowed_span_ops: ops(&["http"]),
            }],
            sequential_slow_spans: vec![SequentialSlowSpanSettings {
                count: 3,
                cumulative_duration: 1200.0,
                allowed_span_ops: ops(&["db", "http", "ui"]),
            }],
            slow_span: vec![
                SlowSpanSettings {
                    duration_threshold: 1000.0,
                    allowed_span_ops: ops(&["db"]),
                },
                SlowSpanSettings {
                    duration_threshold: 2000.0,
                    allowed_span_ops: ops(&["http"]),
                },
            ],
            long_task_spans: vec![LongTaskSpanSettings {
                cumulative_duration: 500.0,
                allowed_span_ops: ops(&["ui.long-task", "ui.sentry.long-task"]),
            }],
            render_blocking_asset_span: RenderBlockingAssetSettings {
                fcp_minimum_threshold: 2000.0,
                fcp_maximum_threshold: 10000.0,
                fcp_ratio_threshold: 0.25,
                allowed_span_ops: ops(&["resource.link", "resource.script"]),
            },
            n_plus_one_spans: vec![NPlusOneSpanSettings {
                count: 5,
                start_time_threshold: 5.0,
                allowed_span_ops: ops(&["http.client", "http.server"]),
            }],
        }
    }
}

fn check_millis(detector_key: &str, name: &str, value: f64) -> Result<(), DetectionError> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid_settings(
            detector_key,
            format!("{} must be a finite, non-negative number of milliseconds (got {})", name, value),
        ));
    }
    Ok(())
}

fn check_count(detector_key: &str, count: usize) -> Result<(), DetectionError> {
    if count == 0 {
        return Err(invalid_settings(detector_key, "count must be greater than zero"));
    }
    Ok(())
}

impl DetectionSettings {
    /// Reject thresholds that would make a detector fire on everything or never
    pub fn validate(&self) -> Result<(), DetectionError> {
        for group in self.duplicate_spans.iter() {
            check_count("duplicates", group.count)?;
            check_millis("duplicates", "cumulative_duration", group.cumulative_duration)?;
        }
        for group in self.duplicate_spans_hash.iter() {
            check_count("dupes_hash", group.count)?;
            check_millis("dupes_hash", "cumulative_duration", group.cumulative_duration)?;
        }
        for group in self.sequential_slow_spans.iter() {
            check_count("sequential", group.count)?;
            check_millis("sequential", "cumulative_duration", group.cumulative_duration)?;
        }
        for group in self.slow_span.iter() {
            check_millis("slow_span", "duration_threshold", group.duration_threshold)?;
        }
        for group in self.long_task_spans.iter() {
            check_millis("long_task", "cumulative_duration", group.cumulative_duration)?;
        }
        for group in self.n_plus_one_spans.iter() {
            check_count("n_plus_one", group.count)?;
            check_millis("n_plus_one", "start_time_threshold", group.start_time_threshold)?;
        }

        let render = &self.render_blocking_asset_span;
        check_millis("render_blocking_assets", "fcp_minimum_threshold", render.fcp_minimum_threshold)?;
        check_millis("render_blocking_assets", "fcp_maximum_threshold", render.fcp_maximum_threshold)?;
        if render.fcp_minimum_threshold >= render.fcp_maximum_threshold {
            return Err(invalid_settings(
                "render_blocking_assets",
                format!(
                    "empty FCP window [{}, {})",
                    render.fcp_minimum_threshold, render.fcp_maximum_threshold
                ),
            ));
        }
        if !(render.fcp_ratio_threshold > 0.0 && render.fcp_ratio_threshold <= 1.0) {
            return Err(invalid_settings(
                "render_blocking_assets",
                format!("fcp_ratio_threshold must be in (0, 1] (got {})", render.fcp_ratio_threshold),
            ));
        }

        Ok(())
    }
}
