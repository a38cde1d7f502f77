use span_inspector::config::AppConfig;
use span_inspector::detection::PerformanceDetection;
use span_inspector::errors::DetectionError;
use span_inspector::logging::init_logging;
use span_inspector::metrics::DetectionMetrics;
use span_inspector::span::TransactionEvent;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Command line: `span_inspector [--config <path>] <event.json>...`
struct CliArgs {
    config_path: PathBuf,
    event_paths: Vec<PathBuf>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs, String> {
    let mut config_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    let mut event_paths = Vec::new();

    while let Some(arg) = args.next() {
        if arg == "--config" {
            let path = args.next().ok_or_else(|| "--config needs a path".to_string())?;
            config_path = PathBuf::from(path);
        } else {
            event_paths.push(PathBuf::from(arg));
        }
    }

    if event_paths.is_empty() {
        return Err("usage: span_inspector [--config <path>] <event.json>...".to_string());
    }
    Ok(CliArgs { config_path, event_paths })
}

/// An event file holds either one transaction or an array of them
fn load_events(path: &Path) -> Result<Vec<TransactionEvent>, DetectionError> {
    let contents = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&contents)?;
    if value.is_array() {
        Ok(serde_json::from_value(value)?)
    } else {
        Ok(vec![serde_json::from_value(value)?])
    }
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(2);
        }
    };

    // Pre-load configuration to get logging settings
    let config = if args.config_path.exists() {
        AppConfig::load(&args.config_path)?
    } else {
        eprintln!(
            "⚠️ {} not found. Using default configuration",
            args.config_path.display()
        );
        AppConfig::default()
    };

    init_logging(config.logging_config())?;

    let metrics = Arc::new(DetectionMetrics::new()?);
    let detection = PerformanceDetection::new(config.detection_options()).with_metrics(Arc::clone(&metrics));
    info!(
        sample_rate = detection.options().sample_rate,
        files = args.event_paths.len(),
        "🚀 Starting performance issue detection"
    );

    for path in &args.event_paths {
        let events = match load_events(path) {
            Ok(events) => events,
            Err(e) => {
                error!(path = %path.display(), "❌ Failed to load events: {}", e);
                continue;
            }
        };

        for (event, report) in events.iter().zip(detection.detect_batch(&events)) {
            match report {
                Some(report) => println!("{}", serde_json::to_string(&report)?),
                None => warn!(
                    event_id = event.event_id.as_deref().unwrap_or("unknown"),
                    "Transaction skipped by sampling or failed detection"
                ),
            }
        }
    }

    debug!("📊 Metrics:\n{}", metrics.gather_text()?);
    Ok(())
}
