use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Name of the first-contentful-paint measurement on a transaction
pub const FCP_MEASUREMENT: &str = "fcp";

/// One timed operation within a transaction trace.
///
/// Field names follow the event payload so spans deserialize straight from the
/// ingested JSON. Timestamps are seconds since the epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Dotted operation name, e.g. `db.query` or `http.client`
    pub op: Option<String>,
    pub description: Option<String>,
    pub span_id: Option<String>,
    #[serde(default)]
    pub start_timestamp: f64,
    /// End timestamp
    #[serde(default)]
    pub timestamp: f64,
    /// Grouping hash computed upstream
    pub hash: Option<String>,
    /// Free-form span data block
    pub data: Option<serde_json::Value>,
}

impl Span {
    /// Create a span with the fields every detector looks at
    pub fn new(op: &str, description: &str, span_id: &str, start_timestamp: f64, timestamp: f64) -> Self {
        Self {
            op: Some(op.to_string()),
            description: Some(description.to_string()),
            span_id: Some(span_id.to_string()),
            start_timestamp,
            timestamp,
            hash: None,
            data: None,
        }
    }

    pub fn with_hash(mut self, hash: &str) -> Self {
        self.hash = Some(hash.to_string());
        self
    }

    /// Operation name, treating an empty string as absent
    pub fn op(&self) -> Option<&str> {
        non_empty(&self.op)
    }

    pub fn description(&self) -> Option<&str> {
        non_empty(&self.description)
    }

    pub fn span_id(&self) -> Option<&str> {
        non_empty(&self.span_id)
    }

    pub fn hash(&self) -> Option<&str> {
        non_empty(&self.hash)
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}

/// A transaction-level measurement such as `fcp`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: Option<f64>,
    /// Unit reported by the SDK; absent means milliseconds
    pub unit: Option<String>,
}

/// The span owner: one ingested transaction event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub event_id: Option<String>,
    #[serde(default)]
    pub project_id: u64,
    #[serde(default)]
    pub start_timestamp: f64,
    /// Spans in arrival order, expected ascending by `start_timestamp`
    #[serde(default)]
    pub spans: Vec<Span>,
    #[serde(default)]
    pub measurements: FxHashMap<String, Measurement>,
}

impl TransactionEvent {
    pub fn new(event_id: &str, project_id: u64, start_timestamp: f64, spans: Vec<Span>) -> Self {
        Self {
            event_id: Some(event_id.to_string()),
            project_id,
            start_timestamp,
            spans,
            measurements: FxHashMap::default(),
        }
    }

    /// Attach a measurement, replacing any previous value under the same name
    pub fn with_measurement(mut self, name: &str, value: f64, unit: Option<&str>) -> Self {
        self.measurements.insert(
            name.to_string(),
            Measurement {
                value: Some(value),
                unit: unit.map(str::to_string),
            },
        );
        self
    }

    pub fn measurement(&self, name: &str) -> Option<&Measurement> {
        self.measurements.get(name)
    }

    /// Parse an event from its JSON payload
    pub fn from_json(payload: &str) -> Result<Self, crate::errors::DetectionError> {
        Ok(serde_json::from_str(payload)?)
    }
}
