pub mod engine;
pub mod judge;
pub mod report;

use serde_json::Value;

use crate::observability::RawDatasetItem;

// ============================================================================
// Shared data model structs
// ============================================================================

/// How judge scores become a pass/fail decision for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    /// Scores in [0, 1]. The run passes when the mean reaches the threshold
    /// and no item falls below it.
    Continuous,
    /// Scores are 0 or 1. The run passes when the share of passing items
    /// reaches the threshold.
    Binary,
}

pub const ARCHIVED_STATUS: &str = "ARCHIVED";

/// One evaluation example, flattened out of the store's loosely typed item.
#[derive(Debug, Clone)]
pub struct DatasetItem {
    pub id: String,
    pub query: String,
    pub expected_output: String,
    pub domain: String,
    pub tipologia: String,
}

impl DatasetItem {
    pub fn is_archived(raw: &RawDatasetItem) -> bool {
        raw.status.as_deref() == Some(ARCHIVED_STATUS)
    }

    pub fn from_raw(raw: RawDatasetItem) -> Self {
        let query = match raw.input {
            Some(Value::Object(ref map)) => map.get("input").map(value_text).unwrap_or_default(),
            Some(ref other) => value_text(other),
            None => String::new(),
        };
        let expected_output = raw.expected_output.as_ref().map(value_text).unwrap_or_default();
        let metadata = raw.metadata.unwrap_or(Value::Null);
        let field = |key: &str| metadata.get(key).map(value_text).unwrap_or_default();
        let domain = field("domain");
        let tipologia = field("tipologia");

        DatasetItem {
            id: raw.id,
            query,
            expected_output,
            domain,
            tipologia,
        }
    }
}

/// Strings verbatim, null as empty, anything else as JSON text.
fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Outcome for one dataset item. Failed invocations and judge errors are
/// recorded as score 0 with the error as reasoning.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalRecord {
    pub query: String,
    pub score: f64,
    pub reasoning: String,
    pub domain: String,
    pub tipologia: String,
}

impl EvalRecord {
    pub fn passed(&self, min_score: f64) -> bool {
        self.score >= min_score
    }
}

/// Parameters of one run.
#[derive(Debug, Clone)]
pub struct EvalSettings {
    pub dataset: String,
    pub run_name: String,
    pub min_score: f64,
    pub mode: ScoringMode,
}

/// Default run name: `eval-YYYYmmdd-HHMMSS` in local time.
pub fn default_run_name() -> String {
    format!("eval-{}", chrono::Local::now().format("%Y%m%d-%H%M%S"))
}
