pub mod langfuse;
pub mod otel;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ServiceError;

// ============================================================================
// Tracing backend records
// ============================================================================

/// A trace as returned by the backend's list endpoint. Only the fields the
/// feedback lookup needs are kept.
#[derive(Debug, Clone, Deserialize)]
pub struct Trace {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub input: Option<Value>,
}

impl Trace {
    /// Recorded input as text: strings verbatim, anything else as JSON.
    pub fn input_text(&self) -> String {
        match &self.input {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TraceQuery {
    pub limit: u32,
    pub from_timestamp: Option<DateTime<Utc>>,
}

/// Trace to create (or update, when `id` already exists).
#[derive(Debug, Clone)]
pub struct NewTrace {
    pub id: String,
    pub name: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub input: Option<Value>,
    pub output: Option<Value>,
}

impl NewTrace {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            session_id: None,
            user_id: None,
            input: None,
            output: None,
        }
    }
}

/// Model invocation nested under a trace.
#[derive(Debug, Clone)]
pub struct NewGeneration {
    pub id: String,
    pub trace_id: String,
    pub name: String,
    pub input: Option<Value>,
    pub output: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub trace_id: String,
    pub name: String,
    pub value: f64,
    pub comment: Option<String>,
}

#[async_trait]
pub trait TraceBackend: Send + Sync {
    async fn list_traces(&self, query: &TraceQuery) -> Result<Vec<Trace>, ServiceError>;

    /// Returns the trace id.
    async fn create_trace(&self, trace: NewTrace) -> Result<String, ServiceError>;

    /// Returns the generation id.
    async fn create_generation(&self, generation: NewGeneration) -> Result<String, ServiceError>;

    async fn create_score(&self, score: ScoreRecord) -> Result<(), ServiceError>;
}

// ============================================================================
// Dataset store
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDatasetItem {
    pub id: String,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub expected_output: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
}

#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// All items of the dataset in store order, archived ones included.
    async fn get_dataset_items(&self, dataset: &str) -> Result<Vec<RawDatasetItem>, ServiceError>;

    /// Attach a trace to a named run over the dataset.
    async fn link_run_item(
        &self,
        run_name: &str,
        item_id: &str,
        trace_id: &str,
    ) -> Result<(), ServiceError>;
}
