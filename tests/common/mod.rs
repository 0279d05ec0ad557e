// In-memory stand-ins for the remote collaborators.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

use support_agent_evals::agent::AgentRuntime;
use support_agent_evals::error::ServiceError;
use support_agent_evals::evaluation::judge::JudgeModel;
use support_agent_evals::observability::{
    DatasetStore, NewGeneration, NewTrace, RawDatasetItem, ScoreRecord, Trace, TraceBackend,
    TraceQuery,
};

pub fn unavailable() -> ServiceError {
    ServiceError::Status {
        service: "test double",
        status: 503,
        body: "unavailable".to_string(),
    }
}

pub fn trace(id: &str, timestamp: DateTime<Utc>, input: &str) -> Trace {
    Trace {
        id: id.to_string(),
        timestamp,
        input: Some(json!(input)),
    }
}

/// Tracing backend that answers trace listings from a script and records
/// every write.
#[derive(Default)]
pub struct MemoryBackend {
    /// One entry per list call; `None` fails the call. Once drained, lists
    /// come back empty.
    pub list_script: Mutex<VecDeque<Option<Vec<Trace>>>>,
    pub list_queries: Mutex<Vec<TraceQuery>>,
    pub traces: Mutex<Vec<NewTrace>>,
    pub generations: Mutex<Vec<NewGeneration>>,
    pub scores: Mutex<Vec<ScoreRecord>>,
    pub fail_writes: bool,
}

impl MemoryBackend {
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    pub fn with_lists(script: Vec<Option<Vec<Trace>>>) -> Self {
        Self {
            list_script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_queries.lock().unwrap().len()
    }

    pub fn score_count(&self) -> usize {
        self.scores.lock().unwrap().len()
    }
}

#[async_trait]
impl TraceBackend for MemoryBackend {
    async fn list_traces(&self, query: &TraceQuery) -> Result<Vec<Trace>, ServiceError> {
        self.list_queries.lock().unwrap().push(query.clone());
        match self.list_script.lock().unwrap().pop_front() {
            Some(Some(traces)) => Ok(traces),
            Some(None) => Err(unavailable()),
            None => Ok(Vec::new()),
        }
    }

    async fn create_trace(&self, trace: NewTrace) -> Result<String, ServiceError> {
        if self.fail_writes {
            return Err(unavailable());
        }
        let id = trace.id.clone();
        self.traces.lock().unwrap().push(trace);
        Ok(id)
    }

    async fn create_generation(&self, generation: NewGeneration) -> Result<String, ServiceError> {
        if self.fail_writes {
            return Err(unavailable());
        }
        let id = generation.id.clone();
        self.generations.lock().unwrap().push(generation);
        Ok(id)
    }

    async fn create_score(&self, score: ScoreRecord) -> Result<(), ServiceError> {
        if self.fail_writes {
            return Err(unavailable());
        }
        self.scores.lock().unwrap().push(score);
        Ok(())
    }
}

pub struct StaticDataset {
    pub items: Vec<RawDatasetItem>,
    pub fail: bool,
    pub links: Mutex<Vec<(String, String, String)>>,
}

impl StaticDataset {
    pub fn new(items: Vec<RawDatasetItem>) -> Self {
        Self {
            items,
            fail: false,
            links: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DatasetStore for StaticDataset {
    async fn get_dataset_items(&self, _dataset: &str) -> Result<Vec<RawDatasetItem>, ServiceError> {
        if self.fail {
            return Err(ServiceError::Status {
                service: "test double",
                status: 404,
                body: "dataset not found".to_string(),
            });
        }
        Ok(self.items.clone())
    }

    async fn link_run_item(
        &self,
        run_name: &str,
        item_id: &str,
        trace_id: &str,
    ) -> Result<(), ServiceError> {
        self.links.lock().unwrap().push((
            run_name.to_string(),
            item_id.to_string(),
            trace_id.to_string(),
        ));
        Ok(())
    }
}

pub fn item(id: &str, query: &str, expected: &str, domain: &str, status: Option<&str>) -> RawDatasetItem {
    RawDatasetItem {
        id: id.to_string(),
        input: Some(json!({ "input": query })),
        expected_output: Some(Value::String(expected.to_string())),
        metadata: Some(json!({ "domain": domain, "tipologia": "caso" })),
        status: status.map(str::to_string),
    }
}

/// Agent that echoes the prompt, failing for prompts listed in `fail_on`.
#[derive(Default)]
pub struct EchoAgent {
    pub fail_on: Vec<String>,
    pub calls: Mutex<Vec<(String, String, String)>>,
}

impl EchoAgent {
    pub fn failing_on(prompts: &[&str]) -> Self {
        Self {
            fail_on: prompts.iter().map(|p| p.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|c| c.0.clone()).collect()
    }
}

#[async_trait]
impl AgentRuntime for EchoAgent {
    async fn invoke(
        &self,
        prompt: &str,
        session_id: &str,
        actor_id: &str,
    ) -> Result<String, ServiceError> {
        self.calls.lock().unwrap().push((
            prompt.to_string(),
            session_id.to_string(),
            actor_id.to_string(),
        ));
        if self.fail_on.iter().any(|p| p == prompt) {
            return Err(unavailable());
        }
        Ok(format!("answer to {}", prompt))
    }
}

/// Judge replying with queued raw texts; `None` fails the call.
pub struct ScriptedJudge {
    pub replies: Mutex<VecDeque<Option<String>>>,
}

impl ScriptedJudge {
    pub fn new(replies: Vec<Option<&str>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| r.map(str::to_string)).collect()),
        }
    }
}

#[async_trait]
impl JudgeModel for ScriptedJudge {
    async fn complete(&self, _prompt: &str) -> Result<String, ServiceError> {
        match self.replies.lock().unwrap().pop_front() {
            Some(Some(reply)) => Ok(reply),
            Some(None) | None => Err(unavailable()),
        }
    }

    fn model_id(&self) -> &str {
        "scripted-judge"
    }
}
