use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::judge::{judge_response, JudgeModel, JudgeVerdict};
use super::report::{summarize, truncate_chars, EvalSummary};
use super::{DatasetItem, EvalRecord, EvalSettings};
use crate::agent::AgentRuntime;
use crate::config::{CORRECTNESS_SCORE_NAME, DATASET_RUN_TRACE_NAME, EVAL_ACTOR_ID};
use crate::error::ServiceError;
use crate::observability::{DatasetStore, NewTrace, ScoreRecord, TraceBackend};

/// Remote collaborators of an evaluation run.
#[derive(Clone)]
pub struct EvalClients {
    pub dataset: Arc<dyn DatasetStore>,
    pub traces: Arc<dyn TraceBackend>,
    pub agent: Arc<dyn AgentRuntime>,
    pub judge: Arc<dyn JudgeModel>,
}

#[derive(Debug, Clone)]
pub struct EvalOutcome {
    pub run_name: String,
    pub records: Vec<EvalRecord>,
    pub summary: EvalSummary,
    /// Items in the dataset, archived ones included.
    pub dataset_total: usize,
}

/// Active items of `dataset` in store order, plus the dataset's full size.
pub async fn fetch_active_items(
    store: &dyn DatasetStore,
    dataset: &str,
) -> Result<(Vec<DatasetItem>, usize), ServiceError> {
    let raw = store.get_dataset_items(dataset).await?;
    let total = raw.len();
    let active = raw
        .into_iter()
        .filter(|item| !DatasetItem::is_archived(item))
        .map(DatasetItem::from_raw)
        .collect();
    Ok((active, total))
}

/// Evaluate every active item of the dataset, one at a time, in order.
///
/// Only the dataset fetch can fail the run. Every per-item failure becomes a
/// zero-score record, so the result has exactly one record per active item.
pub async fn run_eval(
    clients: &EvalClients,
    settings: &EvalSettings,
) -> Result<EvalOutcome, ServiceError> {
    let (items, dataset_total) =
        match fetch_active_items(clients.dataset.as_ref(), &settings.dataset).await {
            Ok(fetched) => fetched,
            Err(e) => {
                error!("Failed to load dataset '{}': {}", settings.dataset, e);
                return Err(e);
            }
        };

    info!(
        "Eval run started: run_name={}, judge={}, items={} (of {} total)",
        settings.run_name,
        clients.judge.model_id(),
        items.len(),
        dataset_total
    );
    println!("Running evaluation: {}", settings.run_name);
    println!("Items: {} (of {} total)", items.len(), dataset_total);
    println!("{}", "=".repeat(60));

    let mut records = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        println!(
            "\n[{}/{}] [{}|{}] \"{}\"",
            i + 1,
            items.len(),
            item.domain,
            item.tipologia,
            truncate_chars(&item.query, 60)
        );
        records.push(evaluate_item(clients, settings, item).await);
    }

    let summary = summarize(&records, settings.min_score, settings.mode);
    info!(
        "Eval run completed: run_name={}, passing={}/{}",
        settings.run_name, summary.passing, summary.total
    );

    Ok(EvalOutcome {
        run_name: settings.run_name.clone(),
        records,
        summary,
        dataset_total,
    })
}

fn zero_record(item: &DatasetItem, reasoning: String) -> EvalRecord {
    EvalRecord {
        query: item.query.clone(),
        score: 0.0,
        reasoning,
        domain: item.domain.clone(),
        tipologia: item.tipologia.clone(),
    }
}

/// Invoke, judge and record one item. Never fails.
pub async fn evaluate_item(
    clients: &EvalClients,
    settings: &EvalSettings,
    item: &DatasetItem,
) -> EvalRecord {
    let trace_id = open_item_trace(clients, settings, item).await;

    let session_id = uuid::Uuid::new_v4().to_string();
    println!("  Invoking agent...");
    let generation = match clients
        .agent
        .invoke(&item.query, &session_id, EVAL_ACTOR_ID)
        .await
    {
        Ok(text) => text,
        Err(e) => {
            warn!("Invocation failed for item {}: {}", item.id, e);
            println!("  ERROR: {}", e);
            return zero_record(item, format!("Runtime error: {}", e));
        }
    };

    let verdict = match judge_response(
        clients.judge.as_ref(),
        settings.mode,
        &item.query,
        &generation,
        &item.expected_output,
    )
    .await
    {
        Ok(v) => v,
        Err(e) => {
            warn!("Judging failed for item {}: {}", item.id, e);
            JudgeVerdict {
                score: 0.0,
                reasoning: format!("Judge error: {}", e),
            }
        }
    };

    if let Some(trace_id) = trace_id {
        record_on_trace(clients.traces.as_ref(), &trace_id, item, &generation, &verdict).await;
    }

    let record = EvalRecord {
        query: item.query.clone(),
        score: verdict.score,
        reasoning: verdict.reasoning,
        domain: item.domain.clone(),
        tipologia: item.tipologia.clone(),
    };
    println!(
        "  [{}] {:.2} - {}",
        if record.passed(settings.min_score) { "PASS" } else { "FAIL" },
        record.score,
        record.reasoning
    );
    record
}

/// Create the item's trace and attach it to the dataset run. `None` when the
/// backend refuses; the item is still evaluated.
async fn open_item_trace(
    clients: &EvalClients,
    settings: &EvalSettings,
    item: &DatasetItem,
) -> Option<String> {
    let mut trace = NewTrace::named(DATASET_RUN_TRACE_NAME);
    trace.input = Some(serde_json::json!({ "input": item.query }));
    let trace_id = match clients.traces.create_trace(trace).await {
        Ok(id) => id,
        Err(e) => {
            warn!("Could not create trace for item {}: {}", item.id, e);
            return None;
        }
    };

    if let Err(e) = clients
        .dataset
        .link_run_item(&settings.run_name, &item.id, &trace_id)
        .await
    {
        warn!(
            "Could not link trace {} to run '{}': {}",
            trace_id, settings.run_name, e
        );
    }
    Some(trace_id)
}

/// Store the agent's output and the verdict on the item's trace.
async fn record_on_trace(
    traces: &dyn TraceBackend,
    trace_id: &str,
    item: &DatasetItem,
    generation: &str,
    verdict: &JudgeVerdict,
) {
    let mut update = NewTrace::named(DATASET_RUN_TRACE_NAME);
    update.id = trace_id.to_string();
    update.input = Some(serde_json::json!({ "input": item.query }));
    update.output = Some(Value::String(generation.to_string()));
    if let Err(e) = traces.create_trace(update).await {
        warn!("Could not store output on trace {}: {}", trace_id, e);
    }

    let score = ScoreRecord {
        trace_id: trace_id.to_string(),
        name: CORRECTNESS_SCORE_NAME.to_string(),
        value: verdict.score,
        comment: Some(verdict.reasoning.clone()),
    };
    if let Err(e) = traces.create_score(score).await {
        warn!("Could not record score on trace {}: {}", trace_id, e);
    }
}
