mod common;

use std::sync::Arc;
use tempfile::TempDir;

use common::{item, EchoAgent, MemoryBackend, ScriptedJudge, StaticDataset};
use support_agent_evals::evaluation::engine::{run_eval, EvalClients};
use support_agent_evals::evaluation::report::write_csv;
use support_agent_evals::evaluation::{EvalSettings, ScoringMode};

fn settings(mode: ScoringMode) -> EvalSettings {
    EvalSettings {
        dataset: "italian-legal-eval".to_string(),
        run_name: "eval-test".to_string(),
        min_score: 0.5,
        mode,
    }
}

struct Harness {
    dataset: Arc<StaticDataset>,
    traces: Arc<MemoryBackend>,
    agent: Arc<EchoAgent>,
    clients: EvalClients,
}

fn harness(dataset: StaticDataset, traces: MemoryBackend, agent: EchoAgent, judge: ScriptedJudge) -> Harness {
    let dataset = Arc::new(dataset);
    let traces = Arc::new(traces);
    let agent = Arc::new(agent);
    let clients = EvalClients {
        dataset: dataset.clone(),
        traces: traces.clone(),
        agent: agent.clone(),
        judge: Arc::new(judge),
    };
    Harness {
        dataset,
        traces,
        agent,
        clients,
    }
}

fn four_items() -> StaticDataset {
    StaticDataset::new(vec![
        item("1", "Cos'è il legato?", "Disposizione a titolo particolare", "successioni", None),
        item("2", "Chi è il notaio?", "Pubblico ufficiale", "ordinamento", Some("ACTIVE")),
        item("3", "Vecchia domanda", "Obsoleta", "successioni", Some("ARCHIVED")),
        item("4", "Cos'è la donazione?", "Contratto liberale", "famiglia", None),
    ])
}

#[tokio::test]
async fn test_one_record_per_active_item_despite_failures() {
    let h = harness(
        four_items(),
        MemoryBackend::default(),
        EchoAgent::failing_on(&["Chi è il notaio?"]),
        ScriptedJudge::new(vec![Some(r#"{"score": 0.9, "reasoning": "ok"}"#), Some("not json")]),
    );

    let outcome = run_eval(&h.clients, &settings(ScoringMode::Continuous)).await.unwrap();

    assert_eq!(outcome.dataset_total, 4);
    assert_eq!(outcome.records.len(), 3);
    let queries: Vec<&str> = outcome.records.iter().map(|r| r.query.as_str()).collect();
    assert_eq!(queries, vec!["Cos'è il legato?", "Chi è il notaio?", "Cos'è la donazione?"]);
    assert_eq!(outcome.records[0].score, 0.9);
}

#[tokio::test]
async fn test_runtime_failure_scores_zero() {
    let h = harness(
        four_items(),
        MemoryBackend::default(),
        EchoAgent::failing_on(&["Chi è il notaio?"]),
        ScriptedJudge::new(vec![
            Some(r#"{"score": 1.0, "reasoning": "ok"}"#),
            Some(r#"{"score": 1.0, "reasoning": "ok"}"#),
        ]),
    );

    let outcome = run_eval(&h.clients, &settings(ScoringMode::Continuous)).await.unwrap();

    let failed = &outcome.records[1];
    assert_eq!(failed.score, 0.0);
    assert!(failed.reasoning.starts_with("Runtime error:"));
    assert_eq!(failed.domain, "ordinamento");
}

#[tokio::test]
async fn test_judge_failures_score_zero() {
    let h = harness(
        four_items(),
        MemoryBackend::default(),
        EchoAgent::default(),
        ScriptedJudge::new(vec![Some("The response is excellent."), None, Some(r#"{"score": 0.7}"#)]),
    );

    let outcome = run_eval(&h.clients, &settings(ScoringMode::Continuous)).await.unwrap();

    for record in &outcome.records[..2] {
        assert_eq!(record.score, 0.0);
        assert!(record.reasoning.starts_with("Judge error:"), "{}", record.reasoning);
    }
    assert_eq!(outcome.records[2].score, 0.7);
}

#[tokio::test]
async fn test_archived_items_never_invoked() {
    let h = harness(
        four_items(),
        MemoryBackend::default(),
        EchoAgent::default(),
        ScriptedJudge::new(vec![]),
    );

    run_eval(&h.clients, &settings(ScoringMode::Continuous)).await.unwrap();

    let prompts = h.agent.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(!prompts.iter().any(|p| p == "Vecchia domanda"));
}

#[tokio::test]
async fn test_each_invocation_gets_fresh_session() {
    let h = harness(
        four_items(),
        MemoryBackend::default(),
        EchoAgent::default(),
        ScriptedJudge::new(vec![]),
    );

    run_eval(&h.clients, &settings(ScoringMode::Continuous)).await.unwrap();

    let calls = h.agent.calls.lock().unwrap();
    assert_ne!(calls[0].1, calls[1].1);
    assert_ne!(calls[1].1, calls[2].1);
    assert!(calls.iter().all(|c| c.2 == "eval_runner"));
}

#[tokio::test]
async fn test_scores_recorded_on_linked_traces() {
    let h = harness(
        four_items(),
        MemoryBackend::default(),
        EchoAgent::failing_on(&["Chi è il notaio?"]),
        ScriptedJudge::new(vec![
            Some(r#"{"score": 0.8, "reasoning": "buono"}"#),
            Some(r#"{"score": 0.3, "reasoning": "parziale"}"#),
        ]),
    );

    run_eval(&h.clients, &settings(ScoringMode::Continuous)).await.unwrap();

    let links = h.dataset.links.lock().unwrap();
    assert_eq!(links.len(), 3);
    assert!(links.iter().all(|(run, _, _)| run == "eval-test"));

    // The failed invocation is never judged, so only two scores are written.
    let scores = h.traces.scores.lock().unwrap();
    assert_eq!(scores.len(), 2);
    assert_eq!(scores[0].name, "correctness");
    assert_eq!(scores[0].trace_id, links[0].2);
    assert_eq!(scores[0].comment.as_deref(), Some("buono"));
    assert_eq!(scores[1].trace_id, links[2].2);
}

#[tokio::test]
async fn test_trace_backend_failure_does_not_change_verdicts() {
    let h = harness(
        four_items(),
        MemoryBackend::failing_writes(),
        EchoAgent::default(),
        ScriptedJudge::new(vec![
            Some(r#"{"score": 1.0, "reasoning": "a"}"#),
            Some(r#"{"score": 1.0, "reasoning": "b"}"#),
            Some(r#"{"score": 1.0, "reasoning": "c"}"#),
        ]),
    );

    let outcome = run_eval(&h.clients, &settings(ScoringMode::Continuous)).await.unwrap();

    assert!(outcome.records.iter().all(|r| r.score == 1.0));
    assert!(h.dataset.links.lock().unwrap().is_empty());
    assert!(outcome.summary.passed());
}

#[tokio::test]
async fn test_dataset_fetch_failure_aborts_run() {
    let mut dataset = four_items();
    dataset.fail = true;
    let h = harness(dataset, MemoryBackend::default(), EchoAgent::default(), ScriptedJudge::new(vec![]));

    assert!(run_eval(&h.clients, &settings(ScoringMode::Continuous)).await.is_err());
    assert!(h.agent.prompts().is_empty());
}

#[tokio::test]
async fn test_binary_mode_gates_on_accuracy() {
    let replies = vec![
        Some(r#"{"score": 1, "reasoning": "corretto"}"#),
        Some(r#"{"score": 0, "reasoning": "errato"}"#),
        Some(r#"{"score": 1, "reasoning": "corretto"}"#),
    ];

    let binary = harness(four_items(), MemoryBackend::default(), EchoAgent::default(), ScriptedJudge::new(replies.clone()));
    let outcome = run_eval(&binary.clients, &settings(ScoringMode::Binary)).await.unwrap();
    assert_eq!(outcome.summary.passing, 2);
    assert_eq!(outcome.summary.exit_code(), 0);

    let continuous = harness(four_items(), MemoryBackend::default(), EchoAgent::default(), ScriptedJudge::new(replies));
    let outcome = run_eval(&continuous.clients, &settings(ScoringMode::Continuous)).await.unwrap();
    assert_eq!(outcome.summary.exit_code(), 1);
}

#[tokio::test]
async fn test_csv_export_file() {
    let h = harness(
        four_items(),
        MemoryBackend::default(),
        EchoAgent::default(),
        ScriptedJudge::new(vec![
            Some(r#"{"score": 1.0, "reasoning": "completo"}"#),
            Some(r#"{"score": 0.0, "reasoning": "errato, nessuna fonte"}"#),
            Some(r#"{"score": 0.6, "reasoning": "parziale"}"#),
        ]),
    );
    let outcome = run_eval(&h.clients, &settings(ScoringMode::Continuous)).await.unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    write_csv(&path, &outcome.records, &outcome.summary, &outcome.run_name).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.ends_with(",,,eval-test\r\n"));
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "query,score,result,domain,tipologia,reasoning");
    assert_eq!(lines[1], "Cos'è il legato?,1.00,PASS,successioni,caso,completo");
    assert_eq!(lines[2], "Chi è il notaio?,0.00,FAIL,ordinamento,caso,\"errato, nessuna fonte\"");
    assert_eq!(lines[3], "Cos'è la donazione?,0.60,PASS,famiglia,caso,parziale");
    assert_eq!(lines[4], "");
    assert_eq!(lines[5], "SUMMARY,0.53,2/3 passing,,,eval-test");
}
