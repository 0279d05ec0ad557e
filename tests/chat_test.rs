mod common;

use std::sync::Arc;

use common::{trace, EchoAgent, MemoryBackend};
use support_agent_evals::agent::AgentRuntime;
use support_agent_evals::chat::ChatSession;
use support_agent_evals::feedback::finder::TraceFinder;
use support_agent_evals::feedback::logger::{InteractionLogger, LoggingMode};
use support_agent_evals::feedback::submit::FeedbackSubmitter;
use support_agent_evals::feedback::{Rating, TraceResolution};
use support_agent_evals::observability::TraceBackend;

fn session(agent: Arc<EchoAgent>, backend: Option<Arc<MemoryBackend>>, mode: LoggingMode) -> ChatSession {
    let backend: Option<Arc<dyn TraceBackend>> = backend.map(|b| b as Arc<dyn TraceBackend>);
    let logger = InteractionLogger::new(backend.clone(), mode, "chat-session", "customer_001");
    let submitter = backend.map(|b| FeedbackSubmitter::new(b.clone(), TraceFinder::new(b)));
    let agent: Arc<dyn AgentRuntime> = agent;
    ChatSession::new(agent, logger, submitter, "chat-session", "customer_001")
}

async fn run(session: &mut ChatSession, input: &str) -> String {
    let mut output = Vec::new();
    session.run(input.as_bytes(), &mut output).await.unwrap();
    String::from_utf8(output).unwrap()
}

#[tokio::test]
async fn test_prompts_share_one_session() {
    let agent = Arc::new(EchoAgent::default());
    let mut chat = session(agent.clone(), None, LoggingMode::Delegated);

    let transcript = run(&mut chat, "ciao\n\ncome stai?\n/quit\nnever sent\n").await;

    assert!(transcript.contains("answer to ciao\n"));
    assert!(transcript.contains("answer to come stai?\n"));
    let calls = agent.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.1 == "chat-session" && c.2 == "customer_001"));
}

#[tokio::test]
async fn test_invocation_error_keeps_loop_alive() {
    let agent = Arc::new(EchoAgent::failing_on(&["boom"]));
    let mut chat = session(agent.clone(), None, LoggingMode::Delegated);

    let transcript = run(&mut chat, "boom\ndopo\n").await;

    assert!(transcript.contains("Error: "));
    assert!(transcript.contains("answer to dopo\n"));
    assert_eq!(chat.pending().map(|p| p.prompt.as_str()), Some("dopo"));
}

#[tokio::test]
async fn test_failed_turn_keeps_previous_pending_feedback() {
    let agent = Arc::new(EchoAgent::failing_on(&["boom"]));
    let mut chat = session(agent, None, LoggingMode::Delegated);

    chat.ask("prima").await.unwrap();
    assert!(chat.ask("boom").await.is_err());

    assert_eq!(chat.pending().map(|p| p.prompt.as_str()), Some("prima"));
}

#[tokio::test]
async fn test_feedback_disabled_without_backend() {
    let mut chat = session(Arc::new(EchoAgent::default()), None, LoggingMode::Direct);

    let transcript = run(&mut chat, "domanda\n/up\n").await;

    assert!(transcript.contains("Feedback is disabled: tracing backend not configured.\n"));
    assert_eq!(
        chat.pending().map(|p| p.resolution.clone()),
        Some(TraceResolution::Unresolved)
    );
}

#[tokio::test]
async fn test_feedback_before_any_turn() {
    let backend = Arc::new(MemoryBackend::default());
    let mut chat = session(Arc::new(EchoAgent::default()), Some(backend.clone()), LoggingMode::Direct);

    assert_eq!(chat.rate(Rating::Helpful).await, "No trace available for feedback.");
    assert_eq!(backend.score_count(), 0);
}

#[tokio::test]
async fn test_direct_mode_feedback_scores_logged_trace() {
    let backend = Arc::new(MemoryBackend::default());
    let mut chat = session(Arc::new(EchoAgent::default()), Some(backend.clone()), LoggingMode::Direct);

    let transcript = run(&mut chat, "Cos'è il legato?\n/down\n").await;

    assert!(transcript.contains("Thanks for the feedback!\n"));
    let traces = backend.traces.lock().unwrap();
    let scores = backend.scores.lock().unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].trace_id, traces[0].id);
    assert_eq!(scores[0].value, 0.0);
    assert_eq!(backend.list_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_delegated_mode_feedback_resolves_runtime_trace() {
    let backend = Arc::new(MemoryBackend::with_lists(vec![Some(vec![trace(
        "runtime-trace",
        chrono::Utc::now(),
        "Cos'è il legato?",
    )])]));
    let mut chat = session(Arc::new(EchoAgent::default()), Some(backend.clone()), LoggingMode::Delegated);

    let transcript = run(&mut chat, "Cos'è il legato?\n/+\n").await;

    assert!(transcript.contains("Thanks for the feedback!\n"));
    assert!(backend.traces.lock().unwrap().is_empty());
    let scores = backend.scores.lock().unwrap();
    assert_eq!(scores[0].trace_id, "runtime-trace");
    assert_eq!(scores[0].value, 1.0);
}
