use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use support_agent_evals::agent::{AgentRuntime, HttpAgentRuntime};
use support_agent_evals::chat::ChatSession;
use support_agent_evals::config::{
    ChatArgs, CliArgs, Command, EvalArgs, RuntimeConfig, TracingBackendArgs, TracingBackendConfig,
};
use support_agent_evals::evaluation::engine::{run_eval, EvalClients};
use support_agent_evals::evaluation::judge::BedrockJudge;
use support_agent_evals::evaluation::report::write_csv;
use support_agent_evals::evaluation::{default_run_name, EvalSettings};
use support_agent_evals::feedback::finder::TraceFinder;
use support_agent_evals::feedback::logger::{InteractionLogger, LoggingMode};
use support_agent_evals::feedback::submit::FeedbackSubmitter;
use support_agent_evals::observability::langfuse::LangfuseClient;
use support_agent_evals::observability::otel::OtlpExporterSettings;
use support_agent_evals::observability::TraceBackend;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let log_guard = init_tracing(args.log_file.as_ref())?;
    info!("Starting support-agent-evals v{}", env!("CARGO_PKG_VERSION"));

    let code = match args.command {
        Command::Eval(eval) => eval_command(eval).await,
        Command::Chat(chat) => chat_command(chat).await,
        Command::OtelEnv(backend) => otel_env_command(&backend),
    };
    drop(log_guard);
    std::process::exit(code);
}

/// stderr logging, plus a non-blocking file writer when `--log-file` is set.
/// The returned guard flushes the file on drop.
fn init_tracing(
    log_file: Option<&PathBuf>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "support_agent_evals=info".into());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}

fn require_backend(args: &TracingBackendArgs) -> Option<LangfuseClient> {
    let Some(config) = TracingBackendConfig::from_args(args) else {
        error!("Tracing backend not configured: set LANGFUSE_PUBLIC_KEY and LANGFUSE_SECRET_KEY");
        return None;
    };
    match LangfuseClient::new(config) {
        Ok(client) => Some(client),
        Err(e) => {
            error!("Failed to create tracing backend client: {}", e);
            None
        }
    }
}

async fn eval_command(args: EvalArgs) -> i32 {
    let Some(backend) = require_backend(&args.backend) else {
        return 1;
    };
    let runtime_config = match RuntimeConfig::from_args(&args.runtime, args.timeout) {
        Ok(c) => c,
        Err(e) => {
            error!("Agent runtime not configured: {}", e);
            return 1;
        }
    };
    let agent = match HttpAgentRuntime::new(&runtime_config) {
        Ok(a) => a,
        Err(e) => {
            error!("Failed to create agent runtime client: {}", e);
            return 1;
        }
    };
    let Some(judge_token) = args.judge_token.clone() else {
        error!("Judge model not configured: set AWS_BEARER_TOKEN_BEDROCK");
        return 1;
    };
    let judge_region = args
        .judge_region
        .clone()
        .unwrap_or_else(|| runtime_config.region.clone());
    let judge = match BedrockJudge::new(judge_region, args.judge_model.clone(), judge_token) {
        Ok(j) => match args.judge_endpoint.clone() {
            Some(endpoint) => j.with_endpoint(endpoint),
            None => j,
        },
        Err(e) => {
            error!("Failed to create judge client: {}", e);
            return 1;
        }
    };

    let settings = EvalSettings {
        dataset: args.dataset.clone(),
        run_name: args.run_name.clone().unwrap_or_else(default_run_name),
        min_score: args.min_score,
        mode: args.scoring.into(),
    };
    println!("Runtime: {}", runtime_config.runtime_arn);
    println!("Dataset: {}", settings.dataset);
    println!("Min score: {}", settings.min_score);
    println!("Scoring: {:?}\n", settings.mode);

    let backend = Arc::new(backend);
    let clients = EvalClients {
        dataset: backend.clone(),
        traces: backend,
        agent: Arc::new(agent),
        judge: Arc::new(judge),
    };

    let outcome = match run_eval(&clients, &settings).await {
        Ok(o) => o,
        Err(_) => return 1,
    };

    println!();
    print!("{}", outcome.summary.render(&outcome.records, &outcome.run_name));

    let export_path = args
        .export
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("eval-results-{}.csv", outcome.run_name)));
    match write_csv(&export_path, &outcome.records, &outcome.summary, &outcome.run_name) {
        Ok(()) => println!("Results exported to: {}", export_path.display()),
        Err(e) => warn!("Failed to export results to {:?}: {}", export_path, e),
    }

    println!("\n{}", outcome.summary.verdict_line());
    outcome.summary.exit_code()
}

async fn chat_command(args: ChatArgs) -> i32 {
    let runtime_config = match RuntimeConfig::from_args(&args.runtime, args.timeout) {
        Ok(c) => c,
        Err(e) => {
            error!("Agent runtime not configured: {}", e);
            return 1;
        }
    };
    let agent: Arc<dyn AgentRuntime> = match HttpAgentRuntime::new(&runtime_config) {
        Ok(a) => Arc::new(a),
        Err(e) => {
            error!("Failed to create agent runtime client: {}", e);
            return 1;
        }
    };

    let backend: Option<Arc<dyn TraceBackend>> = match TracingBackendConfig::from_args(&args.backend) {
        Some(config) => match LangfuseClient::new(config) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("Tracing backend unavailable, feedback disabled: {}", e);
                None
            }
        },
        None => {
            warn!("Tracing backend not configured, feedback disabled");
            None
        }
    };

    let mode = if args.delegated_tracing {
        LoggingMode::Delegated
    } else {
        LoggingMode::Direct
    };
    let session_id = uuid::Uuid::new_v4().to_string();
    let logger = InteractionLogger::new(backend.clone(), mode, session_id.clone(), args.actor_id.clone());
    let submitter = backend.map(|b| FeedbackSubmitter::new(b.clone(), TraceFinder::new(b)));
    info!("Chat logging mode: {:?}", logger.mode());

    let mut session = ChatSession::new(agent, logger, submitter, session_id, args.actor_id);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    match session.run(stdin, tokio::io::stdout()).await {
        Ok(()) => 0,
        Err(e) => {
            error!("Chat terminal error: {}", e);
            1
        }
    }
}

fn otel_env_command(args: &TracingBackendArgs) -> i32 {
    let Some(config) = TracingBackendConfig::from_args(args) else {
        error!("Tracing backend not configured: set LANGFUSE_PUBLIC_KEY and LANGFUSE_SECRET_KEY");
        return 1;
    };
    print!("{}", OtlpExporterSettings::for_backend(&config).to_shell_exports());
    0
}
