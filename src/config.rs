use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::evaluation::ScoringMode;

/// Support-agent evaluation and feedback tooling: runs LLM-as-judge
/// evaluations against a deployed agent runtime and links chat feedback to
/// its traces.
#[derive(Parser, Debug, Clone)]
#[command(name = "support-agent-evals", version)]
pub struct CliArgs {
    /// Also write logs to this file
    #[arg(short = 'l', long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the dataset evaluation against the deployed agent
    Eval(EvalArgs),
    /// Interactive chat with thumbs-up/down feedback
    Chat(ChatArgs),
    /// Print OTLP exporter variables pointing at the tracing backend
    OtelEnv(TracingBackendArgs),
}

#[derive(Args, Debug, Clone)]
pub struct EvalArgs {
    /// Dataset name in the tracing backend
    #[arg(long, default_value = DEFAULT_DATASET)]
    pub dataset: String,

    /// Pass threshold for a single item and for the aggregate
    #[arg(long = "min-score", default_value_t = DEFAULT_MIN_SCORE)]
    pub min_score: f64,

    /// Read timeout for one agent invocation, in seconds
    #[arg(long, default_value_t = DEFAULT_INVOKE_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Dataset run name (default: eval-YYYYmmdd-HHMMSS)
    #[arg(long = "run-name")]
    pub run_name: Option<String>,

    /// CSV export path (default: eval-results-<run-name>.csv)
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Judge model identifier
    #[arg(long = "judge-model", default_value = DEFAULT_JUDGE_MODEL)]
    pub judge_model: String,

    /// How judge scores are aggregated and gated
    #[arg(long, value_enum, default_value_t = ScoringArg::Continuous)]
    pub scoring: ScoringArg,

    #[command(flatten)]
    pub backend: TracingBackendArgs,

    #[command(flatten)]
    pub runtime: RuntimeArgs,

    /// Bearer token for the judge model endpoint
    #[arg(long, env = "AWS_BEARER_TOKEN_BEDROCK", hide_env_values = true)]
    pub judge_token: Option<String>,

    /// Region of the judge model endpoint (default: --region)
    #[arg(long = "judge-region", env = "BEDROCK_REGION")]
    pub judge_region: Option<String>,

    /// Judge endpoint override (default: the regional endpoint)
    #[arg(long = "judge-endpoint", env = "BEDROCK_ENDPOINT_URL")]
    pub judge_endpoint: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    #[command(flatten)]
    pub backend: TracingBackendArgs,

    #[command(flatten)]
    pub runtime: RuntimeArgs,

    /// Actor id sent with every prompt
    #[arg(long = "actor-id", env = "AGENT_ACTOR_ID", default_value = DEFAULT_CHAT_ACTOR_ID)]
    pub actor_id: String,

    /// The runtime emits its own traces; resolve them at feedback time
    /// instead of logging turns directly
    #[arg(
        long = "delegated-tracing",
        env = "AGENTCORE_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_parser = parse_enabled_flag
    )]
    pub delegated_tracing: bool,

    /// Read timeout for one agent invocation, in seconds
    #[arg(long, default_value_t = DEFAULT_INVOKE_TIMEOUT_SECS)]
    pub timeout: u64,
}

#[derive(Args, Debug, Clone)]
pub struct TracingBackendArgs {
    #[arg(long = "langfuse-public-key", env = "LANGFUSE_PUBLIC_KEY", hide_env_values = true)]
    pub public_key: Option<String>,

    #[arg(long = "langfuse-secret-key", env = "LANGFUSE_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    #[arg(long = "langfuse-host", env = "LANGFUSE_HOST", default_value = DEFAULT_LANGFUSE_HOST)]
    pub host: String,
}

#[derive(Args, Debug, Clone)]
pub struct RuntimeArgs {
    /// Region of the agent runtime data plane
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Runtime identifier (ARN) of the deployed agent
    #[arg(long = "runtime-arn", env = "AGENTCORE_RUNTIME_ARN")]
    pub runtime_arn: Option<String>,

    /// Bearer token accepted by the runtime's authorizer
    #[arg(long = "bearer-token", env = "AGENT_BEARER_TOKEN", hide_env_values = true)]
    pub bearer_token: Option<String>,

    /// Data-plane endpoint override (default: the regional endpoint)
    #[arg(long = "runtime-endpoint", env = "AGENTCORE_ENDPOINT_URL")]
    pub endpoint: Option<String>,
}

/// `true` in any case enables the flag; every other value disables it.
pub fn parse_enabled_flag(value: &str) -> Result<bool, String> {
    Ok(value.trim().eq_ignore_ascii_case("true"))
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringArg {
    Continuous,
    Binary,
}

impl From<ScoringArg> for ScoringMode {
    fn from(arg: ScoringArg) -> Self {
        match arg {
            ScoringArg::Continuous => ScoringMode::Continuous,
            ScoringArg::Binary => ScoringMode::Binary,
        }
    }
}

/// Credentials and host for the tracing backend.
#[derive(Debug, Clone)]
pub struct TracingBackendConfig {
    pub public_key: String,
    pub secret_key: String,
    pub host: String,
}

impl TracingBackendConfig {
    /// `None` when either key is missing; callers decide whether that is fatal.
    pub fn from_args(args: &TracingBackendArgs) -> Option<Self> {
        let public_key = args.public_key.clone().filter(|k| !k.is_empty())?;
        let secret_key = args.secret_key.clone().filter(|k| !k.is_empty())?;
        Some(Self {
            public_key,
            secret_key,
            host: args.host.trim_end_matches('/').to_string(),
        })
    }
}

/// Where and how to reach the deployed agent.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub region: String,
    pub runtime_arn: String,
    pub bearer_token: String,
    pub read_timeout_secs: u64,
    pub endpoint: Option<String>,
}

impl RuntimeConfig {
    pub fn from_args(args: &RuntimeArgs, read_timeout_secs: u64) -> anyhow::Result<Self> {
        let region = args
            .region
            .clone()
            .ok_or_else(|| anyhow::anyhow!("AWS_REGION is not set"))?;
        let runtime_arn = args
            .runtime_arn
            .clone()
            .ok_or_else(|| anyhow::anyhow!("AGENTCORE_RUNTIME_ARN is not set"))?;
        let bearer_token = args
            .bearer_token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("AGENT_BEARER_TOKEN is not set"))?;
        Ok(Self {
            region,
            runtime_arn,
            bearer_token,
            read_timeout_secs,
            endpoint: args.endpoint.clone(),
        })
    }
}

// Evaluation defaults
pub const DEFAULT_DATASET: &str = "italian-legal-eval";
pub const DEFAULT_MIN_SCORE: f64 = 0.5;
pub const DEFAULT_INVOKE_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_JUDGE_MODEL: &str = "us.amazon.nova-2-lite-v1:0";
pub const EVAL_ACTOR_ID: &str = "eval_runner";
pub const CORRECTNESS_SCORE_NAME: &str = "correctness";
pub const DATASET_RUN_TRACE_NAME: &str = "dataset-run-item";
pub const JUDGE_MAX_TOKENS: u32 = 256;

// Agent runtime constants
pub const RUNTIME_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const RUNTIME_QUALIFIER: &str = "DEFAULT";
pub const RUNTIME_SESSION_HEADER: &str = "X-Amzn-Bedrock-AgentCore-Runtime-Session-Id";
pub const JUDGE_TIMEOUT_SECS: u64 = 60;

// Tracing backend constants
pub const DEFAULT_LANGFUSE_HOST: &str = "https://cloud.langfuse.com";
pub const BACKEND_TIMEOUT_SECS: u64 = 30;
pub const DATASET_PAGE_SIZE: u32 = 50;

// Trace lookup constants
pub const TRACE_LOOKUP_LIMIT: u32 = 10;
pub const TRACE_LOOKUP_WINDOW_MINS: i64 = 5;
pub const TRACE_LOOKUP_MAX_ATTEMPTS: u32 = 6;
pub const TRACE_LOOKUP_BASE_DELAY_SECS: u64 = 2;

// Chat constants
pub const DEFAULT_CHAT_ACTOR_ID: &str = "customer_001";
pub const FEEDBACK_SCORE_NAME: &str = "thumbs_feedback";
pub const FEEDBACK_COMMENT: &str = "User feedback from chat CLI";
pub const CHAT_TRACE_NAME: &str = "chat_session";
pub const CHAT_GENERATION_NAME: &str = "agent_response";
