use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::{
    RuntimeConfig, RUNTIME_CONNECT_TIMEOUT_SECS, RUNTIME_QUALIFIER, RUNTIME_SESSION_HEADER,
};
use crate::error::{check_status, ServiceError};

/// The deployed support agent.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Send one prompt within `session_id` and return the reply text.
    async fn invoke(
        &self,
        prompt: &str,
        session_id: &str,
        actor_id: &str,
    ) -> Result<String, ServiceError>;
}

/// HTTP client for the runtime's data-plane invocation endpoint.
pub struct HttpAgentRuntime {
    http: reqwest::Client,
    url: Url,
    bearer_token: String,
}

impl HttpAgentRuntime {
    pub fn new(config: &RuntimeConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(RUNTIME_CONNECT_TIMEOUT_SECS))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .build()?;
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| runtime_endpoint(&config.region));
        Ok(Self {
            http,
            url: invocation_url(&endpoint, &config.runtime_arn)?,
            bearer_token: config.bearer_token.clone(),
        })
    }
}

/// Regional data-plane endpoint of the agent runtime.
pub fn runtime_endpoint(region: &str) -> String {
    format!("https://bedrock-agentcore.{}.amazonaws.com", region)
}

/// `<endpoint>/runtimes/<arn>/invocations?qualifier=DEFAULT` with the runtime
/// ARN percent-encoded as a single path segment.
pub fn invocation_url(endpoint: &str, runtime_arn: &str) -> Result<Url, ServiceError> {
    let mut url = Url::parse(&format!(
        "{}/runtimes/{}/invocations",
        endpoint.trim_end_matches('/'),
        encode_arn(runtime_arn)
    ))
    .map_err(|e| ServiceError::NotConfigured(format!("runtime endpoint '{}' ({})", endpoint, e)))?;
    url.query_pairs_mut()
        .append_pair("qualifier", RUNTIME_QUALIFIER);
    Ok(url)
}

/// The data plane expects every reserved character of the ARN escaped,
/// `:` included, which the URL path encoder leaves alone.
fn encode_arn(arn: &str) -> String {
    url::form_urlencoded::byte_serialize(arn.as_bytes()).collect()
}

/// Reply text from an invocation body: empty body is an empty reply, a JSON
/// string is the reply, an object's `response` field is the reply, and any
/// other JSON is returned as text.
pub fn parse_invocation_body(body: &str) -> Result<String, ServiceError> {
    if body.trim().is_empty() {
        return Ok(String::new());
    }
    let value: Value = serde_json::from_str(body)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Object(ref map) => match map.get("response") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => value.to_string(),
        },
        other => other.to_string(),
    })
}

#[async_trait]
impl AgentRuntime for HttpAgentRuntime {
    async fn invoke(
        &self,
        prompt: &str,
        session_id: &str,
        actor_id: &str,
    ) -> Result<String, ServiceError> {
        debug!("Invoking runtime session={} actor={}", session_id, actor_id);
        let resp = self
            .http
            .post(self.url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .header(RUNTIME_SESSION_HEADER, session_id)
            .bearer_auth(&self.bearer_token)
            .json(&json!({ "prompt": prompt, "actor_id": actor_id }))
            .send()
            .await?;
        let resp = check_status("agent runtime", resp).await?;
        let body = resp.text().await?;
        parse_invocation_body(&body)
    }
}
