use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{JUDGE_MAX_TOKENS, JUDGE_TIMEOUT_SECS};
use crate::error::{check_status, ServiceError};
use super::report::truncate_chars;
use super::ScoringMode;

/// Score and short explanation produced by the judge for one dataset item.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeVerdict {
    pub score: f64,
    pub reasoning: String,
}

/// Single-turn completion endpoint used as the judge.
#[async_trait]
pub trait JudgeModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError>;

    fn model_id(&self) -> &str;
}

const CRITERIA: &str = "\
You are an expert evaluator for an Italian notarial law AI assistant.
You must evaluate the quality of the assistant's response by comparing it
against the expected output (ground truth written by legal experts).

Evaluation criteria:
- Legal accuracy: Are the cited articles, doctrinal references, and legal principles correct?
- Completeness: Does the response cover the key points from the expected output?
- Source citation: Does the response cite relevant normative sources or doctrinal references?
- No hallucination: Does the response avoid inventing legal provisions or doctrinal positions?";

const CONTINUOUS_SCALE: &str = "\
Score on a scale of 0.0 to 1.0:
- 1.0 = Response fully aligns with expected output (correct legal content, proper citations, complete)
- 0.7 = Mostly aligned, minor omissions or less precise citations but legally sound
- 0.4 = Partially aligned, missing important legal points or some inaccuracies
- 0.1 = Minimally relevant, significant errors or missing most key information
- 0.0 = Not aligned, legally incorrect, or completely off-topic";

const BINARY_SCALE: &str = "\
Score 1 if the response is correct: legally accurate, covers the key points of the
expected output and cites its sources without inventing any.
Score 0 otherwise.";

/// Judge prompt for one item. The expected and actual outputs are Italian;
/// the judge is told to grade substance rather than wording.
pub fn build_judge_prompt(mode: ScoringMode, query: &str, generation: &str, ground_truth: &str) -> String {
    let (scale, score_hint) = match mode {
        ScoringMode::Continuous => (CONTINUOUS_SCALE, "<float>"),
        ScoringMode::Binary => (BINARY_SCALE, "<0 or 1>"),
    };
    format!(
        r#"{criteria}

{scale}

IMPORTANT: The expected output and the actual response are in Italian. You must evaluate
the legal substance, not the exact wording. Paraphrased correct answers should score high.

Customer Input: {query}
Expected Output: {ground_truth}
Actual Output: {generation}

Return ONLY a JSON object: {{"score": {score_hint}, "reasoning": "<brief explanation in English>"}}"#,
        criteria = CRITERIA,
    )
}

/// Drop a surrounding triple-backtick fence (with or without a language tag).
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest.strip_prefix("json").unwrap_or(rest),
    };
    let body = match body.rfind("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim()
}

#[derive(Deserialize)]
struct RawVerdict {
    score: Value,
    #[serde(default)]
    reasoning: Option<Value>,
}

/// Parse the judge's reply. Scores are clamped to [0, 1]; in binary mode
/// they are then snapped to 0 or 1.
pub fn parse_verdict(raw: &str, mode: ScoringMode) -> Result<JudgeVerdict, ServiceError> {
    let cleaned = strip_code_fence(raw);
    let parsed: RawVerdict = serde_json::from_str(cleaned).map_err(|e| {
        warn!("Unparsable judge reply: {}", truncate_chars(cleaned, 200));
        ServiceError::decode(format!("judge reply is not the expected JSON ({})", e))
    })?;

    let score = match &parsed.score {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|s| s.is_finite())
    .ok_or_else(|| ServiceError::decode(format!("judge score is not a number: {}", parsed.score)))?
    .clamp(0.0, 1.0);

    let score = match mode {
        ScoringMode::Continuous => score,
        ScoringMode::Binary if score >= 0.5 => 1.0,
        ScoringMode::Binary => 0.0,
    };

    let reasoning = match parsed.reasoning {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    Ok(JudgeVerdict { score, reasoning })
}

/// Ask the judge to grade `generation` against `ground_truth`.
pub async fn judge_response(
    judge: &dyn JudgeModel,
    mode: ScoringMode,
    query: &str,
    generation: &str,
    ground_truth: &str,
) -> Result<JudgeVerdict, ServiceError> {
    let prompt = build_judge_prompt(mode, query, generation, ground_truth);
    let reply = judge.complete(&prompt).await?;
    parse_verdict(&reply, mode)
}

/// Converse-API client for a hosted model, authenticated with a bearer key.
pub struct BedrockJudge {
    http: reqwest::Client,
    region: String,
    endpoint: String,
    model_id: String,
    token: String,
}

impl BedrockJudge {
    pub fn new(region: impl Into<String>, model_id: impl Into<String>, token: impl Into<String>) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(JUDGE_TIMEOUT_SECS))
            .build()?;
        let region: String = region.into();
        let judge = Self {
            http,
            endpoint: format!("https://bedrock-runtime.{}.amazonaws.com", region),
            region,
            model_id: model_id.into(),
            token: token.into(),
        };
        info!("Judge model {} in {}", judge.model_id, judge.region);
        Ok(judge)
    }

    /// Send requests to `endpoint` instead of the regional one.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn converse_url(&self) -> Result<url::Url, ServiceError> {
        let mut url = url::Url::parse(&self.endpoint)
            .map_err(|e| ServiceError::NotConfigured(format!("judge endpoint '{}' ({})", self.endpoint, e)))?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::NotConfigured("judge endpoint".to_string()))?
            .clear()
            .push("model")
            .push(&self.model_id)
            .push("converse");
        Ok(url)
    }
}

/// Reply text at `output.message.content[0].text`.
pub fn extract_converse_text(body: &Value) -> Result<String, ServiceError> {
    body.pointer("/output/message/content/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ServiceError::decode("judge reply has no output text"))
}

#[async_trait]
impl JudgeModel for BedrockJudge {
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        let resp = self
            .http
            .post(self.converse_url()?)
            .bearer_auth(&self.token)
            .json(&json!({
                "messages": [{ "role": "user", "content": [{ "text": prompt }] }],
                "inferenceConfig": { "maxTokens": JUDGE_MAX_TOKENS, "temperature": 0.0 },
            }))
            .send()
            .await?;
        let resp = check_status("judge model", resp).await?;
        let body: Value = serde_json::from_str(&resp.text().await?)?;
        extract_converse_text(&body)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
