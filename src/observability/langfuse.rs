use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{
    DatasetStore, NewGeneration, NewTrace, RawDatasetItem, ScoreRecord, Trace, TraceBackend,
    TraceQuery,
};
use crate::config::{TracingBackendConfig, BACKEND_TIMEOUT_SECS, DATASET_PAGE_SIZE};
use crate::error::{check_status, ServiceError};

const SERVICE: &str = "tracing backend";

/// Client for the tracing backend's public REST API. Implements both the
/// trace operations and the dataset store.
#[derive(Clone)]
pub struct LangfuseClient {
    http: reqwest::Client,
    base: Url,
    public_key: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
    #[serde(default)]
    meta: Option<PageMeta>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageMeta {
    #[serde(default)]
    total_pages: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct IngestionResponse {
    #[serde(default)]
    errors: Vec<IngestionError>,
}

#[derive(Debug, Deserialize)]
struct IngestionError {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    message: Option<String>,
}

impl LangfuseClient {
    pub fn new(config: TracingBackendConfig) -> Result<Self, ServiceError> {
        let base = Url::parse(&config.host)
            .map_err(|e| ServiceError::NotConfigured(format!("tracing backend host ({})", e)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(BACKEND_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base,
            public_key: config.public_key,
            secret_key: config.secret_key,
        })
    }

    /// `<host>/api/public/<segments...>`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::NotConfigured("tracing backend host".to_string()))?
            .pop_if_empty()
            .extend(["api", "public"])
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, ServiceError> {
        let resp = self
            .http
            .get(url)
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .query(query)
            .send()
            .await?;
        let resp = check_status(SERVICE, resp).await?;
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn post_json(&self, url: Url, body: &Value) -> Result<reqwest::Response, ServiceError> {
        let resp = self
            .http
            .post(url)
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .json(body)
            .send()
            .await?;
        check_status(SERVICE, resp).await
    }

    /// Send one ingestion event. The endpoint answers 207 with per-event
    /// errors, so a 2xx alone does not mean the event was accepted.
    async fn ingest(&self, event_type: &str, body: Value) -> Result<(), ServiceError> {
        let event = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "type": event_type,
            "body": body,
        });
        let resp = self
            .post_json(self.endpoint(&["ingestion"])?, &json!({ "batch": [event] }))
            .await?;
        let text = resp.text().await?;
        let parsed: IngestionResponse = if text.trim().is_empty() {
            IngestionResponse::default()
        } else {
            serde_json::from_str(&text)?
        };
        if let Some(err) = parsed.errors.into_iter().next() {
            return Err(ServiceError::Status {
                service: SERVICE,
                status: err.status,
                body: err.message.unwrap_or_else(|| format!("{} rejected", event_type)),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TraceBackend for LangfuseClient {
    async fn list_traces(&self, query: &TraceQuery) -> Result<Vec<Trace>, ServiceError> {
        let mut params = vec![("limit", query.limit.to_string())];
        if let Some(from) = query.from_timestamp {
            params.push((
                "fromTimestamp",
                from.to_rfc3339_opts(SecondsFormat::Millis, true),
            ));
        }
        let page: Page<Trace> = self.get_json(self.endpoint(&["traces"])?, &params).await?;
        debug!("Trace list returned {} traces", page.data.len());
        Ok(page.data)
    }

    async fn create_trace(&self, trace: NewTrace) -> Result<String, ServiceError> {
        let id = trace.id.clone();
        self.ingest(
            "trace-create",
            json!({
                "id": trace.id,
                "name": trace.name,
                "sessionId": trace.session_id,
                "userId": trace.user_id,
                "input": trace.input,
                "output": trace.output,
            }),
        )
        .await?;
        Ok(id)
    }

    async fn create_generation(&self, generation: NewGeneration) -> Result<String, ServiceError> {
        let id = generation.id.clone();
        self.ingest(
            "generation-create",
            json!({
                "id": generation.id,
                "traceId": generation.trace_id,
                "name": generation.name,
                "input": generation.input,
                "output": generation.output,
            }),
        )
        .await?;
        Ok(id)
    }

    async fn create_score(&self, score: ScoreRecord) -> Result<(), ServiceError> {
        self.post_json(
            self.endpoint(&["scores"])?,
            &json!({
                "traceId": score.trace_id,
                "name": score.name,
                "value": score.value,
                "dataType": "NUMERIC",
                "comment": score.comment,
            }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DatasetStore for LangfuseClient {
    async fn get_dataset_items(&self, dataset: &str) -> Result<Vec<RawDatasetItem>, ServiceError> {
        // Fails with 404 for an unknown dataset before any item paging.
        let _: Value = self
            .get_json(self.endpoint(&["v2", "datasets", dataset])?, &[])
            .await?;

        let mut items = Vec::new();
        let mut page_no = 1u32;
        loop {
            let params = [
                ("datasetName", dataset.to_string()),
                ("page", page_no.to_string()),
                ("limit", DATASET_PAGE_SIZE.to_string()),
            ];
            let page: Page<RawDatasetItem> = self
                .get_json(self.endpoint(&["dataset-items"])?, &params)
                .await?;
            let fetched = page.data.len();
            items.extend(page.data);

            let total_pages = page.meta.and_then(|m| m.total_pages);
            let done = match total_pages {
                Some(total) => page_no >= total,
                None => fetched < DATASET_PAGE_SIZE as usize,
            };
            if done || fetched == 0 {
                break;
            }
            page_no += 1;
        }
        debug!("Fetched {} items from dataset '{}'", items.len(), dataset);
        Ok(items)
    }

    async fn link_run_item(
        &self,
        run_name: &str,
        item_id: &str,
        trace_id: &str,
    ) -> Result<(), ServiceError> {
        self.post_json(
            self.endpoint(&["dataset-run-items"])?,
            &json!({
                "runName": run_name,
                "datasetItemId": item_id,
                "traceId": trace_id,
            }),
        )
        .await?;
        Ok(())
    }
}
