use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{
    TRACE_LOOKUP_BASE_DELAY_SECS, TRACE_LOOKUP_LIMIT, TRACE_LOOKUP_MAX_ATTEMPTS,
    TRACE_LOOKUP_WINDOW_MINS,
};
use crate::observability::{Trace, TraceBackend, TraceQuery};
use crate::retry::{retry, RetryPolicy};

/// Locates the trace the agent runtime wrote for a prompt. Traces are
/// indexed with a lag, so the lookup polls with a linear backoff.
pub struct TraceFinder {
    backend: Arc<dyn TraceBackend>,
    policy: RetryPolicy,
}

fn linear_delay(attempt: u32) -> Duration {
    Duration::from_secs(TRACE_LOOKUP_BASE_DELAY_SECS + attempt as u64)
}

impl TraceFinder {
    pub fn new(backend: Arc<dyn TraceBackend>) -> Self {
        Self {
            backend,
            policy: RetryPolicy::new(TRACE_LOOKUP_MAX_ATTEMPTS, linear_delay),
        }
    }

    /// Id of the trace whose input contains `prompt`, else the most recent
    /// trace in the window. `None` once every attempt failed or came back
    /// empty.
    pub async fn find_trace(
        &self,
        prompt: &str,
        approx_time: Option<DateTime<Utc>>,
    ) -> Option<String> {
        let query = TraceQuery {
            limit: TRACE_LOOKUP_LIMIT,
            from_timestamp: approx_time
                .map(|t| t - ChronoDuration::minutes(TRACE_LOOKUP_WINDOW_MINS)),
        };

        let found = retry(
            &self.policy,
            |attempt| {
                let query = &query;
                async move {
                    match self.backend.list_traces(query).await {
                        Ok(traces) => match_trace(&traces, prompt),
                        Err(e) => {
                            warn!("Error querying traces (attempt {}): {}", attempt + 1, e);
                            None
                        }
                    }
                }
            },
            |found| found.is_none(),
        )
        .await;

        match &found {
            Some(id) => info!("Resolved feedback trace {}", id),
            None => warn!(
                "No trace found after {} attempts",
                self.policy.max_attempts
            ),
        }
        found
    }
}

/// First trace (in received order) whose input contains `prompt`
/// case-sensitively; otherwise the newest trace. `None` for an empty list.
pub fn match_trace(traces: &[Trace], prompt: &str) -> Option<String> {
    if !prompt.is_empty() {
        if let Some(t) = traces.iter().find(|t| t.input_text().contains(prompt)) {
            return Some(t.id.clone());
        }
    }

    let newest = traces
        .iter()
        .fold(None::<&Trace>, |best, t| match best {
            Some(b) if b.timestamp >= t.timestamp => Some(b),
            _ => Some(t),
        })?;
    debug!("No input match, falling back to most recent trace {}", newest.id);
    Some(newest.id.clone())
}
