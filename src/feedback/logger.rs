use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::TraceResolution;
use crate::config::{CHAT_GENERATION_NAME, CHAT_TRACE_NAME};
use crate::error::ServiceError;
use crate::observability::{NewGeneration, NewTrace, TraceBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// The agent runtime exports its own traces; nothing is written here.
    Delegated,
    /// This process writes a trace plus a nested generation per turn.
    Direct,
}

/// Result of logging one chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedTurn {
    pub resolution: TraceResolution,
    pub generation_id: Option<String>,
}

impl LoggedTurn {
    fn unresolved() -> Self {
        Self {
            resolution: TraceResolution::Unresolved,
            generation_id: None,
        }
    }
}

/// Records prompt/response pairs so that feedback can be attached later.
/// Never fails the chat turn.
pub struct InteractionLogger {
    backend: Option<Arc<dyn TraceBackend>>,
    mode: LoggingMode,
    session_id: String,
    actor_id: String,
}

impl InteractionLogger {
    pub fn new(
        backend: Option<Arc<dyn TraceBackend>>,
        mode: LoggingMode,
        session_id: impl Into<String>,
        actor_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            mode,
            session_id: session_id.into(),
            actor_id: actor_id.into(),
        }
    }

    pub fn mode(&self) -> LoggingMode {
        self.mode
    }

    pub async fn log(&self, prompt: &str, response: &str) -> LoggedTurn {
        let Some(backend) = &self.backend else {
            return LoggedTurn::unresolved();
        };

        match self.mode {
            LoggingMode::Delegated => LoggedTurn {
                resolution: TraceResolution::DeferredLookup,
                generation_id: None,
            },
            LoggingMode::Direct => match self.write_turn(backend.as_ref(), prompt, response).await {
                Ok((trace_id, generation_id)) => {
                    debug!("Logged turn as trace {} / generation {}", trace_id, generation_id);
                    LoggedTurn {
                        resolution: TraceResolution::Resolved(trace_id),
                        generation_id: Some(generation_id),
                    }
                }
                Err(e) => {
                    warn!("Interaction logging failed: {}", e);
                    LoggedTurn::unresolved()
                }
            },
        }
    }

    async fn write_turn(
        &self,
        backend: &dyn TraceBackend,
        prompt: &str,
        response: &str,
    ) -> Result<(String, String), ServiceError> {
        let mut trace = NewTrace::named(CHAT_TRACE_NAME);
        trace.session_id = Some(self.session_id.clone());
        trace.user_id = Some(self.actor_id.clone());
        trace.input = Some(Value::String(prompt.to_string()));
        trace.output = Some(Value::String(response.to_string()));
        let trace_id = backend.create_trace(trace).await?;

        let generation_id = backend
            .create_generation(NewGeneration {
                id: uuid::Uuid::new_v4().to_string(),
                trace_id: trace_id.clone(),
                name: CHAT_GENERATION_NAME.to_string(),
                input: Some(Value::String(prompt.to_string())),
                output: Some(Value::String(response.to_string())),
            })
            .await?;

        Ok((trace_id, generation_id))
    }
}
