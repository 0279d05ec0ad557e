use std::sync::Arc;
use tracing::{info, warn};

use super::finder::TraceFinder;
use super::{PendingFeedback, Rating, TraceResolution};
use crate::config::{FEEDBACK_COMMENT, FEEDBACK_SCORE_NAME};
use crate::error::ServiceError;
use crate::observability::{ScoreRecord, TraceBackend};

/// What happened to one feedback click. Every variant other than
/// `Submitted` is reported to the user and then dropped.
#[derive(Debug)]
pub enum FeedbackOutcome {
    Submitted { trace_id: String },
    /// A deferred lookup found no trace after all retries.
    Unlinked,
    /// The turn has no trace at all.
    NoTrace,
    Failed(ServiceError),
}

impl FeedbackOutcome {
    /// One-line message for the chat user.
    pub fn user_message(&self) -> String {
        match self {
            FeedbackOutcome::Submitted { .. } => "Thanks for the feedback!".to_string(),
            FeedbackOutcome::Unlinked => {
                "Could not link feedback to trace. Please try again.".to_string()
            }
            FeedbackOutcome::NoTrace => "No trace available for feedback.".to_string(),
            FeedbackOutcome::Failed(e) => format!("Failed to submit feedback: {}", e),
        }
    }
}

/// Writes thumbs feedback as a score against a trace. Best effort: a failed
/// write is reported once and never queued.
pub struct FeedbackSubmitter {
    backend: Arc<dyn TraceBackend>,
    finder: TraceFinder,
}

impl FeedbackSubmitter {
    pub fn new(backend: Arc<dyn TraceBackend>, finder: TraceFinder) -> Self {
        Self { backend, finder }
    }

    pub async fn submit(&self, trace_id: &str, rating: Rating) -> Result<(), ServiceError> {
        self.backend
            .create_score(ScoreRecord {
                trace_id: trace_id.to_string(),
                name: FEEDBACK_SCORE_NAME.to_string(),
                value: rating.value(),
                comment: Some(FEEDBACK_COMMENT.to_string()),
            })
            .await
    }

    /// Resolve the turn's trace (polling for it when the runtime traced the
    /// turn itself) and submit the rating.
    pub async fn send(&self, pending: Option<&PendingFeedback>, rating: Rating) -> FeedbackOutcome {
        let Some(pending) = pending else {
            return FeedbackOutcome::NoTrace;
        };

        let trace_id = match &pending.resolution {
            TraceResolution::Resolved(id) => id.clone(),
            TraceResolution::Unresolved => return FeedbackOutcome::NoTrace,
            TraceResolution::DeferredLookup => {
                info!(
                    "Looking up trace: prompt={:?}, request_time={:?}",
                    pending.prompt, pending.request_time
                );
                match self
                    .finder
                    .find_trace(&pending.prompt, pending.request_time)
                    .await
                {
                    Some(id) => id,
                    None => return FeedbackOutcome::Unlinked,
                }
            }
        };

        match self.submit(&trace_id, rating).await {
            Ok(()) => {
                info!("Feedback {:?} recorded on trace {}", rating, trace_id);
                FeedbackOutcome::Submitted { trace_id }
            }
            Err(e) => {
                warn!("Feedback write failed for trace {}: {}", trace_id, e);
                FeedbackOutcome::Failed(e)
            }
        }
    }
}
