pub mod finder;
pub mod logger;
pub mod submit;

use chrono::{DateTime, Utc};

/// Which trace a chat turn's feedback should be attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceResolution {
    /// No trace exists or logging failed.
    Unresolved,
    /// The runtime traced the turn out-of-band; look it up at feedback time.
    DeferredLookup,
    Resolved(String),
}

/// Thumbs up / thumbs down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Helpful,
    NotHelpful,
}

impl Rating {
    pub fn value(self) -> f64 {
        match self {
            Rating::Helpful => 1.0,
            Rating::NotHelpful => 0.0,
        }
    }
}

/// Per-turn state kept until the user rates the response or the next turn
/// replaces it. Never persisted.
#[derive(Debug, Clone)]
pub struct PendingFeedback {
    pub prompt: String,
    pub request_time: Option<DateTime<Utc>>,
    pub resolution: TraceResolution,
}

impl PendingFeedback {
    pub fn new(prompt: impl Into<String>, request_time: DateTime<Utc>, resolution: TraceResolution) -> Self {
        Self {
            prompt: prompt.into(),
            request_time: Some(request_time),
            resolution,
        }
    }
}
