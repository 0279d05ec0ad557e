use chrono::Utc;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::agent::AgentRuntime;
use crate::feedback::logger::InteractionLogger;
use crate::feedback::submit::FeedbackSubmitter;
use crate::feedback::{PendingFeedback, Rating};

/// A line typed at the chat prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatInput<'a> {
    Prompt(&'a str),
    Feedback(Rating),
    Quit,
    Empty,
}

pub fn parse_input(line: &str) -> ChatInput<'_> {
    match line.trim() {
        "" => ChatInput::Empty,
        "/up" | "/+" => ChatInput::Feedback(Rating::Helpful),
        "/down" | "/-" => ChatInput::Feedback(Rating::NotHelpful),
        "/quit" | "/exit" => ChatInput::Quit,
        prompt => ChatInput::Prompt(prompt),
    }
}

/// One interactive session: a single runtime session id for every turn,
/// and feedback state for the latest turn only.
pub struct ChatSession {
    agent: Arc<dyn AgentRuntime>,
    logger: InteractionLogger,
    submitter: Option<FeedbackSubmitter>,
    session_id: String,
    actor_id: String,
    pending: Option<PendingFeedback>,
}

impl ChatSession {
    pub fn new(
        agent: Arc<dyn AgentRuntime>,
        logger: InteractionLogger,
        submitter: Option<FeedbackSubmitter>,
        session_id: impl Into<String>,
        actor_id: impl Into<String>,
    ) -> Self {
        Self {
            agent,
            logger,
            submitter,
            session_id: session_id.into(),
            actor_id: actor_id.into(),
            pending: None,
        }
    }

    pub fn pending(&self) -> Option<&PendingFeedback> {
        self.pending.as_ref()
    }

    /// Reply text, or a one-line error message. Replaces the pending
    /// feedback state on success.
    pub async fn ask(&mut self, prompt: &str) -> Result<String, String> {
        let request_time = Utc::now();
        let reply = self
            .agent
            .invoke(prompt, &self.session_id, &self.actor_id)
            .await
            .map_err(|e| {
                warn!("Chat invocation failed: {}", e);
                format!("Error: {}", e)
            })?;

        let logged = self.logger.log(prompt, &reply).await;
        self.pending = Some(PendingFeedback::new(prompt, request_time, logged.resolution));
        Ok(reply)
    }

    /// User-facing message describing the outcome.
    pub async fn rate(&mut self, rating: Rating) -> String {
        let Some(submitter) = &self.submitter else {
            return "Feedback is disabled: tracing backend not configured.".to_string();
        };
        submitter.send(self.pending.as_ref(), rating).await.user_message()
    }

    /// Read lines from `input` until EOF or `/quit`, writing replies to
    /// `output`. Failures never end the loop.
    pub async fn run<R, W>(&mut self, input: R, mut output: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("Chat session {} started for actor {}", self.session_id, self.actor_id);
        output
            .write_all(b"Type a question, /up or /down to rate the last answer, /quit to exit.\n")
            .await?;

        let mut lines = input.lines();
        loop {
            output.write_all(b"> ").await?;
            output.flush().await?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let message = match parse_input(&line) {
                ChatInput::Empty => continue,
                ChatInput::Quit => break,
                ChatInput::Feedback(rating) => self.rate(rating).await,
                ChatInput::Prompt(prompt) => match self.ask(prompt).await {
                    Ok(reply) => reply,
                    Err(msg) => msg,
                },
            };
            output.write_all(message.as_bytes()).await?;
            output.write_all(b"\n").await?;
        }
        output.flush().await
    }
}
