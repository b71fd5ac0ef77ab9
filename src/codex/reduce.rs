//! Folding an event sequence into the outcome of one codex run.

use super::error::BridgeError;
use super::events::AgentEvent;
use serde_json::Value;

/// Successful result of a single codex invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Session (thread) id reported by codex.
    pub session_id: String,
    /// Text of the final agent message.
    pub reply: String,
    /// Usage payload of the last completed turn, if any.
    pub usage: Option<Value>,
}

/// Accumulated state while events stream in.
///
/// The first `thread.started` id is kept, every non-empty agent message is
/// recorded in order, and the most recent usage payload replaces earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunAccumulator {
    pub session_id: Option<String>,
    pub messages: Vec<String>,
    pub usage: Option<Value>,
}

impl RunAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. This is the fold step.
    pub fn apply(mut self, event: AgentEvent) -> Self {
        self.observe(event);
        self
    }

    /// In-place form of [`Self::apply`] for streaming callers.
    pub fn observe(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::SessionStarted { session_id } => {
                if self.session_id.is_none() && !session_id.is_empty() {
                    self.session_id = Some(session_id);
                }
            }
            AgentEvent::MessageCompleted { text } => {
                if !text.is_empty() {
                    self.messages.push(text);
                }
            }
            AgentEvent::TurnCompleted { usage } => self.usage = Some(usage),
            AgentEvent::Unrecognized => {}
        }
    }

    /// Turn the accumulated state into an outcome. Only the last message is
    /// the answer; earlier ones are progress updates.
    pub fn finish(self) -> Result<RunOutcome, BridgeError> {
        let Some(session_id) = self.session_id else {
            return Err(BridgeError::protocol(
                "no session id detected in codex output (missing thread.started event)",
            ));
        };
        let Some(reply) = self.messages.into_iter().last() else {
            return Err(BridgeError::protocol(
                "no reply produced by codex (no agent_message item received)",
            ));
        };
        Ok(RunOutcome {
            session_id,
            reply,
            usage: self.usage,
        })
    }
}

/// Reduce a finite event sequence.
pub fn reduce(events: impl IntoIterator<Item = AgentEvent>) -> RunAccumulator {
    events.into_iter().fold(RunAccumulator::new(), RunAccumulator::apply)
}
