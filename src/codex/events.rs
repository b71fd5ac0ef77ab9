//! Codex `--json` event stream decoding
//!
//! `codex exec --json` writes one JSON object per line on stdout. The stream is
//! best-effort: informational or malformed lines may be interleaved, and the
//! final line is not guaranteed to carry a trailing newline. The decoder
//! reassembles lines from arbitrary byte chunks and classifies each parsed line
//! into an [`AgentEvent`].

use serde::Deserialize;
use serde_json::Value;

/// One classified event from the codex event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// `{"type":"thread.started","thread_id":...}`
    SessionStarted { session_id: String },
    /// `{"type":"item.completed","item":{"type":"agent_message","text":...}}`
    MessageCompleted { text: String },
    /// `{"type":"turn.completed","usage":{...}}`
    TurnCompleted { usage: Value },
    /// Any other well-formed JSON line.
    Unrecognized,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum WireEvent {
    #[serde(rename = "thread.started")]
    ThreadStarted { thread_id: String },
    #[serde(rename = "item.completed")]
    ItemCompleted { item: WireItem },
    #[serde(rename = "turn.completed")]
    TurnCompleted {
        #[serde(default)]
        usage: Option<Value>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum WireItem {
    #[serde(rename = "agent_message")]
    AgentMessage { text: String },
    #[serde(other)]
    Other,
}

impl AgentEvent {
    /// Classify an already-parsed JSON value.
    ///
    /// Values whose known `type` carries an unexpected payload shape are
    /// treated as unrecognized rather than rejected.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<WireEvent>(value) {
            Ok(WireEvent::ThreadStarted { thread_id }) => Self::SessionStarted {
                session_id: thread_id,
            },
            Ok(WireEvent::ItemCompleted {
                item: WireItem::AgentMessage { text },
            }) => Self::MessageCompleted { text },
            Ok(WireEvent::TurnCompleted { usage: Some(usage) }) if !usage.is_null() => {
                Self::TurnCompleted { usage }
            }
            _ => Self::Unrecognized,
        }
    }
}

/// Incremental newline-delimited JSON decoder.
///
/// Reassembly works on raw bytes so that a UTF-8 sequence split across two
/// chunks is decoded intact once its line completes.
#[derive(Debug, Default)]
pub struct EventDecoder {
    buffer: Vec<u8>,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every event completed by it, in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<AgentEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + offset;
            if let Some(event) = parse_line(&self.buffer[consumed..end]) {
                events.push(event);
            }
            consumed = end + 1;
        }
        self.buffer.drain(..consumed);
        events
    }

    /// Bytes buffered after the last newline.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Give the unterminated remainder one last parse attempt and clear it.
    pub fn finish(&mut self) -> Option<AgentEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(raw: &[u8]) -> Option<AgentEvent> {
    let line = raw.trim_ascii();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_slice::<Value>(line) {
        Ok(value) => Some(AgentEvent::from_value(value)),
        Err(e) => {
            tracing::trace!(error = %e, "Dropping non-JSON line from codex stdout");
            None
        }
    }
}

/// Decode a complete byte stream in one go.
pub fn decode_all(bytes: &[u8]) -> Vec<AgentEvent> {
    let mut decoder = EventDecoder::new();
    let mut events = decoder.push(bytes);
    events.extend(decoder.finish());
    events
}
