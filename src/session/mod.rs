//! Session state shared across tool calls
//!
//! Codex owns the sessions themselves; this module keeps the bridge's view of
//! them: call ordering per session, where each session runs, and the files
//! codex reads to list resumable sessions.

pub mod history;
pub mod pointer;
pub mod queue;
pub mod transcripts;

pub use history::{HistoryIndexer, Recorded, history_label};
pub use queue::SessionQueue;
pub use transcripts::{Promotion, SessionMeta, SessionResolver, TranscriptStore};
