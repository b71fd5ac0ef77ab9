//! Codex CLI process orchestration
//!
//! Everything needed to run one `codex exec --json` turn and reduce its
//! output to a [`RunOutcome`]:
//! - [`args`]: argument vector construction
//! - [`events`]: newline-delimited event decoding
//! - [`reduce`]: folding events into an outcome
//! - [`runner`]: the child process itself, behind the [`AgentInvoker`] seam

pub mod args;
pub mod error;
pub mod events;
pub mod reduce;
pub mod runner;

pub use args::{Invocation, build_args, toml_string};
pub use error::BridgeError;
pub use events::{AgentEvent, EventDecoder, decode_all};
pub use reduce::{RunAccumulator, RunOutcome, reduce};
pub use runner::{
    AgentInvoker, CodexProcess, DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS, MIN_TIMEOUT_MS,
    clamp_timeout_ms,
};
