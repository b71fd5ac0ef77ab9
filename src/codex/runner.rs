//! Running `codex exec` as a child process
//!
//! One invocation spawns one child with stdin closed and both output streams
//! captured. Stdout feeds the [`EventDecoder`]; stderr is kept verbatim for
//! the failure message. A hard wall-clock timeout kills the child.

use super::args::{Invocation, build_args};
use super::error::BridgeError;
use super::events::EventDecoder;
use super::reduce::{RunAccumulator, RunOutcome};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Lower bound accepted for a per-call timeout.
pub const MIN_TIMEOUT_MS: u64 = 1_000;
/// Upper bound accepted for a per-call timeout.
pub const MAX_TIMEOUT_MS: u64 = 600_000;
/// Timeout used when neither the caller nor the config sets one.
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;

const STDERR_GRACE: Duration = Duration::from_secs(2);

/// Clamp a timeout into the accepted range.
pub fn clamp_timeout_ms(value: u64) -> u64 {
    value.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS)
}

/// Something that can execute one codex turn.
///
/// The bridge depends on this seam instead of on process spawning directly, so
/// orchestration can be exercised with an instrumented stand-in.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, invocation: Invocation) -> Result<RunOutcome, BridgeError>;
}

/// Spawns the real codex binary.
#[derive(Debug, Clone)]
pub struct CodexProcess {
    bin: String,
}

impl CodexProcess {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl AgentInvoker for CodexProcess {
    async fn invoke(&self, invocation: Invocation) -> Result<RunOutcome, BridgeError> {
        let started = Instant::now();
        let timeout_ms = invocation.timeout_ms;
        let args = build_args(&invocation);

        let mut child = Command::new(&self.bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BridgeError::invocation(format!("Failed to spawn {}: {}", self.bin, e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::invocation("codex stdout was not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| BridgeError::invocation("codex stderr was not captured"))?;

        // Stderr drains on its own task so a chatty child never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let mut decoder = EventDecoder::new();
        let mut acc = RunAccumulator::new();

        let drive = async {
            let mut chunk = [0u8; 8192];
            loop {
                match stdout.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => {
                        for event in decoder.push(&chunk[..n]) {
                            acc.observe(event);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read codex stdout");
                        break;
                    }
                }
            }
            child.wait().await
        };

        let waited = timeout(Duration::from_millis(timeout_ms), drive).await;

        let status = match waited {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                return Err(BridgeError::invocation(format!(
                    "Failed to wait for {}: {}",
                    self.bin, e
                )));
            }
            Err(_) => {
                tracing::warn!(timeout_ms, "codex exceeded its timeout, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill timed out codex process");
                }
                None
            }
        };

        // A grandchild may still hold the pipe open after a kill.
        let stderr_bytes = match timeout(STDERR_GRACE, stderr_task).await {
            Ok(Ok(buf)) => buf,
            _ => Vec::new(),
        };
        let stderr_text = String::from_utf8_lossy(&stderr_bytes);
        let details = stderr_text.trim();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let Some(status) = status else {
            return Err(BridgeError::invocation(if details.is_empty() {
                format!("{} timed out after {} ms", self.bin, timeout_ms)
            } else {
                details.to_string()
            }));
        };

        if !status.success() {
            tracing::debug!(exit_code = ?status.code(), elapsed_ms, "codex exited with failure");
            return Err(BridgeError::invocation(if details.is_empty() {
                match status.code() {
                    Some(code) => format!("{} exited with code {}", self.bin, code),
                    None => format!("{} was terminated by a signal", self.bin),
                }
            } else {
                details.to_string()
            }));
        }

        if let Some(event) = decoder.finish() {
            acc.observe(event);
        }

        tracing::debug!(
            elapsed_ms,
            messages = acc.messages.len(),
            "codex run finished"
        );
        acc.finish()
    }
}
