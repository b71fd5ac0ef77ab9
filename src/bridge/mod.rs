//! Call orchestration
//!
//! [`CodexBridge`] owns all process-lifetime state and turns one tool call
//! into one codex run:
//!
//! 1. resolve the session (explicit id, else the workspace pointer)
//! 2. queue behind earlier calls for the same session
//! 3. resolve the working directory and build the prompt
//! 4. run codex through the [`AgentInvoker`]
//! 5. on success, update caches and codex's own files
//!
//! Step 5 never fails the call; see [`best_effort`].

pub mod context;

pub use context::ContextInjector;

use crate::codex::{AgentInvoker, BridgeError, CodexProcess, Invocation, RunOutcome};
use crate::config::Config;
use crate::session::{
    HistoryIndexer, SessionQueue, SessionResolver, TranscriptStore, history_label, pointer,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// One tool call after argument validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    /// Tool name, used for the context header and history label
    pub tool: String,
    pub session_id: Option<String>,
    pub cwd: Option<PathBuf>,
    /// User text, before header injection
    pub prompt: String,
    pub model: Option<String>,
    pub reasoning_effort: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Discard the error of a step that must not fail the call.
///
/// This is the only place bookkeeping errors are swallowed.
pub(crate) fn best_effort<T>(step: &str, result: anyhow::Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(step, error = %e, "Best-effort step failed");
            None
        }
    }
}

pub struct CodexBridge {
    config: Config,
    invoker: Arc<dyn AgentInvoker>,
    queue: SessionQueue,
    context: ContextInjector,
    sessions: SessionResolver,
    history: HistoryIndexer,
}

impl CodexBridge {
    /// Bridge that spawns the configured codex binary.
    pub fn new(config: Config) -> Self {
        let invoker = Arc::new(CodexProcess::new(config.codex_bin.clone()));
        Self::with_invoker(config, invoker)
    }

    pub fn with_invoker(config: Config, invoker: Arc<dyn AgentInvoker>) -> Self {
        let context = ContextInjector::new(config.origin.clone(), config.role_card);
        let sessions = SessionResolver::new(TranscriptStore::new(&config.codex_home));
        let history = HistoryIndexer::new(config.history_path(), config.register_history);
        Self {
            config,
            invoker,
            queue: SessionQueue::new(),
            context,
            sessions,
            history,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &SessionResolver {
        &self.sessions
    }

    pub fn context(&self) -> &ContextInjector {
        &self.context
    }

    pub fn queue(&self) -> &SessionQueue {
        &self.queue
    }

    /// `<codex_bin> resume <session_id>`
    pub fn resume_hint(&self, session_id: &str) -> String {
        format!("{} resume {}", self.config.codex_bin, session_id)
    }

    /// Run one call in order with any other calls for the same session.
    pub async fn call(self: &Arc<Self>, mut request: CallRequest) -> Result<RunOutcome, BridgeError> {
        if request.session_id.is_none() && self.config.workspace_pointer {
            if let Some(cwd) = &request.cwd {
                request.session_id =
                    best_effort("read workspace pointer", pointer::read_session_id(cwd).await)
                        .flatten();
                if let Some(id) = &request.session_id {
                    tracing::debug!(session_id = %id, cwd = %cwd.display(), "Resuming session from workspace pointer");
                }
            }
        }

        let bridge = Arc::clone(self);
        let session_id = request.session_id.clone();
        self.queue
            .enqueue(session_id.as_deref(), async move { bridge.run_once(request).await })
            .await
            .map_err(|e| BridgeError::invocation(format!("codex call was aborted: {e}")))?
    }

    async fn run_once(&self, request: CallRequest) -> Result<RunOutcome, BridgeError> {
        let started = Instant::now();
        let CallRequest {
            tool,
            session_id,
            cwd,
            prompt,
            model,
            reasoning_effort,
            timeout_ms,
        } = request;

        let include_role_card = self.context.claim_role_card(session_id.as_deref());
        let cwd = self.resolve_cwd(session_id.as_deref(), cwd.as_deref()).await?;
        let invocation = Invocation {
            session_id: session_id.clone(),
            cwd: cwd.clone(),
            prompt: self.context.inject(&tool, &prompt, include_role_card),
            model,
            reasoning_effort,
            timeout_ms: timeout_ms.unwrap_or(self.config.default_timeout_ms),
        };

        tracing::info!(
            tool = %tool,
            session_id = session_id.as_deref().unwrap_or("<new>"),
            cwd = %cwd.display(),
            "Running codex"
        );
        let outcome = self.invoker.invoke(invocation).await?;

        self.record_success(&tool, &prompt, &cwd, &outcome, include_role_card)
            .await;
        tracing::info!(
            tool = %tool,
            session_id = %outcome.session_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "codex call completed"
        );
        Ok(outcome)
    }

    /// Working directory for a call.
    ///
    /// A new session needs an explicit `cwd`. A resumed session keeps the
    /// directory it is bound to (cached or recorded in its transcript); an
    /// explicit `cwd` only binds a session whose directory is still unknown.
    pub async fn resolve_cwd(
        &self,
        session_id: Option<&str>,
        cwd: Option<&Path>,
    ) -> Result<PathBuf, BridgeError> {
        let Some(session_id) = session_id else {
            return cwd.map(Path::to_path_buf).ok_or_else(|| {
                BridgeError::missing_input("`cwd` is required when starting a new session.")
            });
        };

        if let Some(bound) =
            best_effort("infer session cwd", self.sessions.infer_cwd(session_id).await).flatten()
        {
            if cwd.is_some_and(|cwd| cwd != bound.as_path()) {
                tracing::debug!(
                    session_id,
                    bound = %bound.display(),
                    "Ignoring explicit cwd for a session bound elsewhere"
                );
            }
            return Ok(bound);
        }

        let cwd = cwd.ok_or_else(|| {
            BridgeError::missing_input(
                "`cwd` could not be inferred for this `session_id`. Pass `cwd` once (repo root) to bind it.",
            )
        })?;
        self.sessions.bind_cwd(session_id, cwd);
        Ok(cwd.to_path_buf())
    }

    async fn record_success(
        &self,
        tool: &str,
        prompt: &str,
        cwd: &Path,
        outcome: &RunOutcome,
        include_role_card: bool,
    ) {
        let session_id = outcome.session_id.as_str();
        if include_role_card {
            self.context.mark_carded(session_id);
        }
        self.sessions.bind_cwd(session_id, cwd);

        best_effort(
            "register codex history",
            self.history
                .record(session_id, &history_label(tool, prompt))
                .await,
        );
        if let Some(promotion) =
            best_effort("promote session", self.sessions.promote_once(session_id).await)
        {
            tracing::debug!(session_id, ?promotion, "Session promotion finished");
        }
        if self.config.workspace_pointer {
            best_effort(
                "write workspace pointer",
                pointer::write_session_id(cwd, session_id).await,
            );
        }
    }
}
