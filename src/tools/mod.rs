//! MCP tools backed by codex
//!
//! | tool | alias | result field |
//! |---|---|---|
//! | `codex_chat` | | `reply` |
//! | `codex_plan` | `codex_guard_plan` | `critique` |
//! | `codex_review` | `codex_guard_final` | `review` |
//!
//! Every tool shares the session arguments (`session_id`, `cwd`, `model`,
//! `reasoning_effort`, `timeout_ms`) and returns the session id together with
//! a `codex resume` command for picking the conversation up by hand.

pub mod prompts;

use crate::bridge::{CallRequest, CodexBridge};
use crate::codex::{MAX_TIMEOUT_MS, MIN_TIMEOUT_MS, RunOutcome};
use crate::mcp::{CallToolResult, McpServer, McpToolHandler};
use futures::FutureExt;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::sync::Arc;

/// Instructions returned from `initialize`.
pub const INSTRUCTIONS: &str = "Talk to Codex CLI through persisted sessions. Pass `cwd` (repo root) \
     to start a session and reuse the returned `session_id` to continue it; the same session can be \
     resumed by a human with the returned `resume_hint`.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Chat,
    Plan,
    Review,
}

impl ToolKind {
    /// Name of the reply field in the structured result.
    pub fn reply_field(self) -> &'static str {
        match self {
            ToolKind::Chat => "reply",
            ToolKind::Plan => "critique",
            ToolKind::Review => "review",
        }
    }

    fn description(self) -> &'static str {
        match self {
            ToolKind::Chat => {
                "Chat with Codex CLI using a real persisted session that can be resumed via `codex resume <session_id>`."
            }
            ToolKind::Plan => {
                "Ask Codex to critique a proposed plan (missing items, risks, questions, tests)."
            }
            ToolKind::Review => {
                "Ask Codex to review final changes (correctness, regressions, missing coverage)."
            }
        }
    }
}

/// Every registered tool name with its kind.
pub const TOOLS: &[(&str, ToolKind)] = &[
    ("codex_chat", ToolKind::Chat),
    ("codex_plan", ToolKind::Plan),
    ("codex_guard_plan", ToolKind::Plan),
    ("codex_review", ToolKind::Review),
    ("codex_guard_final", ToolKind::Review),
];

#[derive(Debug, Default, Deserialize)]
struct SessionArgs {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default, alias = "working_dir")]
    cwd: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    reasoning_effort: Option<String>,
    #[serde(default, deserialize_with = "whole_millis")]
    timeout_ms: Option<u64>,
}

/// Integer milliseconds. Whole floats such as `5000.0` count as integers.
fn whole_millis<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let Some(number) = Option::<serde_json::Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Some(ms) = number.as_u64() {
        return Ok(Some(ms));
    }
    match number.as_f64() {
        Some(ms) if ms.fract() == 0.0 && (0.0..=u64::MAX as f64).contains(&ms) => {
            Ok(Some(ms as u64))
        }
        _ => Err(serde::de::Error::custom(format!(
            "`timeout_ms` must be a non-negative integer, got {number}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct ChatArgs {
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct PlanArgs {
    requirements: String,
    plan: String,
    #[serde(default)]
    constraints: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReviewArgs {
    change_summary: String,
    #[serde(default)]
    test_results: Option<String>,
    #[serde(default)]
    open_questions: Option<String>,
}

fn parse<T: for<'de> Deserialize<'de>>(arguments: &Value) -> Result<T, String> {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments.clone()
    };
    serde_json::from_value(arguments).map_err(|e| e.to_string())
}

fn require_text(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("`{field}` must not be empty"));
    }
    Ok(())
}

/// Validate arguments and build the bridge request for `tool`.
pub fn build_request(
    tool: &str,
    kind: ToolKind,
    reply_language: &str,
    arguments: &Value,
) -> Result<CallRequest, String> {
    let session: SessionArgs = parse(arguments)?;

    if let Some(id) = &session.session_id {
        let hyphenated = uuid::Uuid::try_parse(id)
            .ok()
            .map(|uuid| uuid.hyphenated().to_string());
        if !hyphenated.is_some_and(|canonical| canonical.eq_ignore_ascii_case(id)) {
            return Err(format!("`session_id` must be a hyphenated UUID, got {id:?}"));
        }
    }
    if let Some(cwd) = &session.cwd {
        require_text("cwd", cwd)?;
    }
    if let Some(effort) = &session.reasoning_effort {
        require_text("reasoning_effort", effort)?;
    }
    if let Some(ms) = session.timeout_ms {
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&ms) {
            return Err(format!(
                "`timeout_ms` must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS}, got {ms}"
            ));
        }
    }

    let prompt = match kind {
        ToolKind::Chat => {
            let args: ChatArgs = parse(arguments)?;
            require_text("prompt", &args.prompt)?;
            args.prompt
        }
        ToolKind::Plan => {
            let args: PlanArgs = parse(arguments)?;
            require_text("requirements", &args.requirements)?;
            require_text("plan", &args.plan)?;
            prompts::plan_prompt(
                reply_language,
                &args.requirements,
                &args.plan,
                args.constraints.as_deref(),
            )
        }
        ToolKind::Review => {
            let args: ReviewArgs = parse(arguments)?;
            require_text("change_summary", &args.change_summary)?;
            prompts::review_prompt(
                reply_language,
                &args.change_summary,
                args.test_results.as_deref(),
                args.open_questions.as_deref(),
            )
        }
    };

    Ok(CallRequest {
        tool: tool.to_string(),
        session_id: session.session_id,
        cwd: session.cwd.map(PathBuf::from),
        prompt,
        model: session.model,
        reasoning_effort: session.reasoning_effort,
        timeout_ms: session.timeout_ms,
    })
}

/// Structured result: `{session_id, <reply field>, resume_hint, usage?}`.
pub fn structured_output(kind: ToolKind, outcome: &RunOutcome, resume_hint: String) -> Value {
    let mut out = Map::new();
    out.insert("session_id".to_string(), Value::from(outcome.session_id.clone()));
    out.insert(kind.reply_field().to_string(), Value::from(outcome.reply.clone()));
    out.insert("resume_hint".to_string(), Value::from(resume_hint));
    if let Some(usage) = &outcome.usage {
        out.insert("usage".to_string(), usage.clone());
    }
    Value::Object(out)
}

pub fn input_schema(kind: ToolKind) -> Value {
    let mut properties = json!({
        "session_id": {
            "type": "string",
            "format": "uuid",
            "description": "Existing Codex session id (UUID). Omit to start a new session."
        }
    });
    let specific = match kind {
        ToolKind::Chat => json!({
            "prompt": {"type": "string", "minLength": 1, "description": "User message to send to Codex."}
        }),
        ToolKind::Plan => json!({
            "requirements": {"type": "string", "minLength": 1, "description": "User requirements / acceptance criteria."},
            "plan": {"type": "string", "minLength": 1, "description": "Proposed plan to critique."},
            "constraints": {"type": "string", "description": "Optional constraints (tech, time, safety)."}
        }),
        ToolKind::Review => json!({
            "change_summary": {"type": "string", "minLength": 1, "description": "What changed and why."},
            "test_results": {"type": "string", "description": "Test results or commands run."},
            "open_questions": {"type": "string", "description": "Anything uncertain that needs a decision."}
        }),
    };
    let shared = json!({
        "cwd": {
            "type": "string",
            "minLength": 1,
            "description": "Working root passed to Codex (-C). Required for new sessions; optional when resuming via session_id. Alias: working_dir."
        },
        "model": {"type": "string", "description": "Optional Codex model override."},
        "reasoning_effort": {
            "type": "string",
            "minLength": 1,
            "description": "Optional per-request override for model_reasoning_effort (e.g. low, medium, high)."
        },
        "timeout_ms": {
            "type": "integer",
            "minimum": MIN_TIMEOUT_MS,
            "maximum": MAX_TIMEOUT_MS,
            "description": "Execution timeout in milliseconds."
        }
    });

    if let (Some(props), Value::Object(specific), Value::Object(shared)) =
        (properties.as_object_mut(), specific, shared)
    {
        props.extend(specific);
        props.extend(shared);
    }

    let required: Vec<&str> = match kind {
        ToolKind::Chat => vec!["prompt"],
        ToolKind::Plan => vec!["requirements", "plan"],
        ToolKind::Review => vec!["change_summary"],
    };
    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn output_schema(kind: ToolKind) -> Value {
    json!({
        "type": "object",
        "properties": {
            "session_id": {"type": "string"},
            kind.reply_field(): {"type": "string"},
            "resume_hint": {"type": "string"},
            "usage": {}
        },
        "required": ["session_id", kind.reply_field(), "resume_hint"]
    })
}

async fn handle(bridge: Arc<CodexBridge>, tool: String, kind: ToolKind, arguments: Value) -> CallToolResult {
    let request = match build_request(&tool, kind, &bridge.config().reply_language, &arguments) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(tool = %tool, error = %e, "Rejected tool arguments");
            return CallToolResult::error(format!("Invalid arguments for {tool}: {e}"));
        }
    };

    match bridge.call(request).await {
        Ok(outcome) => {
            let hint = bridge.resume_hint(&outcome.session_id);
            let structured = structured_output(kind, &outcome, hint);
            CallToolResult::structured(outcome.reply, structured)
        }
        Err(e) => {
            tracing::warn!(tool = %tool, kind = e.kind(), error = %e, "codex call failed");
            CallToolResult::error(e.to_string())
        }
    }
}

fn handler(bridge: &Arc<CodexBridge>, tool: &str, kind: ToolKind) -> McpToolHandler {
    let bridge = Arc::clone(bridge);
    let tool = tool.to_string();
    Arc::new(move |arguments: Value| {
        handle(Arc::clone(&bridge), tool.clone(), kind, arguments)
            .map(Ok::<_, anyhow::Error>)
            .boxed()
    })
}

/// Register every codex tool, aliases included.
pub async fn register_tools(server: &McpServer, bridge: Arc<CodexBridge>) {
    for (name, kind) in TOOLS {
        server
            .register_tool(
                name,
                kind.description(),
                input_schema(*kind),
                Some(output_schema(*kind)),
                handler(&bridge, name, *kind),
            )
            .await;
    }
    tracing::debug!(count = TOOLS.len(), "Registered codex tools");
}
