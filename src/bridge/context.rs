//! Machine-origin context header for outbound prompts
//!
//! A codex session can be continued both by a human (`codex resume`) and by an
//! agent through this server. Every prompt we send is prefixed with a
//! delimited block naming the caller so codex can tell the two apart, and the
//! first prompt of a session additionally carries a role card.

use parking_lot::Mutex;
use std::collections::HashSet;

pub const CONTEXT_BEGIN: &str = "<<<MCP_CONTEXT_BEGIN>>>";
pub const CONTEXT_END: &str = "<<<MCP_CONTEXT_END>>>";
pub const ROLE_CARD_BEGIN: &str = "<<<ROLE_CARD_BEGIN>>>";
pub const ROLE_CARD_END: &str = "<<<ROLE_CARD_END>>>";

/// What codex is expected to do for a given tool.
pub fn responsibility(tool: &str) -> &'static str {
    match tool {
        "codex_chat" => {
            "You are advising the calling AI agent (not the end user). If you need user input, \
             list the minimum questions for the agent to ask the user (do not ask the user directly). \
             If you disagree or suspect a misunderstanding, state it and name the differing assumption."
        }
        "codex_plan" | "codex_guard_plan" => {
            "Review a proposed plan for missing requirements, risks, unclear questions, and suggested tests. \
             If you suspect misunderstanding, call it out and propose the minimum clarifying questions \
             for the agent to ask the user."
        }
        "codex_review" | "codex_guard_final" => {
            "Review final change summary for correctness, regressions, missing coverage, and rollback concerns. \
             Distinguish blockers vs suggestions and keep feedback concise. If you need user input, \
             list the minimum questions for the agent to ask the user."
        }
        _ => "Handle the request appropriately.",
    }
}

pub fn role_card() -> String {
    [
        ROLE_CARD_BEGIN,
        "This session may include messages from a human user (via `codex resume`) and from an AI agent (via MCP).",
        "If the message includes an `<<<MCP_CONTEXT_BEGIN>>>` block, you are advising the calling AI agent (not the end user).",
        "If you need user input, list the minimum questions for the agent to ask the user (do not ask the user directly).",
        "If the message has no MCP context block, treat it as coming from the human user.",
        "Keep responses concise and practical; avoid endless critique loops.",
        ROLE_CARD_END,
    ]
    .join("\n")
}

/// Builds outbound prompts and remembers which sessions have seen the role card.
pub struct ContextInjector {
    origin: String,
    role_card_enabled: bool,
    carded: Mutex<HashSet<String>>,
}

impl ContextInjector {
    pub fn new(origin: impl Into<String>, role_card_enabled: bool) -> Self {
        Self {
            origin: origin.into(),
            role_card_enabled,
            carded: Mutex::new(HashSet::new()),
        }
    }

    /// Decide whether this call carries the role card.
    ///
    /// A known session is marked immediately. A new session is marked by
    /// [`Self::mark_carded`] once codex has assigned it an id.
    pub fn claim_role_card(&self, session_id: Option<&str>) -> bool {
        if !self.role_card_enabled {
            return false;
        }
        match session_id {
            None => true,
            Some(id) => self.carded.lock().insert(id.to_string()),
        }
    }

    pub fn mark_carded(&self, session_id: &str) {
        self.carded.lock().insert(session_id.to_string());
    }

    pub fn has_carded(&self, session_id: &str) -> bool {
        self.carded.lock().contains(session_id)
    }

    pub fn header(&self, tool: &str) -> String {
        [
            CONTEXT_BEGIN.to_string(),
            format!("origin={}", self.origin),
            format!("tool={tool}"),
            "audience=ai_agent".to_string(),
            format!("responsibility={}", responsibility(tool)),
            "sender=ai_agent".to_string(),
            CONTEXT_END.to_string(),
        ]
        .join("\n")
    }

    pub fn inject(&self, tool: &str, text: &str, include_role_card: bool) -> String {
        let header = self.header(tool);
        if include_role_card {
            format!("{header}\n\n{}\n\n{text}", role_card())
        } else {
            format!("{header}\n\n{text}")
        }
    }
}
