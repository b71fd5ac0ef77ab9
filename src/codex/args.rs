//! Command-line construction for `codex exec`.

use std::path::{Path, PathBuf};

/// Fully resolved inputs for one codex run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Existing session to resume; `None` starts a new one.
    pub session_id: Option<String>,
    /// Working root passed with `-C`.
    pub cwd: PathBuf,
    /// Final prompt, header already injected.
    pub prompt: String,
    pub model: Option<String>,
    pub reasoning_effort: Option<String>,
    pub timeout_ms: u64,
}

/// Quote a value as a TOML basic string for `-c key=value` overrides.
pub fn toml_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Build the argument vector. The prompt is always the final positional.
pub fn build_args(invocation: &Invocation) -> Vec<String> {
    let mut args = vec![
        "exec".to_string(),
        "--skip-git-repo-check".to_string(),
        "--json".to_string(),
        "-C".to_string(),
        path_arg(&invocation.cwd),
    ];

    if let Some(model) = invocation.model.as_deref().filter(|m| !m.is_empty()) {
        args.push("-m".to_string());
        args.push(model.to_string());
    }
    if let Some(effort) = invocation
        .reasoning_effort
        .as_deref()
        .filter(|e| !e.is_empty())
    {
        args.push("-c".to_string());
        args.push(format!("model_reasoning_effort={}", toml_string(effort)));
    }

    if let Some(session_id) = &invocation.session_id {
        args.push("resume".to_string());
        args.push(session_id.clone());
    }
    args.push(invocation.prompt.clone());
    args
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
