//! Per-workspace record of the last codex session used from a directory.
//!
//! Lives at `<cwd>/.claude/codex_session.json`. Other keys in the file are
//! left alone on update.

use super::transcripts::replace_atomically;
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const POINTER_DIR: &str = ".claude";
pub const POINTER_FILE: &str = "codex_session.json";

pub fn pointer_path(cwd: &Path) -> PathBuf {
    cwd.join(POINTER_DIR).join(POINTER_FILE)
}

/// Session id stored for `cwd`, if the file exists and names one.
pub async fn read_session_id(cwd: &Path) -> Result<Option<String>> {
    let path = pointer_path(cwd);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid workspace pointer: {}", path.display()))?;
    Ok(value
        .get("session_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(String::from))
}

/// Point `cwd` at `session_id`, keeping unrelated fields of an existing file.
pub async fn write_session_id(cwd: &Path, session_id: &str) -> Result<PathBuf> {
    let dir = cwd.join(POINTER_DIR);
    fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(POINTER_FILE);

    let mut fields = match fs::read_to_string(&path).await {
        Ok(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        },
        Err(_) => Map::new(),
    };
    fields.insert("session_id".to_string(), Value::from(session_id));
    fields.insert(
        "updated_at".to_string(),
        Value::from(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
    );

    let mut content = serde_json::to_string_pretty(&Value::Object(fields))?;
    content.push('\n');
    replace_atomically(&path, content.as_bytes()).await?;
    Ok(path)
}
