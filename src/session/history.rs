//! Registration of MCP sessions in codex's prompt history
//!
//! `codex resume` lists sessions from `<codex_home>/history.jsonl`. Sessions
//! started through `codex exec` never land there, so after a successful call
//! we append one compact `{session_id, ts, text}` record per session.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Files larger than this are not searched for an existing record.
pub const SCAN_LIMIT_BYTES: u64 = 5_000_000;

const EXCERPT_CHARS: usize = 140;

#[derive(Debug, Serialize)]
struct HistoryEntry<'a> {
    session_id: &'a str,
    ts: i64,
    text: &'a str,
}

/// What [`HistoryIndexer::record`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Appended,
    AlreadyPresent,
    Disabled,
}

/// Appends at most one history record per session.
pub struct HistoryIndexer {
    path: PathBuf,
    enabled: bool,
    recorded: Mutex<HashSet<String>>,
}

impl HistoryIndexer {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled,
            recorded: Mutex::new(HashSet::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_recorded(&self, session_id: &str) -> bool {
        self.recorded.lock().contains(session_id)
    }

    /// Append a record for `session_id` unless one exists already.
    pub async fn record(&self, session_id: &str, label: &str) -> Result<Recorded> {
        if !self.enabled {
            return Ok(Recorded::Disabled);
        }
        if self.is_recorded(session_id) {
            return Ok(Recorded::AlreadyPresent);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        if self.file_mentions(session_id).await {
            self.recorded.lock().insert(session_id.to_string());
            return Ok(Recorded::AlreadyPresent);
        }

        let entry = HistoryEntry {
            session_id,
            ts: chrono::Utc::now().timestamp(),
            text: label,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        self.recorded.lock().insert(session_id.to_string());
        tracing::debug!(session_id = %session_id, path = %self.path.display(), "Registered session in codex history");
        Ok(Recorded::Appended)
    }

    async fn file_mentions(&self, session_id: &str) -> bool {
        let Ok(metadata) = fs::metadata(&self.path).await else {
            return false;
        };
        if metadata.len() > SCAN_LIMIT_BYTES {
            return false;
        }
        match fs::read(&self.path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).contains(session_id),
            Err(_) => false,
        }
    }
}

/// Short history label: `MCP <kind>: <prompt excerpt>`.
pub fn history_label(tool: &str, prompt: &str) -> String {
    let prefix = match tool {
        "codex_chat" => "MCP chat".to_string(),
        "codex_plan" | "codex_guard_plan" => "MCP plan".to_string(),
        "codex_review" | "codex_guard_final" => "MCP review".to_string(),
        other => format!("MCP {other}"),
    };
    let excerpt: String = prompt
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(EXCERPT_CHARS)
        .collect();
    if excerpt.is_empty() {
        prefix
    } else {
        format!("{prefix}: {excerpt}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_label_prefixes() {
        assert_eq!(history_label("codex_chat", "hi"), "MCP chat: hi");
        assert_eq!(history_label("codex_guard_plan", "x"), "MCP plan: x");
        assert_eq!(history_label("codex_review", "x"), "MCP review: x");
        assert_eq!(history_label("codex_other", "x"), "MCP codex_other: x");
        assert_eq!(history_label("codex_chat", " \n\t "), "MCP chat");
    }

    #[test]
    fn test_label_collapses_whitespace_and_truncates() {
        assert_eq!(
            history_label("codex_chat", "  fix\n\nthe   build\t now "),
            "MCP chat: fix the build now"
        );
        let long = "é".repeat(500);
        let label = history_label("codex_chat", &long);
        assert_eq!(label.chars().count(), "MCP chat: ".len() + EXCERPT_CHARS);
    }

    #[tokio::test]
    async fn test_record_appends_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("history.jsonl");
        let indexer = HistoryIndexer::new(&path, true);

        assert_eq!(
            indexer.record("sess-1", "MCP chat: hi").await.unwrap(),
            Recorded::Appended
        );
        assert_eq!(
            indexer.record("sess-1", "MCP chat: again").await.unwrap(),
            Recorded::AlreadyPresent
        );

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 1);
        let entry: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(entry["session_id"], "sess-1");
        assert_eq!(entry["text"], "MCP chat: hi");
        assert!(entry["ts"].as_i64().unwrap() > 1_600_000_000);
    }

    #[tokio::test]
    async fn test_existing_record_in_file_is_respected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        std::fs::write(
            &path,
            "{\"session_id\":\"sess-2\",\"ts\":1,\"text\":\"from codex\"}\n",
        )
        .unwrap();

        // A fresh indexer stands in for a restarted server.
        let indexer = HistoryIndexer::new(&path, true);
        assert_eq!(
            indexer.record("sess-2", "MCP chat: hi").await.unwrap(),
            Recorded::AlreadyPresent
        );
        assert!(indexer.is_recorded("sess-2"));
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);

        indexer.record("sess-3", "MCP plan: p").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn test_disabled_indexer_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        let indexer = HistoryIndexer::new(&path, false);
        assert_eq!(
            indexer.record("sess-1", "MCP chat").await.unwrap(),
            Recorded::Disabled
        );
        assert!(!path.exists());
    }

    /// History file of exactly `len` bytes whose first line mentions `session_id`.
    fn history_of_len(path: &Path, session_id: &str, len: u64) {
        let mut content = format!("{{\"session_id\":\"{session_id}\",\"ts\":1,\"text\":\"x\"}}\n");
        content.push_str(&"#".repeat(len as usize - content.len()));
        std::fs::write(path, content).unwrap();
        assert_eq!(std::fs::metadata(path).unwrap().len(), len);
    }

    #[tokio::test]
    async fn test_file_at_scan_limit_is_searched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        history_of_len(&path, "sess-big", SCAN_LIMIT_BYTES);

        let indexer = HistoryIndexer::new(&path, true);
        assert_eq!(
            indexer.record("sess-big", "MCP chat: hi").await.unwrap(),
            Recorded::AlreadyPresent
        );
        assert_eq!(std::fs::metadata(&path).unwrap().len(), SCAN_LIMIT_BYTES);
    }

    #[tokio::test]
    async fn test_file_over_scan_limit_is_not_searched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        history_of_len(&path, "sess-big", SCAN_LIMIT_BYTES + 1);

        let indexer = HistoryIndexer::new(&path, true);
        assert_eq!(
            indexer.record("sess-big", "MCP chat: hi").await.unwrap(),
            Recorded::Appended
        );
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("\"text\":\"MCP chat: hi\"}\n"));
    }
}
