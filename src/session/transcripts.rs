//! Codex transcript (rollout) store
//!
//! Codex persists every session under its home directory as
//! `sessions/YYYY/MM/DD/rollout-<timestamp>-<session id>.jsonl`. The first line
//! of each file is a `session_meta` record:
//!
//! ```text
//! {"type":"session_meta","payload":{"id":"…","cwd":"/repo","originator":"codex_exec","source":"exec",…}}
//! ```
//!
//! This module reads that header to recover the working directory of a
//! session and rewrites it to promote `exec` sessions so that they show up in
//! `codex resume`. The store is owned by codex; nothing here assumes exclusive
//! access, and the only mutation is an atomic whole-file replace.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Provenance written by `codex exec`.
pub const EXEC_ORIGINATOR: &str = "codex_exec";
pub const EXEC_SOURCE: &str = "exec";
/// Provenance written by the interactive CLI.
pub const CLI_ORIGINATOR: &str = "codex_cli_rs";
pub const CLI_SOURCE: &str = "cli";

/// Fields of interest from a transcript's `session_meta` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMeta {
    pub id: Option<String>,
    pub cwd: Option<String>,
    pub originator: Option<String>,
    pub source: Option<String>,
}

impl SessionMeta {
    /// Extract the header fields from a parsed first line. Returns `None` when
    /// the record is not a `session_meta` event.
    pub fn from_header(header: &Value) -> Option<Self> {
        if header.get("type").and_then(Value::as_str) != Some("session_meta") {
            return None;
        }
        let payload = header.get("payload");
        let field = |name: &str| {
            payload
                .and_then(|p| p.get(name))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        Some(Self {
            id: field("id"),
            cwd: field("cwd"),
            originator: field("originator"),
            source: field("source"),
        })
    }
}

/// Result of a promotion attempt. Everything except `Promoted` leaves the
/// file untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    Promoted,
    AlreadyAttempted,
    NotFound,
    NoHeaderLine,
    NotSessionMeta,
    IdMismatch,
    NotExecSession,
    UnsafeHeader,
}

/// Reader/writer for the date-partitioned transcript tree.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    sessions_root: PathBuf,
}

impl TranscriptStore {
    /// Store rooted at `<codex_home>/sessions`.
    pub fn new(codex_home: impl AsRef<Path>) -> Self {
        Self {
            sessions_root: codex_home.as_ref().join("sessions"),
        }
    }

    /// Find the most recently modified transcript whose file name contains
    /// `session_id`.
    pub async fn find_transcript(&self, session_id: &str) -> Result<Option<PathBuf>> {
        if session_id.is_empty() || !self.sessions_root.exists() {
            return Ok(None);
        }

        let mut best: Option<(SystemTime, PathBuf)> = None;
        for year in subdirectories(&self.sessions_root).await? {
            for month in subdirectories(&year).await.unwrap_or_default() {
                for day in subdirectories(&month).await.unwrap_or_default() {
                    let Ok(mut entries) = fs::read_dir(&day).await else {
                        continue;
                    };
                    while let Some(entry) = entries.next_entry().await? {
                        let name = entry.file_name();
                        let name = name.to_string_lossy();
                        if !name.ends_with(".jsonl") || !name.contains(session_id) {
                            continue;
                        }
                        let Ok(metadata) = entry.metadata().await else {
                            continue;
                        };
                        if !metadata.is_file() {
                            continue;
                        }
                        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                        if best.as_ref().is_none_or(|(at, _)| modified > *at) {
                            best = Some((modified, entry.path()));
                        }
                    }
                }
            }
        }

        Ok(best.map(|(_, path)| path))
    }

    /// Parse only the first line of a transcript.
    pub async fn read_meta(path: &Path) -> Result<Option<SessionMeta>> {
        let file = fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open transcript: {}", path.display()))?;
        let mut reader = BufReader::new(file);
        let mut first = String::new();
        reader.read_line(&mut first).await?;

        let first = first.trim();
        if first.is_empty() {
            return Ok(None);
        }
        let header: Value = serde_json::from_str(first)
            .with_context(|| format!("Transcript header is not JSON: {}", path.display()))?;
        Ok(SessionMeta::from_header(&header))
    }

    /// Working directory recorded for `session_id`, if a transcript exists.
    pub async fn session_cwd(&self, session_id: &str) -> Result<Option<PathBuf>> {
        let Some(path) = self.find_transcript(session_id).await? else {
            return Ok(None);
        };
        Ok(Self::read_meta(&path)
            .await?
            .and_then(|meta| meta.cwd)
            .map(PathBuf::from))
    }

    /// Rewrite an `exec` session header to the interactive CLI provenance.
    ///
    /// Only the first line changes; every following byte is written back
    /// unchanged. The new content goes to a sibling temp file which is then
    /// renamed over the transcript.
    pub async fn promote(&self, session_id: &str) -> Result<Promotion> {
        let Some(path) = self.find_transcript(session_id).await? else {
            return Ok(Promotion::NotFound);
        };

        let raw = fs::read(&path)
            .await
            .with_context(|| format!("Failed to read transcript: {}", path.display()))?;
        let Some(newline) = raw.iter().position(|b| *b == b'\n') else {
            return Ok(Promotion::NoHeaderLine);
        };
        let (head, rest) = (&raw[..newline], &raw[newline + 1..]);

        let head = std::str::from_utf8(head)
            .context("Transcript header is not UTF-8")?
            .trim_end();
        let mut header: Value =
            serde_json::from_str(head).context("Transcript header is not JSON")?;
        let Some(meta) = SessionMeta::from_header(&header) else {
            return Ok(Promotion::NotSessionMeta);
        };
        if meta.id.as_deref() != Some(session_id) {
            return Ok(Promotion::IdMismatch);
        }
        if meta.originator.as_deref() != Some(EXEC_ORIGINATOR)
            || meta.source.as_deref() != Some(EXEC_SOURCE)
        {
            return Ok(Promotion::NotExecSession);
        }

        let Some(payload) = header.get_mut("payload").and_then(Value::as_object_mut) else {
            return Ok(Promotion::NotSessionMeta);
        };
        payload.insert("originator".to_string(), Value::from(CLI_ORIGINATOR));
        payload.insert("source".to_string(), Value::from(CLI_SOURCE));

        let new_head = serde_json::to_string(&header)?;
        if new_head.contains('\n') {
            return Ok(Promotion::UnsafeHeader);
        }

        let mut content = Vec::with_capacity(new_head.len() + 1 + rest.len());
        content.extend_from_slice(new_head.as_bytes());
        content.push(b'\n');
        content.extend_from_slice(rest);
        replace_atomically(&path, &content).await?;

        tracing::info!(session_id = %session_id, path = %path.display(), "Promoted exec session for codex resume");
        Ok(Promotion::Promoted)
    }
}

/// Write `content` next to `path` and rename it into place.
pub(crate) async fn replace_atomically(path: &Path, content: &[u8]) -> Result<()> {
    let millis = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".tmp.{}.{}", std::process::id(), millis));
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, content)
        .await
        .with_context(|| format!("Failed to write temp file: {}", tmp.display()))?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e).with_context(|| format!("Failed to replace {}", path.display()));
    }
    Ok(())
}

async fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

/// Transcript lookups plus the process-lifetime caches that sit in front of
/// them: session → working directory, and the set of sessions whose promotion
/// has already been attempted.
pub struct SessionResolver {
    store: TranscriptStore,
    cwd_cache: Mutex<HashMap<String, PathBuf>>,
    promoted: Mutex<HashSet<String>>,
}

impl SessionResolver {
    pub fn new(store: TranscriptStore) -> Self {
        Self {
            store,
            cwd_cache: Mutex::new(HashMap::new()),
            promoted: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &TranscriptStore {
        &self.store
    }

    pub fn cached_cwd(&self, session_id: &str) -> Option<PathBuf> {
        self.cwd_cache.lock().get(session_id).cloned()
    }

    /// Remember the working directory a session runs in.
    pub fn bind_cwd(&self, session_id: &str, cwd: impl Into<PathBuf>) {
        self.cwd_cache
            .lock()
            .insert(session_id.to_string(), cwd.into());
    }

    /// Cached directory, or one read from the session's transcript header.
    /// A successful lookup is cached for the rest of the process.
    pub async fn infer_cwd(&self, session_id: &str) -> Result<Option<PathBuf>> {
        if let Some(cwd) = self.cached_cwd(session_id) {
            return Ok(Some(cwd));
        }
        let found = self.store.session_cwd(session_id).await?;
        if let Some(cwd) = &found {
            tracing::debug!(session_id = %session_id, cwd = %cwd.display(), "Inferred session cwd from transcript");
            self.bind_cwd(session_id, cwd.clone());
        }
        Ok(found)
    }

    /// Promote a session at most once per process, whatever the outcome.
    pub async fn promote_once(&self, session_id: &str) -> Result<Promotion> {
        if !self.promoted.lock().insert(session_id.to_string()) {
            return Ok(Promotion::AlreadyAttempted);
        }
        self.store.promote(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const SESSION: &str = "0199a213-81c0-7800-8aa1-bbab2a035a53";

    fn header(id: &str, cwd: &str, originator: &str, source: &str) -> String {
        format!(
            r#"{{"timestamp":"2025-10-01T09:00:00.000Z","type":"session_meta","payload":{{"id":"{id}","timestamp":"2025-10-01T09:00:00.000Z","cwd":"{cwd}","originator":"{originator}","cli_version":"0.44.0","source":"{source}"}}}}"#
        )
    }

    fn write_transcript(home: &Path, day: &str, name: &str, content: &str) -> PathBuf {
        let dir = home.join("sessions").join(day);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn set_mtime(path: &Path, at: SystemTime) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(at).unwrap();
    }

    #[tokio::test]
    async fn test_find_picks_most_recent_match() {
        let home = TempDir::new().unwrap();
        let old = write_transcript(
            home.path(),
            "2025/09/30",
            &format!("rollout-2025-09-30T10-00-00-{SESSION}.jsonl"),
            &format!("{}\n", header(SESSION, "/old", EXEC_ORIGINATOR, EXEC_SOURCE)),
        );
        let new = write_transcript(
            home.path(),
            "2025/10/01",
            &format!("rollout-2025-10-01T10-00-00-{SESSION}.jsonl"),
            &format!("{}\n", header(SESSION, "/new", EXEC_ORIGINATOR, EXEC_SOURCE)),
        );
        write_transcript(
            home.path(),
            "2025/10/01",
            "rollout-2025-10-01T11-00-00-other.jsonl",
            &format!("{}\n", header("other", "/other", EXEC_ORIGINATOR, EXEC_SOURCE)),
        );
        let now = SystemTime::now();
        set_mtime(&old, now);
        set_mtime(&new, now - Duration::from_secs(3600));

        let store = TranscriptStore::new(home.path());
        assert_eq!(store.find_transcript(SESSION).await.unwrap(), Some(old));
        assert_eq!(
            store.session_cwd(SESSION).await.unwrap(),
            Some(PathBuf::from("/old"))
        );
    }

    #[tokio::test]
    async fn test_missing_store_and_unknown_session() {
        let home = TempDir::new().unwrap();
        let store = TranscriptStore::new(home.path());
        assert_eq!(store.find_transcript(SESSION).await.unwrap(), None);
        assert_eq!(store.promote(SESSION).await.unwrap(), Promotion::NotFound);

        write_transcript(home.path(), "2025/10/01", "rollout-x.jsonl", "{}\n");
        assert_eq!(store.session_cwd(SESSION).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_non_jsonl_files_are_ignored() {
        let home = TempDir::new().unwrap();
        write_transcript(
            home.path(),
            "2025/10/01",
            &format!("rollout-{SESSION}.json"),
            &format!("{}\n", header(SESSION, "/repo", EXEC_ORIGINATOR, EXEC_SOURCE)),
        );
        let store = TranscriptStore::new(home.path());
        assert_eq!(store.find_transcript(SESSION).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_promotion_rewrites_only_the_header() {
        let home = TempDir::new().unwrap();
        let body = "{\"type\":\"response_item\",\"payload\":{\"text\":\"a\"}}\n\n{\"type\":\"event_msg\"}\r\nno newline at end";
        let original_header = header(SESSION, "/repo", EXEC_ORIGINATOR, EXEC_SOURCE);
        let path = write_transcript(
            home.path(),
            "2025/10/01",
            &format!("rollout-{SESSION}.jsonl"),
            &format!("{original_header}\n{body}"),
        );

        let store = TranscriptStore::new(home.path());
        assert_eq!(store.promote(SESSION).await.unwrap(), Promotion::Promoted);

        let rewritten = std::fs::read_to_string(&path).unwrap();
        let (first, rest) = rewritten.split_once('\n').unwrap();
        assert_eq!(rest, body);
        assert_eq!(
            first,
            header(SESSION, "/repo", CLI_ORIGINATOR, CLI_SOURCE),
            "field order and other fields must be preserved"
        );

        // Second pass sees a CLI session and leaves it alone.
        assert_eq!(
            store.promote(SESSION).await.unwrap(),
            Promotion::NotExecSession
        );

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_promotion_is_noop_for_other_provenance() {
        let home = TempDir::new().unwrap();
        let content = format!(
            "{}\n{{\"type\":\"turn\"}}\n",
            header(SESSION, "/repo", CLI_ORIGINATOR, CLI_SOURCE)
        );
        let path = write_transcript(
            home.path(),
            "2025/10/01",
            &format!("rollout-{SESSION}.jsonl"),
            &content,
        );

        let store = TranscriptStore::new(home.path());
        assert_eq!(
            store.promote(SESSION).await.unwrap(),
            Promotion::NotExecSession
        );
        assert_eq!(std::fs::read(&path).unwrap(), content.as_bytes());
    }

    #[tokio::test]
    async fn test_promotion_skips_mismatched_or_headerless_files() {
        let home = TempDir::new().unwrap();
        let mismatched = format!(
            "{}\n",
            header("someone-else", "/repo", EXEC_ORIGINATOR, EXEC_SOURCE)
        );
        let path = write_transcript(
            home.path(),
            "2025/10/01",
            &format!("rollout-{SESSION}.jsonl"),
            &mismatched,
        );
        let store = TranscriptStore::new(home.path());
        assert_eq!(store.promote(SESSION).await.unwrap(), Promotion::IdMismatch);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), mismatched);

        let single_line = header(SESSION, "/repo", EXEC_ORIGINATOR, EXEC_SOURCE);
        std::fs::write(&path, &single_line).unwrap();
        assert_eq!(store.promote(SESSION).await.unwrap(), Promotion::NoHeaderLine);

        let not_meta = "{\"type\":\"response_item\"}\n{}\n";
        std::fs::write(&path, not_meta).unwrap();
        assert_eq!(
            store.promote(SESSION).await.unwrap(),
            Promotion::NotSessionMeta
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), not_meta);
    }

    #[tokio::test]
    async fn test_resolver_caches_and_promotes_once() {
        let home = TempDir::new().unwrap();
        let path = write_transcript(
            home.path(),
            "2025/10/01",
            &format!("rollout-{SESSION}.jsonl"),
            &format!("{}\n", header(SESSION, "/repo", CLI_ORIGINATOR, CLI_SOURCE)),
        );
        let resolver = SessionResolver::new(TranscriptStore::new(home.path()));

        assert_eq!(
            resolver.infer_cwd(SESSION).await.unwrap(),
            Some(PathBuf::from("/repo"))
        );
        // Cached: the transcript is no longer needed.
        std::fs::remove_file(&path).unwrap();
        assert_eq!(
            resolver.infer_cwd(SESSION).await.unwrap(),
            Some(PathBuf::from("/repo"))
        );

        assert_eq!(
            resolver.promote_once(SESSION).await.unwrap(),
            Promotion::NotFound
        );
        assert_eq!(
            resolver.promote_once(SESSION).await.unwrap(),
            Promotion::AlreadyAttempted
        );
    }
}
