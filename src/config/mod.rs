//! Configuration system
//!
//! Handles loading configuration from multiple sources:
//! - Defaults
//! - Global config (~/.config/codex-persistent-mcp/config.toml)
//! - Environment variables (CODEX_BIN, CODEX_HOME, CODEX_PERSISTENT_MCP_*)

use crate::codex::{DEFAULT_TIMEOUT_MS, clamp_timeout_ms};
use anyhow::Result;
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// Resolved runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    /// Codex executable, looked up on PATH when not absolute
    pub codex_bin: String,

    /// Timeout applied when a call does not set one
    pub default_timeout_ms: u64,

    /// `origin=` value in the injected context header
    pub origin: String,

    /// Send the role card on the first call of each session
    pub role_card: bool,

    /// Append sessions to codex's `history.jsonl`
    pub register_history: bool,

    /// Read and write `<cwd>/.claude/codex_session.json`
    pub workspace_pointer: bool,

    /// Language plan and review prompts ask codex to answer in
    pub reply_language: String,

    /// Codex state directory holding `sessions/` and `history.jsonl`
    pub codex_home: PathBuf,

    /// Explicit history file; defaults to `<codex_home>/history.jsonl`
    pub history_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            codex_bin: "codex".to_string(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            origin: "codex-persistent-mcp".to_string(),
            role_card: true,
            register_history: true,
            workspace_pointer: true,
            reply_language: "Chinese".to_string(),
            codex_home: default_codex_home(),
            history_path: None,
        }
    }
}

/// On-disk form of [`Config`]; every key is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub codex_bin: Option<String>,
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub role_card: Option<bool>,
    #[serde(default)]
    pub register_history: Option<bool>,
    #[serde(default)]
    pub workspace_pointer: Option<bool>,
    #[serde(default)]
    pub reply_language: Option<String>,
    #[serde(default)]
    pub codex_home: Option<PathBuf>,
    #[serde(default)]
    pub history_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from all sources (defaults, global file, env)
    pub async fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let content = fs::read_to_string(&global_path).await?;
                let file: ConfigFile = toml::from_str(&content).map_err(|e| {
                    anyhow::anyhow!("Invalid config at {}: {}", global_path.display(), e)
                })?;
                config = config.merge(file);
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Get the global config file path
    pub fn global_config_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "codex-persistent-mcp", "codex-persistent-mcp")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// History file codex reads for `codex resume`
    pub fn history_path(&self) -> PathBuf {
        self.history_path
            .clone()
            .unwrap_or_else(|| self.codex_home.join("history.jsonl"))
    }

    /// Merge a config file (file takes precedence)
    pub fn merge(mut self, other: ConfigFile) -> Self {
        if let Some(bin) = other.codex_bin.filter(|b| !b.is_empty()) {
            self.codex_bin = bin;
        }
        if let Some(ms) = other.default_timeout_ms {
            self.default_timeout_ms = clamp_timeout_ms(ms);
        }
        if let Some(origin) = other.origin {
            self.origin = origin;
        }
        if let Some(enabled) = other.role_card {
            self.role_card = enabled;
        }
        if let Some(enabled) = other.register_history {
            self.register_history = enabled;
        }
        if let Some(enabled) = other.workspace_pointer {
            self.workspace_pointer = enabled;
        }
        if let Some(language) = other.reply_language.filter(|l| !l.trim().is_empty()) {
            self.reply_language = language;
        }
        if let Some(home) = other.codex_home {
            self.codex_home = home;
        }
        if other.history_path.is_some() {
            self.history_path = other.history_path;
        }
        self
    }

    /// Apply environment variable overrides
    fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides read through `lookup` instead of the process environment
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("CODEX_BIN").filter(|v| !v.is_empty()) {
            self.codex_bin = val;
        }
        if let Some(val) = lookup("CODEX_PERSISTENT_MCP_TIMEOUT_MS") {
            match val.trim().parse::<u64>() {
                Ok(ms) => self.default_timeout_ms = clamp_timeout_ms(ms),
                Err(_) => tracing::warn!(
                    value = %val,
                    "Invalid CODEX_PERSISTENT_MCP_TIMEOUT_MS value; expected milliseconds"
                ),
            }
        }
        if let Some(val) = lookup("CODEX_PERSISTENT_MCP_ORIGIN") {
            self.origin = val;
        }
        for (key, slot) in [
            ("CODEX_PERSISTENT_MCP_ROLE_CARD", &mut self.role_card),
            (
                "CODEX_PERSISTENT_MCP_REGISTER_IN_CODEX_HISTORY",
                &mut self.register_history,
            ),
            (
                "CODEX_PERSISTENT_MCP_WORKSPACE_POINTER",
                &mut self.workspace_pointer,
            ),
        ] {
            if let Some(val) = lookup(key) {
                match parse_bool(&val) {
                    Ok(enabled) => *slot = enabled,
                    Err(_) => tracing::warn!(
                        value = %val,
                        key,
                        "Invalid boolean override; expected true/false"
                    ),
                }
            }
        }
        if let Some(val) = lookup("CODEX_PERSISTENT_MCP_REPLY_LANGUAGE").filter(|v| !v.trim().is_empty()) {
            self.reply_language = val;
        }
        if let Some(val) = lookup("CODEX_HOME").filter(|v| !v.is_empty()) {
            self.codex_home = PathBuf::from(val);
        }
        if let Some(val) = lookup("CODEX_PERSISTENT_MCP_CODEX_HISTORY_PATH").filter(|v| !v.is_empty()) {
            self.history_path = Some(PathBuf::from(val));
        }
    }
}

fn default_codex_home() -> PathBuf {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".codex"))
        .unwrap_or_else(|| PathBuf::from(".codex"))
}

fn parse_bool(value: &str) -> Result<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("Invalid boolean value: {}", value),
    }
}
