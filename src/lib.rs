//! codex-persistent-mcp - MCP server for persistent Codex CLI sessions
//!
//! Exposes `codex_chat`, `codex_plan` and `codex_review` as MCP tools. Each
//! call runs `codex exec --json`, optionally resuming an existing session, so
//! the conversation stays resumable from the Codex CLI itself.

pub mod bridge;
pub mod cli;
pub mod codex;
pub mod config;
pub mod mcp;
pub mod session;
pub mod tools;
