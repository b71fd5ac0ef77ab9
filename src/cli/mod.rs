//! CLI command definitions and handlers

pub mod mcp;

use clap::{Parser, Subcommand};

/// codex-persistent-mcp - MCP server for persistent Codex CLI sessions
///
/// By default, serves MCP over stdio. Point an MCP client at this binary and
/// the tools it exposes run `codex exec` against resumable sessions.
#[derive(Parser, Debug)]
#[command(name = "codex-persistent-mcp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log level (RUST_LOG takes precedence)
    #[arg(long, global = true, value_parser = ["trace", "debug", "info", "warn", "error"])]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve MCP over stdio (default)
    Serve,

    /// Print the registered tools
    ListTools(ListToolsArgs),

    /// Invoke one tool in-process and print its result
    Call(CallArgs),
}

#[derive(Parser, Debug)]
pub struct ListToolsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct CallArgs {
    /// Tool name, e.g. codex_chat
    #[arg(long)]
    pub tool: String,

    /// JSON object of tool arguments
    #[arg(long, default_value = "{}")]
    pub arguments: String,

    /// Print the full tool result as JSON
    #[arg(long)]
    pub json: bool,
}
