//! Handlers for the MCP subcommands

use super::{CallArgs, ListToolsArgs};
use crate::bridge::CodexBridge;
use crate::config::Config;
use crate::mcp::McpServer;
use crate::tools::{INSTRUCTIONS, register_tools};
use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;

async fn local_server(config: Config) -> McpServer {
    let server = McpServer::new_local();
    register_tools(&server, Arc::new(CodexBridge::new(config))).await;
    server
}

/// Serve MCP over stdio until the client disconnects.
pub async fn serve(config: Config) -> Result<()> {
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "?".to_string());

    let server = McpServer::new_stdio().with_instructions(INSTRUCTIONS);
    register_tools(&server, Arc::new(CodexBridge::new(config.clone()))).await;

    tracing::info!(
        codex_bin = %config.codex_bin,
        codex_home = %config.codex_home.display(),
        "codex-persistent-mcp running (cwd: {})",
        cwd
    );
    Arc::new(server).run().await
}

pub async fn list_tools(config: Config, args: ListToolsArgs) -> Result<()> {
    let server = local_server(config).await;
    let tools = server.get_all_tool_metadata().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(());
    }
    for tool in tools {
        println!(
            "{:<20} {}",
            tool.name,
            tool.description.as_deref().unwrap_or_default()
        );
    }
    Ok(())
}

pub async fn call(config: Config, args: CallArgs) -> Result<()> {
    let arguments: Value =
        serde_json::from_str(&args.arguments).context("--arguments must be a JSON object")?;
    let server = local_server(config).await;
    let result = server.call_tool_direct(&args.tool, arguments).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if result.is_error {
        anyhow::bail!("{}", result.text());
    } else {
        println!("{}", result.text());
        if let Some(structured) = &result.structured_content {
            if let Some(hint) = structured.get("resume_hint").and_then(Value::as_str) {
                eprintln!("{hint}");
            }
        }
    }
    Ok(())
}
