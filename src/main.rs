//! codex-persistent-mcp - MCP server for persistent Codex CLI sessions
//!
//! Stdout is reserved for JSON-RPC; all logging goes to stderr.

use clap::Parser;
use codex_persistent_mcp::cli::{self, Cli, Command};
use codex_persistent_mcp::config::Config;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = cli.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();

    let config = Config::load().await?;
    tracing::debug!(?config, "Loaded configuration");

    match cli.command {
        None | Some(Command::Serve) => cli::mcp::serve(config).await,
        Some(Command::ListTools(args)) => cli::mcp::list_tools(config, args).await,
        Some(Command::Call(args)) => cli::mcp::call(config, args).await,
    }
}
