//! MCP (Model Context Protocol) implementation
//!
//! Server side only:
//! - JSON-RPC 2.0 messaging over stdio
//! - Tool definitions and async invocation
//!
//! ```bash
//! codex-persistent-mcp serve
//! ```

mod server;
mod transport;
mod types;

pub use server::{McpServer, McpToolHandler};
pub use transport::{McpMessage, NullTransport, StdioTransport, Transport};
pub use types::*;
