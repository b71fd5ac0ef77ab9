//! MCP transport layer - newline-delimited JSON-RPC over stdio

use super::types::*;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tracing::{error, trace};

/// Transport trait for MCP communication
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a JSON-RPC response
    async fn send_response(&self, response: JsonRpcResponse) -> Result<()>;

    /// Next incoming message, or `None` once the peer has gone away
    async fn receive(&self) -> Result<Option<McpMessage>>;

    /// Close the transport
    async fn close(&self) -> Result<()>;
}

/// Incoming MCP message
#[derive(Debug, Clone)]
pub enum McpMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
    /// A line that is not a JSON-RPC message
    Malformed(String),
}

impl McpMessage {
    pub fn from_json(value: Value) -> Result<Self> {
        if value.get("id").is_some() {
            if value.get("method").is_some() {
                let request: JsonRpcRequest = serde_json::from_value(value)?;
                Ok(McpMessage::Request(request))
            } else {
                let response: JsonRpcResponse = serde_json::from_value(value)?;
                Ok(McpMessage::Response(response))
            }
        } else {
            let notification: JsonRpcNotification = serde_json::from_value(value)?;
            Ok(McpMessage::Notification(notification))
        }
    }

    /// Classify one line of input. Never fails; bad input becomes `Malformed`.
    pub fn from_line(line: &str) -> Self {
        match serde_json::from_str::<Value>(line) {
            Ok(value) => Self::from_json(value).unwrap_or_else(|e| Self::Malformed(e.to_string())),
            Err(e) => Self::Malformed(e.to_string()),
        }
    }
}

/// Stdio transport. Stdout carries only protocol messages.
pub struct StdioTransport {
    tx: mpsc::Sender<String>,
    rx: Mutex<mpsc::Receiver<String>>,
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StdioTransport {
    /// Create a stdio transport. Must be called within a tokio runtime.
    pub fn new() -> Self {
        let (write_tx, mut write_rx) = mpsc::channel::<String>(100);
        let (read_tx, read_rx) = mpsc::channel::<String>(100);

        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(msg) = write_rx.recv().await {
                trace!("MCP TX: {}", msg);
                let mut line = msg.into_bytes();
                line.push(b'\n');
                if let Err(e) = stdout.write_all(&line).await {
                    error!("Failed to write to stdout: {}", e);
                    break;
                }
                if let Err(e) = stdout.flush().await {
                    error!("Failed to flush stdout: {}", e);
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(msg)) if msg.trim().is_empty() => continue,
                    Ok(Some(msg)) => {
                        trace!("MCP RX: {}", msg);
                        if read_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read from stdin: {}", e);
                        break;
                    }
                }
            }
        });

        Self {
            tx: write_tx,
            rx: Mutex::new(read_rx),
        }
    }

    async fn send_json(&self, value: Value) -> Result<()> {
        let json = serde_json::to_string(&value)?;
        self.tx.send(json).await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send_response(&self, response: JsonRpcResponse) -> Result<()> {
        self.send_json(serde_json::to_value(&response)?).await
    }

    async fn receive(&self) -> Result<Option<McpMessage>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await.map(|line| McpMessage::from_line(&line)))
    }

    async fn close(&self) -> Result<()> {
        // The writer task exits once every sender is dropped.
        Ok(())
    }
}

/// Null transport for local/in-process MCP usage.
///
/// Spawns nothing and never touches stdio, so the CLI and tests can reuse the
/// tool registry without running a server.
#[derive(Debug, Default, Clone)]
pub struct NullTransport;

impl NullTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for NullTransport {
    async fn send_response(&self, _response: JsonRpcResponse) -> Result<()> {
        Ok(())
    }

    async fn receive(&self) -> Result<Option<McpMessage>> {
        Ok(None)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
