//! Calls for one session run one at a time, in the order they were made.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use codex_persistent_mcp::bridge::CodexBridge;
use codex_persistent_mcp::codex::{AgentInvoker, BridgeError, Invocation, RunOutcome};
use codex_persistent_mcp::config::Config;
use codex_persistent_mcp::mcp::McpServer;
use codex_persistent_mcp::tools::register_tools;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

const SESSION: &str = "0199a213-81c0-7800-8aa1-bbab2a035a53";

/// Sleeps per call and logs when each call starts and ends.
#[derive(Default)]
struct SlowInvoker {
    log: Mutex<Vec<(String, String)>>,
    active: Mutex<usize>,
    max_active: Mutex<usize>,
}

#[async_trait]
impl AgentInvoker for SlowInvoker {
    async fn invoke(&self, invocation: Invocation) -> Result<RunOutcome, BridgeError> {
        let label = invocation
            .prompt
            .lines()
            .last()
            .unwrap_or_default()
            .to_string();
        let delay = label
            .rsplit('-')
            .next()
            .and_then(|ms| ms.parse::<u64>().ok())
            .unwrap_or(0);

        {
            let mut active = self.active.lock();
            *active += 1;
            let mut max = self.max_active.lock();
            *max = (*max).max(*active);
        }
        self.log.lock().push(("start".to_string(), label.clone()));
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.log.lock().push(("end".to_string(), label.clone()));
        *self.active.lock() -= 1;

        if label.starts_with("fail") {
            return Err(BridgeError::invocation("boom"));
        }
        Ok(RunOutcome {
            session_id: invocation.session_id.unwrap_or_else(|| SESSION.to_string()),
            reply: label,
            usage: None,
        })
    }
}

async fn server(invoker: Arc<SlowInvoker>) -> (McpServer, TempDir) {
    let home = TempDir::new().unwrap();
    let config = Config {
        codex_home: home.path().to_path_buf(),
        ..Config::default()
    };
    let server = McpServer::new_local();
    register_tools(&server, Arc::new(CodexBridge::with_invoker(config, invoker))).await;
    (server, home)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_session_calls_run_in_call_order() {
    let invoker = Arc::new(SlowInvoker::default());
    let (server, home) = server(Arc::clone(&invoker)).await;
    let cwd = home.path().to_string_lossy().into_owned();

    let labels = ["a-40", "b-0", "fail-25", "c-5", "d-15"];
    let calls = labels.iter().map(|label| {
        server.call_tool_direct(
            "codex_chat",
            json!({"session_id": SESSION, "cwd": cwd, "prompt": label}),
        )
    });
    let results = join_all(calls).await;

    for (label, result) in labels.iter().zip(&results) {
        let result = result.as_ref().unwrap();
        if label.starts_with("fail") {
            assert!(result.is_error);
        } else {
            assert_eq!(result.text(), *label);
        }
    }

    let log = invoker.log.lock();
    let expected: Vec<(String, String)> = labels
        .iter()
        .flat_map(|l| [("start".to_string(), l.to_string()), ("end".to_string(), l.to_string())])
        .collect();
    assert_eq!(*log, expected);
    assert_eq!(*invoker.max_active.lock(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_sessions_overlap() {
    let invoker = Arc::new(SlowInvoker::default());
    let (server, home) = server(Arc::clone(&invoker)).await;
    let cwd = home.path().to_string_lossy().into_owned();

    let sessions = [
        "0199a213-81c0-7800-8aa1-000000000001",
        "0199a213-81c0-7800-8aa1-000000000002",
        "0199a213-81c0-7800-8aa1-000000000003",
    ];
    let calls = sessions.iter().map(|session| {
        server.call_tool_direct(
            "codex_chat",
            json!({"session_id": session, "cwd": cwd, "prompt": "x-200"}),
        )
    });
    let results = join_all(calls).await;
    assert!(results.iter().all(|r| !r.as_ref().unwrap().is_error));
    assert!(*invoker.max_active.lock() > 1);
}
