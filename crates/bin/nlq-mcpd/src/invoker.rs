//! Tool invocation over an MCP client connected to a child-process server.

use futures::future::BoxFuture;
use nlq_core::invoker::InvokeResult;
use nlq_core::{FailureKind, InvokeError, RawTool, ToolInvoker};
use rmcp::model::CallToolRequestParam;
use rmcp::service::{Peer, RunningService, ServiceError};
use rmcp::transport::TokioChildProcess;
use rmcp::{RoleClient, ServiceExt};
use serde_json::{Map, Value, json};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ServerCommand;

/// Talks to the remote tool server, spawning it on first use and again after
/// the connection drops.
pub struct McpChildInvoker {
    command: ServerCommand,
    client: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl McpChildInvoker {
    pub fn new(command: ServerCommand) -> Self {
        Self {
            command,
            client: Mutex::new(None),
        }
    }

    async fn peer(&self) -> InvokeResult<Peer<RoleClient>> {
        let mut client = self.client.lock().await;
        if let Some(running) = client.as_ref() {
            return Ok(running.peer().clone());
        }

        let mut command = Command::new(&self.command.program);
        command.args(&self.command.args).kill_on_drop(true);
        for name in &self.command.env {
            match std::env::var(name) {
                Ok(value) => {
                    command.env(name, value);
                }
                Err(_) => debug!(variable = %name, "server environment variable not set"),
            }
        }

        let transport = TokioChildProcess::new(command)
            .map_err(|err| InvokeError::transport(format!("failed to start tool server: {err}")))?;
        let running = ().serve(transport).await.map_err(|err| {
            InvokeError::transport(format!("failed to initialize tool server session: {err}"))
        })?;
        info!(program = %self.command.program, "connected to tool server");

        let peer = running.peer().clone();
        *client = Some(running);
        Ok(peer)
    }

    /// Drops the current session so the next call reconnects.
    async fn reset(&self) {
        if let Some(running) = self.client.lock().await.take() {
            warn!("dropping tool server session");
            if let Err(err) = running.cancel().await {
                debug!(error = %err, "tool server session did not shut down cleanly");
            }
        }
    }

    async fn failed(&self, err: ServiceError) -> InvokeError {
        let error = map_service_error(err);
        if error.kind == FailureKind::Transport {
            self.reset().await;
        }
        error
    }
}

impl ToolInvoker for McpChildInvoker {
    fn list_tools(&self) -> BoxFuture<'_, InvokeResult<Vec<RawTool>>> {
        Box::pin(async move {
            let peer = self.peer().await?;
            let tools = match peer.list_all_tools().await {
                Ok(tools) => tools,
                Err(err) => return Err(self.failed(err).await),
            };
            tools
                .iter()
                .map(|tool| {
                    serde_json::to_value(tool)
                        .and_then(serde_json::from_value::<RawTool>)
                        .map_err(|err| InvokeError::new(FailureKind::MalformedSchema, err.to_string()))
                })
                .collect()
        })
    }

    fn invoke(&self, name: &str, arguments: Map<String, Value>) -> BoxFuture<'_, InvokeResult<Value>> {
        let name = name.to_string();
        Box::pin(async move {
            let peer = self.peer().await?;
            let request: CallToolRequestParam =
                serde_json::from_value(json!({ "name": name, "arguments": arguments }))
                    .map_err(|err| InvokeError::new(FailureKind::InvalidRequest, err.to_string()))?;
            let result = match peer.call_tool(request).await {
                Ok(result) => result,
                Err(err) => return Err(self.failed(err).await),
            };
            let result = serde_json::to_value(&result)
                .map_err(|err| InvokeError::new(FailureKind::Remote, err.to_string()))?;
            payload_from_result(&result)
        })
    }
}

fn map_service_error(err: ServiceError) -> InvokeError {
    match err {
        ServiceError::McpError(data) => InvokeError::remote(data.message.to_string()),
        ServiceError::Timeout { timeout } => InvokeError::timeout(timeout),
        other => InvokeError::transport(other.to_string()),
    }
}

/// Extracts the payload of a serialized `CallToolResult`.
///
/// Structured content wins; otherwise text blocks are joined. A result flagged
/// as an error becomes a remote failure classified from its text.
fn payload_from_result(result: &Value) -> InvokeResult<Value> {
    let text = result
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        let message = if text.trim().is_empty() { "tool reported an error" } else { text.trim() };
        return Err(InvokeError::remote(message));
    }
    if let Some(structured) = result.get("structuredContent").filter(|value| !value.is_null()) {
        return Ok(structured.clone());
    }
    Ok(Value::String(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_text_blocks() {
        let result = json!({
            "content": [
                { "type": "text", "text": "Query returned 2 records:" },
                { "type": "text", "text": "Acme\nGlobex" }
            ],
            "isError": false
        });
        assert_eq!(
            payload_from_result(&result).expect("payload"),
            json!("Query returned 2 records:\nAcme\nGlobex")
        );
    }

    #[test]
    fn prefers_structured_content() {
        let result = json!({
            "content": [{ "type": "text", "text": "ignored" }],
            "structuredContent": { "totalSize": 1 }
        });
        assert_eq!(payload_from_result(&result).expect("payload"), json!({ "totalSize": 1 }));
    }

    #[test]
    fn error_results_are_classified() {
        let result = json!({
            "content": [{ "type": "text", "text": "INSUFFICIENT_ACCESS: cannot read Account" }],
            "isError": true
        });
        let err = payload_from_result(&result).expect_err("error result");
        assert_eq!(err.kind, FailureKind::PermissionDenied);
        assert!(!err.is_retryable());

        let err = payload_from_result(&json!({ "isError": true })).expect_err("error result");
        assert_eq!(err.kind, FailureKind::Remote);
    }

    #[test]
    fn transport_errors_are_retryable() {
        let err = map_service_error(ServiceError::TransportClosed);
        assert_eq!(err.kind, FailureKind::Transport);
        assert!(err.is_retryable());
    }
}
