//! MCP server implementation for nlq-mcp.
//!
//! This crate wires the query orchestrator into rmcp tool handlers so MCP
//! clients can ask free-text questions and inspect the tool catalog behind them.

mod helpers;
mod tools;
pub mod server;

use std::sync::Arc;

use nlq_core::QueryOrchestrator;
use rmcp::{
    ErrorData,
    ServerHandler,
    handler::server::tool::ToolRouter,
    tool,
    tool_handler,
    tool_router,
};
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};

pub use tools::context::HelpCommands;

const SERVER_INSTRUCTIONS: &str = r"nlq-mcp answers plain-language questions by resolving them to a call on a remote tool server.

Workflow:
1. Call `ask` with a `query` such as `Show me all Technology accounts` or `how many opportunities closed this month`.
   The server classifies the query, picks the best matching remote tool, fills in its arguments,
   invokes it, and replies with a short summary. Set `include_details` to also receive the
   resolved tool, arguments, corrections, and raw payload.
2. Call `list_tools` to see the remote operations the server knows about, optionally filtered by
   `category` (data_operations, schema_management, object_discovery, code_management, debugging,
   uncategorized).
3. Call `registry_stats` to inspect the catalog cache, and `refresh_tools` to force a rediscovery.

Notes:
- Failed queries come back as tool errors with a user-facing explanation; remote error text is not forwarded.
- Use `help` for a list of commands.
- `health` returns `ok`.";

/// MCP server wrapper around the query orchestrator and tool routers.
#[derive(Clone)]
pub struct NlqMcp {
    tool_router: ToolRouter<Self>,
    orchestrator: Arc<QueryOrchestrator>,
}

impl NlqMcp {
    /// Creates a new server using an orchestrator by value.
    #[must_use]
    pub fn new(orchestrator: QueryOrchestrator) -> Self {
        Self::with_orchestrator(Arc::new(orchestrator))
    }

    /// Creates a new server using a shared orchestrator handle.
    #[must_use]
    pub fn with_orchestrator(orchestrator: Arc<QueryOrchestrator>) -> Self {
        let tool_router = Self::tool_router_core()
            + Self::tool_router_query()
            + Self::tool_router_catalog()
            + Self::tool_router_context();
        Self {
            tool_router,
            orchestrator,
        }
    }

    pub(crate) fn orchestrator(&self) -> &QueryOrchestrator {
        &self.orchestrator
    }
}

#[tool_router(router = tool_router_core, vis = "pub")]
impl NlqMcp {
    #[tool(description = "Health check. Returns 'ok'.")]
    async fn health(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::text("ok")]))
    }
}

#[tool_handler]
impl ServerHandler for NlqMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use nlq_core::{QueryOrchestrator, RawTool, StaticInvoker, ToolRegistry};
    use rmcp::model::CallToolResult;
    use serde_json::json;

    use crate::NlqMcp;

    pub fn listing() -> Vec<RawTool> {
        vec![
            RawTool::new(
                "salesforce_query_records",
                "Query records from any Salesforce object using SOQL",
                json!({
                    "type": "object",
                    "properties": {
                        "objectName": { "type": "string" },
                        "fields": { "type": "array", "items": { "type": "string" } },
                        "whereClause": { "type": "string" },
                        "limit": { "type": "number" }
                    },
                    "required": ["objectName", "fields"]
                }),
            ),
            RawTool::new(
                "salesforce_describe_object",
                "Describe the fields of an object",
                json!({
                    "type": "object",
                    "properties": { "objectName": { "type": "string" } },
                    "required": ["objectName"]
                }),
            ),
        ]
    }

    pub fn server(invoker: StaticInvoker) -> (Arc<StaticInvoker>, NlqMcp) {
        let invoker = Arc::new(invoker);
        let registry = ToolRegistry::new(invoker.clone());
        (invoker, NlqMcp::new(QueryOrchestrator::new(registry)))
    }

    pub fn text(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|content| content.raw.as_text().map(|text| text.text.clone()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
