use rmcp::{
    ErrorData,
    model::{CallToolResult, Content},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};

use crate::NlqMcp;

/// Payload listing the MCP commands this server exposes.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct HelpCommands {
    pub commands: Vec<String>,
    pub examples: Vec<String>,
}

impl Default for HelpCommands {
    fn default() -> Self {
        Self {
            commands: vec![
                "help - List the MCP commands and a few example queries.".to_string(),
                "ask - Answer a plain-language question by calling the best matching remote tool.".to_string(),
                "list_tools - List the remote operations in the catalog, optionally by category.".to_string(),
                "registry_stats - Show catalog cache statistics and the last discovery error.".to_string(),
                "refresh_tools - Force a rediscovery of the remote tool catalog.".to_string(),
                "health - Returns ok.".to_string(),
            ],
            examples: vec![
                "Show me all Technology accounts".to_string(),
                "top 10 contacts where LastName = Smith sorted by created date desc".to_string(),
                "how many opportunities per stage".to_string(),
                "what fields does the Invoice__c object have".to_string(),
                "which objects are available for invoices".to_string(),
                "show debug logs for username = jo@example.com".to_string(),
            ],
        }
    }
}

#[tool_router(router = tool_router_context, vis = "pub")]
impl NlqMcp {
    #[tool(description = "List the MCP commands and example queries for this server.")]
    async fn help(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::json(HelpCommands::default())?]))
    }
}
