use nlq_catalog::{Category, ToolDescriptor};
use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ErrorCode},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};

use crate::NlqMcp;
use crate::helpers;

/// Parameters for listing catalog tools.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ListToolsParams {
    /// Restrict the listing to one category, e.g. `data_operations`.
    pub category: Option<String>,
}

/// Condensed view of one remote operation.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
    pub categories: Vec<String>,
    pub required: Vec<String>,
    pub optional: Vec<String>,
}

impl From<&ToolDescriptor> for ToolSummary {
    fn from(tool: &ToolDescriptor) -> Self {
        let (required, optional) = tool.parameters.iter().partition::<Vec<_>, _>(|spec| spec.required);
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            categories: tool.categories.iter().map(|category| category.as_str().to_string()).collect(),
            required: required.into_iter().map(|spec| spec.name.clone()).collect(),
            optional: optional.into_iter().map(|spec| spec.name.clone()).collect(),
        }
    }
}

#[tool_router(router = tool_router_catalog, vis = "pub")]
impl NlqMcp {
    #[tool(name = "list_tools", description = "List the remote operations known to the registry, optionally filtered by category.")]
    async fn list_catalog(&self, Parameters(params): Parameters<ListToolsParams>) -> Result<CallToolResult, ErrorData> {
        let registry = self.orchestrator().registry();
        let tools = match params.category.as_deref() {
            Some(category) => {
                let category: Category = category
                    .parse()
                    .map_err(|err| helpers::mcp_err(ErrorCode::INVALID_PARAMS, format!("{err}")))?;
                registry.get_category(category).await.map_err(helpers::discovery_err)?
            }
            None => registry.get_tools().await.map_err(helpers::discovery_err)?.tools().to_vec(),
        };
        let summaries: Vec<ToolSummary> = tools.iter().map(|tool| ToolSummary::from(tool.as_ref())).collect();
        Ok(CallToolResult::success(vec![Content::json(summaries)?]))
    }

    #[tool(description = "Report catalog cache statistics: tool counts per category, cache age, and the last discovery error.")]
    async fn registry_stats(&self) -> Result<CallToolResult, ErrorData> {
        let stats = self.orchestrator().registry().stats().await;
        Ok(CallToolResult::success(vec![Content::json(stats)?]))
    }

    #[tool(description = "Force a rediscovery of the remote tool catalog and return fresh statistics.")]
    async fn refresh_tools(&self) -> Result<CallToolResult, ErrorData> {
        let registry = self.orchestrator().registry();
        registry.refresh().await.map_err(helpers::discovery_err)?;
        Ok(CallToolResult::success(vec![Content::json(registry.stats().await)?]))
    }
}

#[cfg(test)]
mod tests {
    use nlq_core::StaticInvoker;
    use rmcp::handler::server::wrapper::Parameters;
    use rmcp::model::ErrorCode;
    use serde_json::Value;

    use super::ListToolsParams;
    use crate::test_support::{listing, server, text};

    fn parse(result: &rmcp::model::CallToolResult) -> Value {
        serde_json::from_str(&text(result)).expect("tool returns JSON")
    }

    #[tokio::test]
    async fn lists_tools_by_category() {
        let (_, server) = server(StaticInvoker::new(listing()));

        let all = server
            .list_catalog(Parameters(ListToolsParams { category: None }))
            .await
            .expect("listing succeeds");
        assert_eq!(parse(&all).as_array().map(Vec::len), Some(2));

        let schema = server
            .list_catalog(Parameters(ListToolsParams {
                category: Some("schema_management".to_string()),
            }))
            .await
            .expect("listing succeeds");
        let schema = parse(&schema);
        assert_eq!(schema[0]["name"], "salesforce_describe_object");
        assert_eq!(schema[0]["required"][0], "objectName");
    }

    #[tokio::test]
    async fn unknown_category_is_invalid_params() {
        let (_, server) = server(StaticInvoker::new(listing()));
        let err = server
            .list_catalog(Parameters(ListToolsParams {
                category: Some("billing".to_string()),
            }))
            .await
            .expect_err("unknown category fails");
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn refresh_rediscovers() {
        let (invoker, server) = server(StaticInvoker::new(listing()));
        server.registry_stats().await.expect("stats succeed");
        server.refresh_tools().await.expect("refresh succeeds");
        server.refresh_tools().await.expect("refresh succeeds");
        assert_eq!(invoker.list_calls(), 2);

        invoker.set_listing_fails(true);
        let err = server.refresh_tools().await.expect_err("refresh fails");
        assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
        assert!(!err.message.contains("unreachable"));
    }
}
