use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};

use crate::NlqMcp;

/// Parameters for answering a plain-language query.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct AskParams {
    /// The question or request, e.g. "Show me all Technology accounts".
    pub query: String,
    /// Also return the resolved tool, arguments, corrections, and raw payload.
    pub include_details: Option<bool>,
}

#[tool_router(router = tool_router_query, vis = "pub")]
impl NlqMcp {
    #[tool(description = "Answer a plain-language question by resolving it to a remote tool call. Returns a short summary.")]
    async fn ask(&self, Parameters(params): Parameters<AskParams>) -> Result<CallToolResult, ErrorData> {
        let result = self.orchestrator().process(&params.query).await;

        let mut content = vec![Content::text(result.rendered.clone())];
        if params.include_details.unwrap_or(false) {
            content.push(Content::json(&result)?);
        }
        if result.is_success() {
            Ok(CallToolResult::success(content))
        } else {
            Ok(CallToolResult::error(content))
        }
    }
}

#[cfg(test)]
mod tests {
    use nlq_core::StaticInvoker;
    use rmcp::handler::server::wrapper::Parameters;
    use serde_json::json;

    use super::AskParams;
    use crate::test_support::{listing, server, text};

    fn ask(query: &str, include_details: bool) -> Parameters<AskParams> {
        Parameters(AskParams {
            query: query.to_string(),
            include_details: Some(include_details),
        })
    }

    #[tokio::test]
    async fn answers_with_a_summary() {
        let response = json!({
            "totalSize": 1,
            "records": [{ "attributes": { "type": "Account" }, "Id": "001xx000003DGb2AAG", "Name": "Acme" }]
        });
        let (invoker, server) = server(StaticInvoker::new(listing()).with_response("salesforce_query_records", response));

        let result = server
            .ask(ask("Show me all Technology accounts", false))
            .await
            .expect("ask succeeds");

        assert_eq!(result.is_error, Some(false));
        assert_eq!(text(&result), "Found 1 Account record: Acme.");
        assert_eq!(invoker.invocations().len(), 1);
    }

    #[tokio::test]
    async fn details_include_the_resolved_call() {
        let (_, server) = server(StaticInvoker::new(listing()).with_response("salesforce_query_records", json!([])));

        let result = server
            .ask(ask("Show me all Technology accounts", true))
            .await
            .expect("ask succeeds");

        assert_eq!(result.content.len(), 2);
        let details = result.content[1].raw.as_text().expect("details are text");
        let details: serde_json::Value = serde_json::from_str(&details.text).expect("details are JSON");
        assert_eq!(details["tool_invoked"], "salesforce_query_records");
        assert_eq!(details["outcome"], "success");
    }

    #[tokio::test]
    async fn failures_are_tool_errors() {
        let (_, server) = server(StaticInvoker::new(listing()));

        let result = server.ask(ask("", false)).await.expect("ask succeeds");

        assert_eq!(result.is_error, Some(true));
        assert!(text(&result).contains("what you would like"));
    }
}
