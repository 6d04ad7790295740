//! HTTP query server for nlq-mcp.
//!
//! Accepts free-text queries over JSON, runs them through the orchestrator, and
//! exposes the tool catalog for inspection.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Json, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use nlq_catalog::{Category, ToolDescriptor};
use nlq_core::{DiscoveryError, QueryError, QueryOrchestrator, QueryOutcome, QueryResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Configuration for the query HTTP server.
#[derive(Debug, Clone)]
pub struct QueryServerConfig {
    pub addr: SocketAddr,
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
}

impl QueryServerConfig {
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            max_body_bytes: 64 * 1024,
            request_timeout: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub const fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

impl Default for QueryServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from((Ipv4Addr::LOCALHOST, 4050)))
    }
}

/// HTTP query server wrapper.
pub struct QueryServer {
    config: QueryServerConfig,
    state: AppState,
}

impl QueryServer {
    #[must_use]
    pub const fn new(orchestrator: Arc<QueryOrchestrator>, config: QueryServerConfig) -> Self {
        let state = AppState {
            orchestrator,
            request_timeout: config.request_timeout,
        };
        Self { config, state }
    }

    /// Runs the HTTP server until shutdown.
    ///
    /// # Errors
    /// Returns any listener or server error.
    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.config.addr;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let app = build_router(self.state, self.config.max_body_bytes);

        info!("nlq-http listening on {addr}");
        axum::serve(listener, app).await?;
        Ok(())
    }
}

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<QueryOrchestrator>,
    request_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn timeout() -> Self {
        Self {
            status: StatusCode::REQUEST_TIMEOUT,
            message: "query request timed out".to_string(),
        }
    }
}

impl From<DiscoveryError> for ApiError {
    fn from(err: DiscoveryError) -> Self {
        warn!(error = %err, "catalog request failed");
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: QueryError::Discovery(err).user_message(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = Json(ErrorResponse { error: self.message });
        (self.status, payload).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct QueryPayload {
    query: String,
    #[serde(default)]
    include_details: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ToolsParams {
    category: Option<String>,
}

#[derive(Debug, Serialize)]
struct ToolEntry {
    name: String,
    description: String,
    categories: Vec<Category>,
    required: Vec<String>,
}

impl From<&ToolDescriptor> for ToolEntry {
    fn from(tool: &ToolDescriptor) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            categories: tool.categories.clone(),
            required: tool.required_parameters().map(|spec| spec.name.clone()).collect(),
        }
    }
}

fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/query", post(query))
        .route("/tools", get(tools))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn query(State(state): State<AppState>, Json(payload): Json<QueryPayload>) -> Result<Response, ApiError> {
    let mut result = tokio::time::timeout(state.request_timeout, state.orchestrator.process(&payload.query))
        .await
        .map_err(|_| ApiError::timeout())?;

    if !payload.include_details {
        result.arguments = None;
        result.raw = None;
        result.corrections.clear();
    }
    let status = status_for(&result);
    Ok((status, Json(result)).into_response())
}

/// Failed queries still carry a rendered explanation, so they keep the result body.
fn status_for(result: &QueryResult) -> StatusCode {
    if result.outcome != QueryOutcome::Failure {
        return StatusCode::OK;
    }
    match result.error.as_deref() {
        Some("empty_query") => StatusCode::BAD_REQUEST,
        Some("discovery_failed" | "transport") => StatusCode::SERVICE_UNAVAILABLE,
        Some("timeout") => StatusCode::GATEWAY_TIMEOUT,
        Some("permission_denied") => StatusCode::FORBIDDEN,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

async fn tools(
    State(state): State<AppState>,
    Query(params): Query<ToolsParams>,
) -> Result<Json<Vec<ToolEntry>>, ApiError> {
    let registry = state.orchestrator.registry();
    let tools = match params.category.as_deref() {
        Some(category) => {
            let category: Category = category
                .parse()
                .map_err(|err| ApiError::bad_request(format!("{err}")))?;
            registry.get_category(category).await?
        }
        None => registry.get_tools().await?.tools().to_vec(),
    };
    Ok(Json(tools.iter().map(|tool| ToolEntry::from(tool.as_ref())).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use nlq_core::{RawTool, StaticInvoker, ToolRegistry};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn listing() -> Vec<RawTool> {
        vec![RawTool::new(
            "salesforce_query_records",
            "Query records from any Salesforce object using SOQL",
            json!({
                "type": "object",
                "properties": {
                    "objectName": { "type": "string" },
                    "fields": { "type": "array", "items": { "type": "string" } },
                    "whereClause": { "type": "string" }
                },
                "required": ["objectName", "fields"]
            }),
        )]
    }

    fn app(invoker: StaticInvoker) -> (Arc<StaticInvoker>, Router) {
        let invoker = Arc::new(invoker);
        let registry = ToolRegistry::new(invoker.clone());
        let state = AppState {
            orchestrator: Arc::new(QueryOrchestrator::new(registry)),
            request_timeout: Duration::from_secs(5),
        };
        (invoker, build_router(state, 64 * 1024))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("router responds");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body reads");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_query(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/query")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds")
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (_, app) = app(StaticInvoker::new(listing()));
        let request = Request::builder().uri("/health").body(Body::empty()).expect("request builds");
        let response = app.oneshot(request).await.expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn query_returns_rendered_answer() {
        let response = json!({ "totalSize": 0, "records": [] });
        let (invoker, app) = app(StaticInvoker::new(listing()).with_response("salesforce_query_records", response));

        let (status, body) = send(app, post_query(&json!({ "query": "Show me all Technology accounts" }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "success");
        assert_eq!(body["tool_invoked"], "salesforce_query_records");
        assert!(body["rendered"].as_str().is_some_and(|text| text.contains("No matching")));
        assert_eq!(body["raw"], Value::Null);
        assert_eq!(invoker.invocations().len(), 1);
    }

    #[tokio::test]
    async fn details_are_opt_in() {
        let (_, app) = app(StaticInvoker::new(listing()).with_response("salesforce_query_records", json!([])));

        let payload = json!({ "query": "Show me all Technology accounts", "include_details": true });
        let (status, body) = send(app, post_query(&payload)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["arguments"]["objectName"], "Account");
        assert_eq!(body["raw"], json!([]));
    }

    #[tokio::test]
    async fn blank_query_is_bad_request() {
        let (_, app) = app(StaticInvoker::new(listing()));
        let (status, body) = send(app, post_query(&json!({ "query": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["outcome"], "failure");
    }

    #[tokio::test]
    async fn discovery_failure_is_unavailable() {
        let (invoker, app) = app(StaticInvoker::new(listing()));
        invoker.set_listing_fails(true);

        let request = Request::builder().uri("/tools").body(Body::empty()).expect("request builds");
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().is_some_and(|text| !text.contains("unreachable")));
    }

    #[tokio::test]
    async fn tools_filter_by_category() {
        let (_, app) = app(StaticInvoker::new(listing()));

        let request = Request::builder()
            .uri("/tools?category=data_operations")
            .body(Body::empty())
            .expect("request builds");
        let (status, body) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "salesforce_query_records");
        assert_eq!(body[0]["required"], json!(["objectName", "fields"]));

        let request = Request::builder()
            .uri("/tools?category=billing")
            .body(Body::empty())
            .expect("request builds");
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
