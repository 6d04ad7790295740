//! Daemon entry point for the natural-language query MCP server.
//!
//! Loads configuration from CLI arguments and the environment, connects the
//! pipeline to the remote tool server, and serves MCP over stdio or streamable
//! HTTP alongside the plain HTTP query endpoint.

mod config;
mod invoker;
mod pipeline;

use std::sync::Arc;

use nlq_http::{QueryServer, QueryServerConfig};
use nlq_mcp::server::{McpHttpServerConfig, serve_stdio, serve_streamable_http};
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::NlqConfig;
use crate::invoker::McpChildInvoker;
use crate::pipeline::build_orchestrator;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Logs go to stderr; stdout carries the MCP stdio transport.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = NlqConfig::from_args()?;
    let invoker = Arc::new(McpChildInvoker::new(config.server.clone()));
    let orchestrator = Arc::new(build_orchestrator(&config, invoker)?);

    if config.prefetch {
        let registry = orchestrator.registry().clone();
        tokio::spawn(async move {
            match registry.get_tools().await {
                Ok(catalog) => info!(tools = catalog.len(), "tool catalog ready"),
                Err(err) => warn!(error = %err, "initial tool discovery failed"),
            }
        });
    }

    if config.enable_stdio {
        return serve_stdio(orchestrator).await;
    }

    let mut servers: JoinSet<Result<(), BoxError>> = JoinSet::new();
    if config.mcp_serve {
        let mcp_config = McpHttpServerConfig::new(config.mcp_http_addr);
        servers.spawn(serve_streamable_http(orchestrator.clone(), mcp_config));
    }
    if config.http_serve {
        let http_config = QueryServerConfig::new(config.http_addr)
            .with_request_timeout(config.http_timeout)
            .with_max_body_bytes(config.http_max_body_bytes);
        servers.spawn(QueryServer::new(orchestrator.clone(), http_config).serve());
    }

    // The first server to stop takes the daemon down with it.
    if let Some(finished) = servers.join_next().await {
        finished??;
    }
    Ok(())
}
