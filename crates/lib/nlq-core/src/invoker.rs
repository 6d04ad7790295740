//! Interface to the remote tool server.
//!
//! The pipeline never talks to a transport directly; it goes through
//! [`ToolInvoker`], which the daemon implements over an MCP client and tests
//! implement with [`StaticInvoker`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::InvokeError;

pub type InvokeResult<T> = Result<T, InvokeError>;

/// A tool as listed by the remote server, before schema parsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
}

impl RawTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Discovery and invocation of remote operations.
pub trait ToolInvoker: Send + Sync {
    /// Lists the operations the remote server currently exposes.
    fn list_tools(&self) -> BoxFuture<'_, InvokeResult<Vec<RawTool>>>;

    /// Invokes one operation with already-validated arguments.
    fn invoke(&self, name: &str, arguments: Map<String, Value>) -> BoxFuture<'_, InvokeResult<Value>>;
}

/// In-memory invoker serving a fixed listing and canned responses.
#[derive(Default)]
pub struct StaticInvoker {
    tools: Vec<RawTool>,
    responses: HashMap<String, InvokeResult<Value>>,
    listing_delay: Option<Duration>,
    invoke_delay: Option<Duration>,
    listing_fails: AtomicBool,
    list_calls: AtomicUsize,
    invocations: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl StaticInvoker {
    #[must_use]
    pub fn new(tools: Vec<RawTool>) -> Self {
        Self {
            tools,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_response(mut self, tool: impl Into<String>, response: Value) -> Self {
        self.responses.insert(tool.into(), Ok(response));
        self
    }

    #[must_use]
    pub fn with_failure(mut self, tool: impl Into<String>, error: InvokeError) -> Self {
        self.responses.insert(tool.into(), Err(error));
        self
    }

    #[must_use]
    pub const fn with_listing_delay(mut self, delay: Duration) -> Self {
        self.listing_delay = Some(delay);
        self
    }

    #[must_use]
    pub const fn with_invoke_delay(mut self, delay: Duration) -> Self {
        self.invoke_delay = Some(delay);
        self
    }

    /// Makes subsequent listings fail with a transport error.
    pub fn set_listing_fails(&self, fails: bool) {
        self.listing_fails.store(fails, Ordering::SeqCst);
    }

    /// Number of discovery round-trips served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Invocations received so far, in order.
    pub fn invocations(&self) -> Vec<(String, Map<String, Value>)> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ToolInvoker for StaticInvoker {
    fn list_tools(&self) -> BoxFuture<'_, InvokeResult<Vec<RawTool>>> {
        Box::pin(async move {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.listing_delay {
                tokio::time::sleep(delay).await;
            }
            if self.listing_fails.load(Ordering::SeqCst) {
                return Err(InvokeError::transport("tool server unreachable"));
            }
            Ok(self.tools.clone())
        })
    }

    fn invoke(&self, name: &str, arguments: Map<String, Value>) -> BoxFuture<'_, InvokeResult<Value>> {
        let name = name.to_string();
        Box::pin(async move {
            self.invocations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((name.clone(), arguments));
            if let Some(delay) = self.invoke_delay {
                tokio::time::sleep(delay).await;
            }
            self.responses.get(&name).cloned().unwrap_or_else(|| {
                Err(InvokeError::new(
                    crate::error::FailureKind::UnknownTool,
                    format!("unknown tool: {name}"),
                ))
            })
        })
    }
}
