use std::borrow::Cow;

use nlq_core::{DiscoveryError, QueryError};
use rmcp::ErrorData;
use rmcp::model::ErrorCode;
use tracing::warn;

pub(crate) fn mcp_err(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> ErrorData {
    ErrorData {
        code,
        message: message.into(),
        data: None,
    }
}

/// Maps a discovery failure onto an MCP error without forwarding transport text.
pub(crate) fn discovery_err(err: DiscoveryError) -> ErrorData {
    warn!(error = %err, "catalog request failed");
    mcp_err(ErrorCode::INTERNAL_ERROR, QueryError::Discovery(err).user_message())
}
