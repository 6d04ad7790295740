//! Error taxonomy for discovery, invocation, and query resolution.

use std::{error::Error, fmt, time::Duration};

use nlq_catalog::SchemaError;
use serde::{Deserialize, Serialize};

use crate::extract::Violation;

/// Coarse classification of a failed remote call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Transport,
    InvalidRequest,
    UnknownTool,
    PermissionDenied,
    MalformedSchema,
    Remote,
}

impl FailureKind {
    /// Retryable failures move on to the next candidate tool; the rest end the query.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::PermissionDenied | Self::MalformedSchema)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::InvalidRequest => "invalid_request",
            Self::UnknownTool => "unknown_tool",
            Self::PermissionDenied => "permission_denied",
            Self::MalformedSchema => "malformed_schema",
            Self::Remote => "remote",
        }
    }

    /// Guesses a failure kind from remote error text.
    #[must_use]
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));

        if has(&["timed out", "timeout"]) {
            Self::Timeout
        } else if has(&["permission", "insufficient_access", "insufficient access", "not authorized", "unauthorized", "forbidden"]) {
            Self::PermissionDenied
        } else if has(&["malformed schema", "invalid schema", "invalid input schema"]) {
            Self::MalformedSchema
        } else if has(&["unknown tool", "tool not found", "no such tool"]) {
            Self::UnknownTool
        } else if has(&["connection", "network", "econnreset", "broken pipe", "transport"]) {
            Self::Transport
        } else if has(&["unexpected token", "malformed_query", "malformed query", "invalid_field", "invalid field", "invalid_type", "soql", "sosl", "required"]) {
            Self::InvalidRequest
        } else {
            Self::Remote
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by the tool-invocation interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeError {
    pub kind: FailureKind,
    pub message: String,
}

impl InvokeError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, message)
    }

    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("call timed out after {}ms", after.as_millis()),
        )
    }

    /// Builds an error from remote text, inferring the kind from its wording.
    pub fn remote(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(FailureKind::from_message(&message), message)
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl Error for InvokeError {}

/// The tool catalog could not be loaded and no earlier snapshot exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    Unavailable(InvokeError),
    EmptyCatalog,
    Malformed(String),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(err) => write!(f, "tool discovery failed: {err}"),
            Self::EmptyCatalog => write!(f, "tool discovery returned no tools"),
            Self::Malformed(message) => write!(f, "tool discovery returned malformed metadata: {message}"),
        }
    }
}

impl Error for DiscoveryError {}

impl From<InvokeError> for DiscoveryError {
    fn from(err: InvokeError) -> Self {
        Self::Unavailable(err)
    }
}

impl From<SchemaError> for DiscoveryError {
    fn from(err: SchemaError) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Terminal reasons a query could not be answered.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    EmptyQuery,
    Discovery(DiscoveryError),
    NoCandidates,
    ExtractionInvalid { tool: String, violations: Vec<Violation> },
    InvocationRetryable { tool: String, error: InvokeError },
    InvocationFatal { tool: String, error: InvokeError },
    Cancelled,
}

impl QueryError {
    /// Stable machine-readable class of the failure.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty_query",
            Self::Discovery(_) => "discovery_failed",
            Self::NoCandidates => "no_candidates",
            Self::ExtractionInvalid { .. } => "extraction_invalid",
            Self::InvocationRetryable { error, .. } | Self::InvocationFatal { error, .. } => error.kind.as_str(),
            Self::Cancelled => "cancelled",
        }
    }

    /// User-facing explanation; never contains transport or remote error text.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyQuery => {
                "Please tell me what you would like to look up or change.".to_string()
            }
            Self::Discovery(_) => "The system is not ready yet: I could not load the list of available operations. Please try again in a moment.".to_string(),
            Self::NoCandidates => {
                "I couldn't understand your query. Could you please rephrase it?".to_string()
            }
            Self::ExtractionInvalid { violations, .. } => {
                let details: Vec<String> = violations.iter().map(Violation::describe).collect();
                if details.is_empty() {
                    "I need a bit more detail to handle that request. Could you be more specific?"
                        .to_string()
                } else {
                    format!(
                        "I need a bit more detail to handle that request: {}. Could you be more specific?",
                        details.join("; ")
                    )
                }
            }
            Self::InvocationRetryable { error, .. } | Self::InvocationFatal { error, .. } => {
                invocation_message(error.kind).to_string()
            }
            Self::Cancelled => "The request was cancelled before it finished.".to_string(),
        }
    }
}

const fn invocation_message(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::Timeout => {
            "The request took too long to process. Please try again or simplify your query."
        }
        FailureKind::Transport => {
            "I'm having trouble connecting to the tool server. Please try again in a moment."
        }
        FailureKind::InvalidRequest => {
            "I had trouble building the query. Could you be more specific about what information you're looking for?"
        }
        FailureKind::UnknownTool => "That operation is not available right now.",
        FailureKind::PermissionDenied => {
            "You don't have permission to access this information. Please check with your administrator."
        }
        FailureKind::MalformedSchema => {
            "That operation is misconfigured on the server and can't be used right now."
        }
        FailureKind::Remote => {
            "I encountered an issue while processing your request. Please try rephrasing your question or contact support if the problem persists."
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyQuery => write!(f, "query is empty"),
            Self::Discovery(err) => write!(f, "{err}"),
            Self::NoCandidates => write!(f, "no candidate tools matched the query"),
            Self::ExtractionInvalid { tool, violations } => {
                write!(f, "arguments for {tool} are invalid ({} violations)", violations.len())
            }
            Self::InvocationRetryable { tool, error } | Self::InvocationFatal { tool, error } => {
                write!(f, "invocation of {tool} failed: {error}")
            }
            Self::Cancelled => write!(f, "query cancelled"),
        }
    }
}

impl Error for QueryError {}

impl From<DiscoveryError> for QueryError {
    fn from(err: DiscoveryError) -> Self {
        Self::Discovery(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_remote_messages() {
        assert_eq!(
            FailureKind::from_message("INSUFFICIENT_ACCESS_OR_READONLY: no access"),
            FailureKind::PermissionDenied
        );
        assert_eq!(
            FailureKind::from_message("MALFORMED_QUERY: unexpected token: FROM"),
            FailureKind::InvalidRequest
        );
        assert_eq!(
            FailureKind::from_message("Request timed out after 30 seconds"),
            FailureKind::Timeout
        );
        assert_eq!(FailureKind::from_message("socket hang up"), FailureKind::Remote);
    }

    #[test]
    fn only_permission_and_schema_failures_are_fatal() {
        assert!(FailureKind::Timeout.is_retryable());
        assert!(FailureKind::Transport.is_retryable());
        assert!(FailureKind::InvalidRequest.is_retryable());
        assert!(!FailureKind::PermissionDenied.is_retryable());
        assert!(!FailureKind::MalformedSchema.is_retryable());
    }

    #[test]
    fn user_messages_hide_remote_text() {
        let err = QueryError::InvocationFatal {
            tool: "salesforce_query_records".to_string(),
            error: InvokeError::remote("INSUFFICIENT_ACCESS: secret-org-detail"),
        };
        let message = err.user_message();
        assert!(message.contains("permission"));
        assert!(!message.contains("secret-org-detail"));
    }
}
