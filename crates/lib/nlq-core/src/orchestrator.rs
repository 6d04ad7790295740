//! Drives one query through classification, extraction, invocation, and
//! formatting, falling back across a bounded number of candidate tools.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use nlq_catalog::Category;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::CategoryClassifier;
use crate::error::{InvokeError, QueryError};
use crate::extract::{Correction, ParameterExtractor, QueryFeatures, UnknownCorrectionRule};
use crate::format::ResponseFormatter;
use crate::options::{DEFAULT_INVOKE_TIMEOUT, DEFAULT_MAX_ATTEMPTS, PipelineOptions};
use crate::registry::ToolRegistry;

/// Pipeline states a query passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Classifying,
    Selecting,
    Extracting,
    Invoking,
    FallingBack,
    Formatting,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Classifying => "classifying",
            Self::Selecting => "selecting",
            Self::Extracting => "extracting",
            Self::Invoking => "invoking",
            Self::FallingBack => "falling_back",
            Self::Formatting => "formatting",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOutcome {
    /// The top-ranked candidate answered.
    Success,
    /// A fallback candidate answered.
    Partial,
    Failure,
}

/// One candidate that did not produce the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub tool: String,
    pub stage: Stage,
    /// Failure class only; remote error text is never recorded here.
    pub reason: String,
}

/// The single result produced for every processed query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query_id: Uuid,
    pub outcome: QueryOutcome,
    pub rendered: String,
    pub tool_invoked: Option<String>,
    pub category: Option<Category>,
    pub arguments: Option<Map<String, Value>>,
    pub corrections: Vec<Correction>,
    pub raw: Option<Value>,
    pub attempts: Vec<Attempt>,
    pub error: Option<String>,
}

impl QueryResult {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, QueryOutcome::Success | QueryOutcome::Partial)
    }
}

/// Per-query bookkeeping carried across states.
struct Trace {
    query_id: Uuid,
    category: Option<Category>,
    attempts: Vec<Attempt>,
    dispatched: Option<(String, Map<String, Value>)>,
    corrections: Vec<Correction>,
}

impl Trace {
    fn new() -> Self {
        Self {
            query_id: Uuid::new_v4(),
            category: None,
            attempts: Vec::new(),
            dispatched: None,
            corrections: Vec::new(),
        }
    }

    fn fail(&mut self, tool: &str, stage: Stage, reason: &str) {
        self.attempts.push(Attempt {
            tool: tool.to_string(),
            stage,
            reason: reason.to_string(),
        });
    }

    fn failure(self, error: &QueryError) -> QueryResult {
        warn!(query_id = %self.query_id, error = %error, "query failed");
        let (tool_invoked, arguments) = self.dispatched.unzip();
        QueryResult {
            query_id: self.query_id,
            outcome: QueryOutcome::Failure,
            rendered: error.user_message(),
            tool_invoked,
            category: self.category,
            arguments,
            corrections: self.corrections,
            raw: None,
            attempts: self.attempts,
            error: Some(error.code().to_string()),
        }
    }
}

/// Resolves free-text queries against the tool catalog.
#[derive(Clone)]
pub struct QueryOrchestrator {
    registry: ToolRegistry,
    classifier: CategoryClassifier,
    extractor: ParameterExtractor,
    formatter: ResponseFormatter,
    max_attempts: usize,
    invoke_timeout: Duration,
}

impl QueryOrchestrator {
    #[must_use]
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            classifier: CategoryClassifier::new(),
            extractor: ParameterExtractor::new(),
            formatter: ResponseFormatter::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
        }
    }

    /// # Errors
    /// Returns `UnknownCorrectionRule` if the options name a rule that does not exist.
    pub fn from_options(registry: ToolRegistry, options: &PipelineOptions) -> Result<Self, UnknownCorrectionRule> {
        Ok(Self {
            registry,
            classifier: CategoryClassifier::new().with_min_confidence(options.min_confidence),
            extractor: ParameterExtractor::from_options(&options.extraction)?,
            formatter: ResponseFormatter::new().with_sample_size(options.sample_size),
            max_attempts: options.max_attempts.max(1),
            invoke_timeout: options.invoke_timeout,
        })
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: ParameterExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = if max_attempts == 0 { 1 } else { max_attempts };
        self
    }

    #[must_use]
    pub const fn with_invoke_timeout(mut self, invoke_timeout: Duration) -> Self {
        self.invoke_timeout = invoke_timeout;
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Processes one query. Always yields exactly one result.
    pub async fn process(&self, query: &str) -> QueryResult {
        self.run(query, None).await
    }

    /// Like [`Self::process`], but gives up at the next state boundary or
    /// in-flight call once `token` is cancelled.
    pub async fn process_cancellable(&self, query: &str, token: &CancellationToken) -> QueryResult {
        self.run(query, Some(token)).await
    }

    async fn run(&self, query: &str, token: Option<&CancellationToken>) -> QueryResult {
        let mut trace = Trace::new();
        let query = query.trim();
        if query.is_empty() {
            return trace.failure(&QueryError::EmptyQuery);
        }
        info!(query_id = %trace.query_id, query, "processing query");

        debug!(query_id = %trace.query_id, stage = %Stage::Classifying);
        let catalog = match guard(token, self.registry.get_tools()).await {
            Some(Ok(catalog)) => catalog,
            Some(Err(err)) => return trace.failure(&QueryError::Discovery(err)),
            None => return trace.failure(&QueryError::Cancelled),
        };
        let classification = self.classifier.classify(query, &catalog);
        trace.category = classification.selected;
        if classification.is_empty() {
            return trace.failure(&QueryError::NoCandidates);
        }

        let features = QueryFeatures::scan(query);
        let invoker = self.registry.invoker();
        let mut last_error = QueryError::NoCandidates;

        for (rank, candidate) in classification.tools.iter().take(self.max_attempts).enumerate() {
            if token.is_some_and(CancellationToken::is_cancelled) {
                return trace.failure(&QueryError::Cancelled);
            }
            let tool = &candidate.tool;
            if rank > 0 {
                debug!(query_id = %trace.query_id, stage = %Stage::FallingBack, tool = %tool.name);
            }
            debug!(
                query_id = %trace.query_id,
                stage = %Stage::Selecting,
                tool = %tool.name,
                confidence = candidate.confidence
            );

            let extracted = self.extractor.extract_with(&features, tool);
            if !extracted.is_valid() {
                warn!(query_id = %trace.query_id, tool = %tool.name, "arguments invalid; trying next candidate");
                trace.fail(&tool.name, Stage::Extracting, "extraction_invalid");
                last_error = QueryError::ExtractionInvalid {
                    tool: tool.name.clone(),
                    violations: extracted.violations().to_vec(),
                };
                continue;
            }

            trace.corrections = extracted.corrections().to_vec();
            let arguments = extracted.into_arguments();
            trace.dispatched = Some((tool.name.clone(), arguments.clone()));
            info!(query_id = %trace.query_id, stage = %Stage::Invoking, tool = %tool.name, "dispatching tool call");

            let call = tokio::time::timeout(self.invoke_timeout, invoker.invoke(&tool.name, arguments.clone()));
            let outcome = match guard(token, call).await {
                Some(Ok(outcome)) => outcome,
                Some(Err(_)) => Err(InvokeError::timeout(self.invoke_timeout)),
                None => return trace.failure(&QueryError::Cancelled),
            };

            match outcome {
                Ok(raw) => {
                    debug!(query_id = %trace.query_id, stage = %Stage::Formatting, tool = %tool.name);
                    let rendered = self.formatter.format(tool, &raw);
                    let outcome = if rank == 0 { QueryOutcome::Success } else { QueryOutcome::Partial };
                    info!(
                        query_id = %trace.query_id,
                        stage = %Stage::Done,
                        tool = %tool.name,
                        outcome = ?outcome,
                        "query answered"
                    );
                    return QueryResult {
                        query_id: trace.query_id,
                        outcome,
                        rendered,
                        tool_invoked: Some(tool.name.clone()),
                        category: trace.category,
                        arguments: Some(arguments),
                        corrections: trace.corrections,
                        raw: Some(raw),
                        attempts: trace.attempts,
                        error: None,
                    };
                }
                Err(error) if error.is_retryable() => {
                    warn!(
                        query_id = %trace.query_id,
                        tool = %tool.name,
                        kind = %error.kind,
                        "tool call failed; trying next candidate"
                    );
                    trace.fail(&tool.name, Stage::Invoking, error.kind.as_str());
                    last_error = QueryError::InvocationRetryable {
                        tool: tool.name.clone(),
                        error,
                    };
                }
                Err(error) => {
                    trace.fail(&tool.name, Stage::Invoking, error.kind.as_str());
                    return trace.failure(&QueryError::InvocationFatal {
                        tool: tool.name.clone(),
                        error,
                    });
                }
            }
        }

        trace.failure(&last_error)
    }
}

/// Runs `future` to completion unless `token` fires first.
async fn guard<F: Future>(token: Option<&CancellationToken>, future: F) -> Option<F::Output> {
    match token {
        None => Some(future.await),
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => None,
            output = future => Some(output),
        },
    }
}
