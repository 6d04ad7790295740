//! Core pipeline for nlq-mcp.
//!
//! This crate owns the tool registry that discovers and caches remote
//! operations, the classifier and extractor that turn free text into a concrete
//! call, the formatter that renders results, and the orchestrator that drives
//! them with bounded fallback.

pub mod classifier;
pub mod error;
pub mod extract;
pub mod format;
pub mod invoker;
pub mod options;
pub mod orchestrator;
pub mod registry;

pub use classifier::{CategoryClassifier, ClassificationResult};
pub use error::{DiscoveryError, FailureKind, InvokeError, QueryError};
pub use extract::{ExtractedArguments, ParameterExtractor};
pub use format::ResponseFormatter;
pub use invoker::{RawTool, StaticInvoker, ToolInvoker};
pub use options::PipelineOptions;
pub use orchestrator::{Attempt, QueryOrchestrator, QueryOutcome, QueryResult, Stage};
pub use registry::{Catalog, RegistryConfig, RegistryStats, ToolRegistry};
