use std::sync::Arc;

use nlq_core::extract::UnknownCorrectionRule;
use nlq_core::{QueryOrchestrator, RegistryConfig, ToolInvoker, ToolRegistry};

use crate::config::NlqConfig;

/// Builds the registry and orchestrator shared by every server surface.
pub fn build_orchestrator(
    config: &NlqConfig,
    invoker: Arc<dyn ToolInvoker>,
) -> Result<QueryOrchestrator, UnknownCorrectionRule> {
    let registry = ToolRegistry::with_config(invoker, RegistryConfig::from(&config.pipeline));
    QueryOrchestrator::from_options(registry, &config.pipeline)
}
