use std::collections::BTreeMap;

use futures::future::BoxFuture;

use crate::error::{DagwrightError, Result};
use crate::types::{ContextMap, Document, Prompt};

/// Architecture description of a capability unit: section name to entries.
pub type Architecture = BTreeMap<String, Vec<String>>;

/// Sections every capability architecture must declare.
pub const REQUIRED_ARCHITECTURE_KEYS: [&str; 3] = ["task_flow", "decision_points", "capabilities"];

/// Capability unit: the work a graph node delegates to.
///
/// Skills, services and domain support agents all implement this. The
/// two-phase protocol is `analyze` (enrich the context, default passthrough)
/// followed by `perform` (do the work).
pub trait Capability: Send + Sync + 'static {
    /// Domain name, e.g. "governance".
    fn domain(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str {
        ""
    }

    fn architecture(&self) -> &Architecture;

    /// Keywords that route a query to this capability.
    fn delegation_keywords(&self) -> &[String];

    /// Free-text task descriptions; significant words also become routing keywords.
    fn task_patterns(&self) -> &[String];

    /// Enrich the context before `perform`.
    fn analyze<'a>(&'a self, query: &'a str, ctx: ContextMap) -> BoxFuture<'a, Result<ContextMap>> {
        let _ = query;
        Box::pin(async move { Ok(ctx) })
    }

    /// Execute the capability against the accumulated context.
    fn perform(&self, ctx: ContextMap) -> BoxFuture<'_, Result<serde_json::Value>>;
}

/// Fail with a configuration error if the capability's architecture is
/// missing one of [`REQUIRED_ARCHITECTURE_KEYS`].
pub fn validate_architecture(capability: &dyn Capability) -> Result<()> {
    let arch = capability.architecture();
    let missing: Vec<&str> = REQUIRED_ARCHITECTURE_KEYS
        .iter()
        .copied()
        .filter(|key| !arch.contains_key(*key))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DagwrightError::Config(format!(
            "capability '{}' architecture is missing: {}",
            capability.domain(),
            missing.join(", ")
        )))
    }
}

/// Searchable data source (vector store, document index, ...).
pub trait DataSource: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Top `k` documents for `query`.
    fn search<'a>(&'a self, query: &'a str, k: usize) -> BoxFuture<'a, Result<Vec<Document>>>;
}

/// Prompt template storage.
pub trait PromptSource: Send + Sync + 'static {
    /// Resolve one or more named templates into a single prompt.
    /// Multiple names are concatenated in order; unknown names are skipped.
    /// `None` when none of the names resolve.
    fn get_prompt(&self, names: &[String]) -> Option<Prompt>;
}
