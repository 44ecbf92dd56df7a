use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use dagwright_core::error::DagwrightError;
use dagwright_core::types::ContextMap;

/// Context key a router writes to choose the next conditional branch.
pub const NEXT_NODE_KEY: &str = "next_node";

/// Branch key used when no router decision is present.
pub const DEFAULT_BRANCH: &str = "default";

/// One entry in the execution transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMessage {
    /// Node that produced the entry.
    pub node_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for StepMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.node_id, self.content)
    }
}

/// State threaded through every node during one graph invocation.
///
/// Nodes read only the fields they document, append to `messages`, and
/// write their output under `results[node_id]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedState {
    /// Append-only transcript of execution steps.
    pub messages: Vec<StepMessage>,
    /// Side channel for inter-node communication.
    pub context: ContextMap,
    pub current_query: String,
    /// Per-node output keyed by node id.
    pub results: BTreeMap<String, Value>,
    pub metadata: ContextMap,
}

impl SharedState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            current_query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: ContextMap) -> Self {
        self.context = context;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn push_message(&mut self, node_id: &str, content: impl Into<String>) {
        self.messages.push(StepMessage {
            node_id: node_id.to_string(),
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn set_result(&mut self, node_id: &str, value: Value) {
        self.results.insert(node_id.to_string(), value);
    }

    /// Get a context value as a string, if it is one.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }

    /// Branch key chosen by the last router, or `"default"`.
    pub fn next_node(&self) -> &str {
        self.context_str(NEXT_NODE_KEY).unwrap_or(DEFAULT_BRANCH)
    }

    pub fn set_next_node(&mut self, target: &str) {
        self.context.insert(NEXT_NODE_KEY.into(), json!(target));
    }

    /// Record a node failure as an error marker in its result slot.
    pub fn record_failure(&mut self, node_id: &str, err: &DagwrightError) {
        self.set_result(node_id, json!({ "error": err.to_string() }));
        self.push_message(node_id, format!("Node {node_id} failed: {err}"));
    }

    /// Whether the node's result slot holds an error marker.
    pub fn failed(&self, node_id: &str) -> bool {
        self.results
            .get(node_id)
            .and_then(|v| v.get("error"))
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_node_defaults() {
        let mut state = SharedState::new("q");
        assert_eq!(state.next_node(), "default");
        state.set_next_node("governance_agent");
        assert_eq!(state.next_node(), "governance_agent");
    }

    #[test]
    fn failure_marker_is_detectable() {
        let mut state = SharedState::new("q");
        state.record_failure(
            "trade_agent",
            &DagwrightError::Capability {
                node: "trade_agent".into(),
                message: "rpc down".into(),
            },
        );
        assert!(state.failed("trade_agent"));
        assert!(!state.failed("other"));
        assert_eq!(state.messages.len(), 1);
        assert!(state.messages[0].to_string().starts_with("[trade_agent]"));
    }
}
