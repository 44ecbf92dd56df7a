use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use dagwright_core::types::RunId;
use dagwright_graph::SharedState;

/// How a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    Graph,
    /// Graph execution failed and the direct fallback answered.
    Degraded,
}

/// Rendered outcome of one orchestrated run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub run_id: RunId,
    pub mode: ResponseMode,
    pub content: String,
    #[serde(default)]
    pub results: BTreeMap<String, Value>,
    #[serde(default)]
    pub messages: Vec<String>,
}

impl Response {
    pub fn is_degraded(&self) -> bool {
        self.mode == ResponseMode::Degraded
    }

    pub(crate) fn from_state(
        run_id: RunId,
        state: SharedState,
        preview_chars: usize,
        message_tail: usize,
    ) -> Self {
        let messages: Vec<String> = state.messages.into_iter().map(|m| m.content).collect();
        let content = render(&state.results, &messages, preview_chars, message_tail);
        Self {
            run_id,
            mode: ResponseMode::Graph,
            content,
            results: state.results,
            messages,
        }
    }

    pub(crate) fn degraded(run_id: RunId, content: String) -> Self {
        Self {
            run_id,
            mode: ResponseMode::Degraded,
            content,
            results: BTreeMap::new(),
            messages: Vec::new(),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

/// Results block followed by the last `message_tail` step messages.
///
/// ```text
/// DAG Execution Results:
/// - main_router: Routed to: governance_agent...
///
/// Execution Flow:
/// - Router Main Router determined next path
/// ```
pub fn render(
    results: &BTreeMap<String, Value>,
    messages: &[String],
    preview_chars: usize,
    message_tail: usize,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !results.is_empty() {
        parts.push("DAG Execution Results:".to_string());
        for (node_id, result) in results {
            let text = match result {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let preview: String = text.chars().take(preview_chars).collect();
            parts.push(format!("- {node_id}: {preview}..."));
        }
    }

    if !messages.is_empty() {
        parts.push("\nExecution Flow:".to_string());
        let start = messages.len().saturating_sub(message_tail);
        parts.extend(messages[start..].iter().map(|m| format!("- {m}")));
    }

    if parts.is_empty() {
        "DAG execution completed".to_string()
    } else {
        parts.join("\n")
    }
}
