use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tracing::{debug, warn};

use dagwright_core::error::Result;
use dagwright_core::prompt::PromptSelection;
use dagwright_core::traits::PromptSource;
use dagwright_core::types::{ContextMap, NodeKind};

use crate::node::{Node, NodeInfo};
use crate::state::SharedState;

/// Context key holding the resolved prompt text.
pub const ACTIVE_PROMPT_KEY: &str = "active_prompt";

/// Resolves prompt templates into `context["active_prompt"]`.
pub struct PromptNode {
    info: NodeInfo,
    source: Arc<dyn PromptSource>,
    selection: PromptSelection,
}

impl PromptNode {
    /// Node applying a fixed list of template names.
    pub fn new(info: NodeInfo, source: Arc<dyn PromptSource>, prompt_names: Vec<String>) -> Self {
        Self::with_selection(info, source, PromptSelection::fixed(prompt_names))
    }

    /// Node choosing templates by a declarative rule.
    pub fn with_selection(
        info: NodeInfo,
        source: Arc<dyn PromptSource>,
        selection: PromptSelection,
    ) -> Self {
        Self {
            info,
            source,
            selection,
        }
    }

    pub fn selection(&self) -> &PromptSelection {
        &self.selection
    }
}

impl Node for PromptNode {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Prompt
    }

    fn execute<'a>(&'a self, state: &'a mut SharedState) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let names = self.selection.prompt_names(&state.context);
            let joined = names.join(", ");
            match self.selection.resolve(self.source.as_ref(), &state.context) {
                Some(prompt) => {
                    debug!(node_id = %self.info.id, prompt = %prompt.name, "Applied prompt");
                    state
                        .context
                        .insert(ACTIVE_PROMPT_KEY.into(), json!(prompt.template));
                    state.set_result(&self.info.id, json!(format!("Applied prompt: {joined}")));
                }
                None => {
                    warn!(node_id = %self.info.id, prompts = %joined, "Prompt not found");
                    state.set_result(
                        &self.info.id,
                        json!(format!("Failed to load prompt: {joined}")),
                    );
                }
            }
            state.push_message(&self.info.id, format!("Prompt node {} processed", self.info.name));
            Ok(())
        })
    }

    fn config(&self) -> ContextMap {
        let mut map = ContextMap::new();
        map.insert(
            "prompt_selection".into(),
            serde_json::to_value(&self.selection).unwrap_or_default(),
        );
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt_library::PromptLibrary;
    use dagwright_core::types::Prompt;

    fn library() -> Arc<dyn PromptSource> {
        Arc::new(PromptLibrary::from_prompts([
            Prompt::new("main_agent_prompt", "You are Talon. "),
            Prompt::new("general_agent_prompt", "Be concise."),
        ]))
    }

    #[tokio::test]
    async fn applies_concatenated_prompts() {
        let node = PromptNode::new(
            NodeInfo::new("main_prompt", "Main Prompt"),
            library(),
            vec!["main_agent_prompt".into(), "general_agent_prompt".into()],
        );
        let mut state = SharedState::new("hi");
        node.execute(&mut state).await.unwrap();

        assert_eq!(state.context_str(ACTIVE_PROMPT_KEY), Some("You are Talon. Be concise."));
        assert_eq!(
            state.results["main_prompt"],
            "Applied prompt: main_agent_prompt, general_agent_prompt"
        );
        assert_eq!(state.messages[0].content, "Prompt node Main Prompt processed");
    }

    #[tokio::test]
    async fn missing_prompt_records_failure() {
        let node = PromptNode::new(
            NodeInfo::new("main_prompt", "Main Prompt"),
            library(),
            vec!["nope".into()],
        );
        let mut state = SharedState::new("hi");
        node.execute(&mut state).await.unwrap();

        assert!(state.context.get(ACTIVE_PROMPT_KEY).is_none());
        assert_eq!(state.results["main_prompt"], "Failed to load prompt: nope");
    }

    #[test]
    fn describe_includes_selection() {
        let node = PromptNode::new(NodeInfo::new("p", "P"), library(), vec!["a".into()]);
        let config = node.describe();
        assert_eq!(config["node_type"], "prompt");
        assert_eq!(config["prompt_selection"]["selector"]["mode"], "static");
    }
}
