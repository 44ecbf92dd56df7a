use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tracing::info;

use dagwright_core::error::{DagwrightError, Result};
use dagwright_core::event::EventBus;
use dagwright_core::prompt::PromptSelection;
use dagwright_core::traits::{Capability, DataSource, PromptSource};
use dagwright_core::types::{ContextMap, NodeKind, RunId};

use crate::graph::{Graph, DEFAULT_MAX_STEPS};
use crate::node::{GraphNode, Node, NodeInfo};
use crate::nodes::{CapabilityNode, DataSourceNode, DelegationRuleSet, PromptNode, RouterNode};
use crate::proposal::GraphProposal;
use crate::state::SharedState;

pub const PROMPT_NODE_ID: &str = "main_prompt";
pub const DATA_SOURCE_NODE_ID: &str = "dataset_source";
pub const ROUTER_NODE_ID: &str = "main_router";

/// Everything a default graph is assembled from.
#[derive(Clone)]
pub struct GraphComponents {
    pub name: String,
    pub description: String,
    pub prompts: Arc<dyn PromptSource>,
    pub prompt_selection: PromptSelection,
    pub skills: Vec<Arc<dyn Capability>>,
    pub services: Vec<Arc<dyn Capability>>,
    pub tools: Vec<Arc<dyn Capability>>,
    pub data_source: Option<Arc<dyn DataSource>>,
    pub top_k: usize,
    /// Extra keyword → node id rules for the plain router.
    pub routing: BTreeMap<String, String>,
    pub max_steps: usize,
    pub events: Option<Arc<EventBus>>,
}

impl GraphComponents {
    pub fn new(name: impl Into<String>, prompts: Arc<dyn PromptSource>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            prompts,
            prompt_selection: PromptSelection::fixed(vec![
                "main_agent_prompt".to_string(),
                "general_agent_prompt".to_string(),
            ]),
            skills: Vec::new(),
            services: Vec::new(),
            tools: Vec::new(),
            data_source: None,
            top_k: 5,
            routing: BTreeMap::new(),
            max_steps: DEFAULT_MAX_STEPS,
            events: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_skill(mut self, skill: Arc<dyn Capability>) -> Self {
        self.skills.push(skill);
        self
    }

    pub fn with_service(mut self, service: Arc<dyn Capability>) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Capability>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_data_source(mut self, source: Arc<dyn DataSource>, top_k: usize) -> Self {
        self.data_source = Some(source);
        self.top_k = top_k;
        self
    }

    pub fn with_prompt_selection(mut self, selection: PromptSelection) -> Self {
        self.prompt_selection = selection;
        self
    }

    pub fn with_routing_rule(mut self, keyword: impl Into<String>, target: impl Into<String>) -> Self {
        self.routing.insert(keyword.into(), target.into());
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Empty graph carrying the configured name, budget and event bus.
    pub fn empty_graph(&self) -> Graph {
        let mut graph = Graph::new(self.name.clone()).with_max_steps(self.max_steps);
        if !self.description.is_empty() {
            graph = graph.with_description(self.description.clone());
        }
        if let Some(bus) = &self.events {
            graph = graph.with_events(Arc::clone(bus));
        }
        graph
    }

    /// Add the prompt node and, when configured, the data-source node behind
    /// it. Returns the id the router should follow.
    pub fn add_intake(&self, graph: &Graph) -> Result<String> {
        graph.add_node(PromptNode::with_selection(
            NodeInfo::new(PROMPT_NODE_ID, "Main Agent Prompt")
                .with_description("Primary prompt for the agent"),
            Arc::clone(&self.prompts),
            self.prompt_selection.clone(),
        ))?;

        match &self.data_source {
            Some(source) => {
                graph.add_node(DataSourceNode::new(
                    NodeInfo::new(DATA_SOURCE_NODE_ID, "Dataset Manager")
                        .with_description("Provides relevant documents and context"),
                    Arc::clone(source),
                    self.top_k,
                ))?;
                graph.add_edge(PROMPT_NODE_ID, DATA_SOURCE_NODE_ID)?;
                Ok(DATA_SOURCE_NODE_ID.to_string())
            }
            None => Ok(PROMPT_NODE_ID.to_string()),
        }
    }
}

/// Title-case a domain name for display ("pr_review" → "Pr_review").
pub fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Node id of a skill, service or tool: `{domain}_{kind}`.
pub fn capability_node_id(domain: &str, kind: NodeKind) -> String {
    format!("{domain}_{kind}")
}

fn capability_node(capability: &Arc<dyn Capability>, kind: NodeKind) -> Result<CapabilityNode> {
    let domain = capability.domain();
    let label = match kind {
        NodeKind::Service => "Service",
        NodeKind::Tool => "Tool",
        _ => "Skill",
    };
    CapabilityNode::new(
        NodeInfo::new(
            capability_node_id(domain, kind),
            format!("{} {label}", title_case(domain)),
        )
        .with_description(format!("{label} for {domain} operations")),
        kind,
        Arc::clone(capability),
    )
}

/// Routing rules a capability contributes. Skills route on their keywords
/// and significant task-pattern words; services and tools on keywords only.
fn capability_rules(capability: &Arc<dyn Capability>, kind: NodeKind) -> DelegationRuleSet {
    let node_id = capability_node_id(capability.domain(), kind);
    match kind {
        NodeKind::Skill => DelegationRuleSet::from_capabilities([capability], |_| node_id.clone()),
        _ => capability
            .delegation_keywords()
            .iter()
            .map(|keyword| (keyword.clone(), node_id.clone()))
            .collect(),
    }
}

/// Rebuild the main router with `edit` applied to its rules, then point its
/// conditional edge at every rule target that is a node. No-op when the
/// graph has no plain router.
fn rebuild_router(graph: &Graph, edit: impl FnOnce(&mut DelegationRuleSet)) -> Result<()> {
    let router = match graph.node(ROUTER_NODE_ID)? {
        Some(GraphNode::Router(router)) => router,
        _ => return Ok(()),
    };
    let mut rules: DelegationRuleSet = router.rules().iter().cloned().collect();
    edit(&mut rules);

    let rebuilt = RouterNode::new(
        router.info().clone(),
        rules.iter().map(|(k, t)| (k.clone(), t.clone())),
    );
    let targets: Vec<String> = rebuilt.targets().into_iter().map(String::from).collect();
    graph.replace_node(rebuilt)?;

    let target_refs: Vec<&str> = targets.iter().map(String::as_str).collect();
    let branches = branches_for(graph, &target_refs)?;
    if branches.is_empty() {
        graph.remove_conditional_edge(ROUTER_NODE_ID)?;
    } else {
        graph.add_conditional_edge(ROUTER_NODE_ID, branches)?;
    }
    Ok(())
}

/// Branches `{target: target}` for every routing target that is a node.
pub fn branches_for(graph: &Graph, targets: &[&str]) -> Result<BTreeMap<String, String>> {
    let mut branches = BTreeMap::new();
    for target in targets {
        if graph.contains(target)? {
            branches.insert(target.to_string(), target.to_string());
        }
    }
    Ok(branches)
}

/// Builds and owns a non-versioned graph, with a history of prior
/// structures for rollback.
#[derive(Default)]
pub struct GraphManager {
    current: Option<Arc<Graph>>,
    history: Vec<Graph>,
}

impl GraphManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire prompt → (data source) → router → skill, service and tool
    /// nodes, with conditional edges from the router to every routed node.
    pub fn create_default_graph(&mut self, components: &GraphComponents) -> Result<Arc<Graph>> {
        let graph = components.empty_graph();
        let before_router = components.add_intake(&graph)?;

        let groups = [
            (NodeKind::Skill, &components.skills),
            (NodeKind::Service, &components.services),
            (NodeKind::Tool, &components.tools),
        ];

        let mut rules = DelegationRuleSet::new();
        for (kind, capabilities) in groups {
            for capability in capabilities {
                rules.merge(&capability_rules(capability, kind));
            }
        }
        for (keyword, target) in &components.routing {
            rules.insert(keyword, target);
        }

        let router = RouterNode::new(
            NodeInfo::new(ROUTER_NODE_ID, "Main Router")
                .with_description("Routes queries to appropriate skills"),
            rules.iter().map(|(k, t)| (k.clone(), t.clone())),
        );
        let targets: Vec<String> = router.targets().into_iter().map(String::from).collect();
        graph.add_node(router)?;
        graph.add_edge(before_router, ROUTER_NODE_ID)?;

        for (kind, capabilities) in groups {
            for capability in capabilities {
                graph.add_node(capability_node(capability, kind)?)?;
            }
        }

        let target_refs: Vec<&str> = targets.iter().map(String::as_str).collect();
        let branches = branches_for(&graph, &target_refs)?;
        if !branches.is_empty() {
            graph.add_conditional_edge(ROUTER_NODE_ID, branches)?;
        }

        info!(
            graph = %graph.name(),
            nodes = graph.node_count()?,
            skills = components.skills.len(),
            services = components.services.len(),
            tools = components.tools.len(),
            "Default graph created"
        );

        let graph = Arc::new(graph);
        self.current = Some(Arc::clone(&graph));
        Ok(graph)
    }

    pub fn current(&self) -> Option<&Arc<Graph>> {
        self.current.as_ref()
    }

    fn require_current(&self) -> Result<&Arc<Graph>> {
        self.current
            .as_ref()
            .ok_or_else(|| DagwrightError::InvalidGraph("No graph available for execution".into()))
    }

    /// Run the current graph on `query`.
    pub async fn execute(&self, query: &str, context: ContextMap) -> Result<SharedState> {
        self.execute_run(&RunId::new(), query, context).await
    }

    pub async fn execute_run(
        &self,
        run_id: &RunId,
        query: &str,
        context: ContextMap,
    ) -> Result<SharedState> {
        let graph = self.require_current()?;
        let state = SharedState::new(query)
            .with_context(context)
            .with_metadata("dag_name", json!(graph.name()));
        graph.execute_run(run_id, state).await
    }

    /// Snapshot the current structure into history, then apply `proposal`.
    pub fn apply_proposal(&mut self, proposal: &GraphProposal) -> Result<()> {
        let graph = Arc::clone(self.require_current()?);
        proposal.validate(&graph)?;
        self.history.push(graph.duplicate()?);
        proposal.apply_to(&graph)
    }

    /// Add a skill, service or tool to the live graph and route to it. The
    /// domain name becomes a routing keyword alongside the capability's own
    /// rules. Returns the new node id.
    pub fn add_capability(&mut self, capability: Arc<dyn Capability>, kind: NodeKind) -> Result<String> {
        let graph = Arc::clone(self.require_current()?);
        let node = capability_node(&capability, kind)?;
        let node_id = node.info().id.clone();
        if graph.contains(&node_id)? {
            return Err(DagwrightError::InvalidGraph(format!(
                "node '{node_id}' already exists"
            )));
        }

        self.history.push(graph.duplicate()?);
        graph.add_node(node)?;
        let mut added = capability_rules(&capability, kind);
        added.insert(capability.domain(), &node_id);
        rebuild_router(&graph, |rules| rules.merge(&added))?;

        info!(node_id = %node_id, keywords = added.len(), "Capability added to graph");
        Ok(node_id)
    }

    /// Remove a skill, service or tool node along with every router rule
    /// that targets it. Returns false when no such node exists.
    pub fn remove_capability(&mut self, domain: &str, kind: NodeKind) -> Result<bool> {
        let graph = Arc::clone(self.require_current()?);
        let node_id = capability_node_id(domain, kind);
        if !graph.contains(&node_id)? {
            return Ok(false);
        }

        self.history.push(graph.duplicate()?);
        graph.remove_node(&node_id)?;
        rebuild_router(&graph, |rules| rules.retain(|target| target != node_id))?;

        info!(node_id = %node_id, "Capability removed from graph");
        Ok(true)
    }

    /// Restore the most recent snapshot. Returns false when history is empty.
    pub fn rollback_to_previous(&mut self) -> bool {
        match self.history.pop() {
            Some(previous) => {
                info!(graph = %previous.name(), "Rolled back to previous graph");
                self.current = Some(Arc::new(previous));
                true
            }
            None => false,
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn visualize(&self) -> Result<String> {
        match &self.current {
            Some(graph) => graph.visualize(),
            None => Ok("No DAG available".to_string()),
        }
    }

    pub fn serialize(&self) -> Result<String> {
        match &self.current {
            Some(graph) => graph.serialize(),
            None => Ok("{}".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_case_first_letter() {
        assert_eq!(title_case("governance"), "Governance");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn empty_manager_renders_placeholders() {
        let manager = GraphManager::new();
        assert_eq!(manager.visualize().unwrap(), "No DAG available");
        assert_eq!(manager.serialize().unwrap(), "{}");
    }
}
