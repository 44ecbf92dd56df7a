use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use dagwright_core::error::{DagwrightError, Result};
use dagwright_core::event::EventBus;
use dagwright_core::types::{ContextMap, GraphEvent, RunId};

use crate::edge::{ConditionalEdge, Edge};
use crate::node::GraphNode;
use crate::plan::ExecutionPlan;
use crate::state::SharedState;

/// Default walk budget.
pub const DEFAULT_MAX_STEPS: usize = 64;

#[derive(Default)]
struct Structure {
    /// Node ids in insertion order; the first one is the entry.
    order: Vec<String>,
    nodes: HashMap<String, GraphNode>,
    edges: Vec<Edge>,
    conditional: BTreeMap<String, ConditionalEdge>,
    plan: Arc<ExecutionPlan>,
}

impl Structure {
    fn rebuild(&mut self) {
        self.plan = Arc::new(ExecutionPlan::compile(
            &self.order,
            &self.nodes,
            &self.edges,
            &self.conditional,
        ));
    }
}

/// Directed graph of nodes, edges and conditional edges.
///
/// Mutations take the single writer lock, apply the change and swap in a
/// freshly compiled plan before releasing it. Executions clone the current
/// plan `Arc` and walk it without holding the lock, so they never observe a
/// half-applied mutation.
pub struct Graph {
    name: String,
    description: Option<String>,
    max_steps: usize,
    events: Option<Arc<EventBus>>,
    inner: RwLock<Structure>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            max_steps: DEFAULT_MAX_STEPS,
            events: None,
            inner: RwLock::new(Structure::default()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
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

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn events(&self) -> Option<&Arc<EventBus>> {
        self.events.as_ref()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Structure>> {
        self.inner.read().map_err(|_| DagwrightError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Structure>> {
        self.inner.write().map_err(|_| DagwrightError::LockPoisoned)
    }

    fn publish(&self, event: GraphEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    // -- Mutation -------------------------------------------------------

    /// Insert a node. An existing node with the same id is replaced in place
    /// and keeps its position.
    pub fn add_node(&self, node: impl Into<GraphNode>) -> Result<()> {
        let node = node.into();
        let id = node.id().to_string();
        let mut s = self.write()?;
        if s.nodes.insert(id.clone(), node).is_none() {
            s.order.push(id.clone());
        }
        s.rebuild();
        debug!(graph = %self.name, node_id = %id, "Node added");
        Ok(())
    }

    /// Swap an existing node for `node` (same id). Returns the old node.
    pub fn replace_node(&self, node: impl Into<GraphNode>) -> Result<GraphNode> {
        let node = node.into();
        let id = node.id().to_string();
        let mut s = self.write()?;
        let slot = s
            .nodes
            .get_mut(&id)
            .ok_or_else(|| DagwrightError::NodeNotFound(id.clone()))?;
        let old = std::mem::replace(slot, node);
        s.rebuild();
        debug!(graph = %self.name, node_id = %id, "Node replaced");
        Ok(old)
    }

    /// Remove a node and every edge or branch that references it.
    pub fn remove_node(&self, id: &str) -> Result<bool> {
        let mut s = self.write()?;
        if s.nodes.remove(id).is_none() {
            return Ok(false);
        }
        s.order.retain(|n| n != id);
        s.edges.retain(|e| !e.touches(id));
        s.conditional.remove(id);
        for cond in s.conditional.values_mut() {
            cond.forget_target(id);
        }
        s.conditional.retain(|_, cond| !cond.branches.is_empty());
        s.rebuild();
        debug!(graph = %self.name, node_id = %id, "Node removed");
        Ok(true)
    }

    pub fn add_edge(&self, from: impl Into<String>, to: impl Into<String>) -> Result<()> {
        let edge = Edge::new(from, to);
        let mut s = self.write()?;
        s.edges.push(edge);
        s.rebuild();
        Ok(())
    }

    /// Remove every `from → to` edge. Returns whether any existed.
    pub fn remove_edge(&self, from: &str, to: &str) -> Result<bool> {
        let mut s = self.write()?;
        let before = s.edges.len();
        s.edges.retain(|e| !(e.from == from && e.to == to));
        let removed = s.edges.len() != before;
        if removed {
            s.rebuild();
        }
        Ok(removed)
    }

    /// Set the branches out of `source`, replacing any previous ones.
    pub fn add_conditional_edge(
        &self,
        source: impl Into<String>,
        branches: BTreeMap<String, String>,
    ) -> Result<()> {
        let cond = ConditionalEdge::new(source, branches);
        let mut s = self.write()?;
        s.conditional.insert(cond.source.clone(), cond);
        s.rebuild();
        Ok(())
    }

    /// Drop the branches out of `source`. Returns whether any existed.
    pub fn remove_conditional_edge(&self, source: &str) -> Result<bool> {
        let mut s = self.write()?;
        let removed = s.conditional.remove(source).is_some();
        if removed {
            s.rebuild();
        }
        Ok(removed)
    }

    // -- Inspection -----------------------------------------------------

    /// Current compiled plan.
    pub fn snapshot(&self) -> Result<Arc<ExecutionPlan>> {
        Ok(Arc::clone(&self.read()?.plan))
    }

    pub fn node(&self, id: &str) -> Result<Option<GraphNode>> {
        Ok(self.read()?.nodes.get(id).cloned())
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> Result<Vec<GraphNode>> {
        let s = self.read()?;
        Ok(s.order.iter().filter_map(|id| s.nodes.get(id).cloned()).collect())
    }

    pub fn node_ids(&self) -> Result<Vec<String>> {
        Ok(self.read()?.order.clone())
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.read()?.nodes.contains_key(id))
    }

    pub fn node_count(&self) -> Result<usize> {
        Ok(self.read()?.nodes.len())
    }

    pub fn entry(&self) -> Result<Option<String>> {
        Ok(self.read()?.order.first().cloned())
    }

    pub fn edges(&self) -> Result<Vec<Edge>> {
        Ok(self.read()?.edges.clone())
    }

    pub fn conditional_edges(&self) -> Result<BTreeMap<String, ConditionalEdge>> {
        Ok(self.read()?.conditional.clone())
    }

    /// New graph with the same settings and structure. Nodes are shared.
    pub fn duplicate(&self) -> Result<Graph> {
        let s = self.read()?;
        let copy = Graph {
            name: self.name.clone(),
            description: self.description.clone(),
            max_steps: self.max_steps,
            events: self.events.clone(),
            inner: RwLock::new(Structure {
                order: s.order.clone(),
                nodes: s.nodes.clone(),
                edges: s.edges.clone(),
                conditional: s.conditional.clone(),
                plan: Arc::clone(&s.plan),
            }),
        };
        Ok(copy)
    }

    // -- Execution ------------------------------------------------------

    pub async fn execute(&self, state: SharedState) -> Result<SharedState> {
        self.execute_run(&RunId::new(), state).await
    }

    /// Walk the current plan from the entry node.
    ///
    /// Node errors are recorded in the state and the walk continues. Fails
    /// when the graph is empty, a transition names an unknown node, or more
    /// than `max_steps` nodes are visited.
    pub async fn execute_run(&self, run_id: &RunId, mut state: SharedState) -> Result<SharedState> {
        let plan = self.snapshot()?;
        let entry = plan.entry().ok_or(DagwrightError::EmptyGraph)?.to_string();

        info!(graph = %self.name, run_id = %run_id, entry = %entry, "Graph run started");
        self.publish(GraphEvent::RunStarted {
            run_id: run_id.clone(),
            entry: entry.clone(),
        });

        let mut current = Some(entry);
        let mut steps = 0usize;

        while let Some(node_id) = current {
            if steps >= self.max_steps {
                warn!(graph = %self.name, node_id = %node_id, limit = self.max_steps, "Step budget exhausted");
                return Err(DagwrightError::StepBudgetExceeded {
                    limit: self.max_steps,
                    last_node: node_id,
                });
            }
            steps += 1;

            let node = plan
                .node(&node_id)
                .ok_or_else(|| DagwrightError::NodeNotFound(node_id.clone()))?;

            debug!(run_id = %run_id, node_id = %node_id, kind = %node.kind(), step = steps, "Executing graph node");
            self.publish(GraphEvent::NodeEntered {
                run_id: run_id.clone(),
                node_id: node_id.clone(),
                step: steps,
            });

            match node.execute(&mut state).await {
                Ok(()) => self.publish(GraphEvent::NodeCompleted {
                    run_id: run_id.clone(),
                    node_id: node_id.clone(),
                }),
                Err(e) => {
                    warn!(run_id = %run_id, node_id = %node_id, error = %e, "Graph node failed");
                    state.record_failure(&node_id, &e);
                    self.publish(GraphEvent::NodeFailed {
                        run_id: run_id.clone(),
                        node_id: node_id.clone(),
                        error: e.to_string(),
                    });
                }
            }

            current = plan.next(&node_id, &state).map(str::to_string);
            debug!(from = %node_id, to = ?current, "Transition");
        }

        info!(graph = %self.name, run_id = %run_id, steps, "Graph run complete");
        self.publish(GraphEvent::RunCompleted {
            run_id: run_id.clone(),
            steps,
        });
        Ok(state)
    }

    // -- Serialization --------------------------------------------------

    /// Node descriptions plus edges and conditional edges.
    pub fn config(&self) -> Result<Value> {
        let s = self.read()?;
        let mut nodes = ContextMap::new();
        for id in &s.order {
            if let Some(node) = s.nodes.get(id) {
                nodes.insert(id.clone(), node.describe());
            }
        }
        let conditional: BTreeMap<&String, &BTreeMap<String, String>> = s
            .conditional
            .iter()
            .map(|(k, c)| (k, &c.branches))
            .collect();
        Ok(json!({
            "name": self.name,
            "description": self.description,
            "nodes": nodes,
            "edges": s.edges,
            "conditional_edges": conditional,
            "metadata": {
                "node_count": s.nodes.len(),
                "edge_count": s.edges.len(),
                "conditional_edge_count": s.conditional.len(),
            },
        }))
    }

    /// Pretty JSON of [`Graph::config`].
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.config()?)?)
    }

    /// Human-readable outline of the graph.
    pub fn visualize(&self) -> Result<String> {
        let s = self.read()?;
        let mut lines = vec![format!("DAG: {}", self.name)];
        if let Some(desc) = &self.description {
            lines.push(format!("Description: {desc}"));
        }

        lines.push("\nNodes:".to_string());
        for id in &s.order {
            if let Some(node) = s.nodes.get(id) {
                lines.push(format!("  - {id} ({}): {}", node.kind(), node.name()));
            }
        }

        lines.push("\nEdges:".to_string());
        for e in &s.edges {
            lines.push(format!("  - {} -> {}", e.from, e.to));
        }

        if !s.conditional.is_empty() {
            lines.push("\nConditional Edges:".to_string());
            for (source, cond) in &s.conditional {
                lines.push(format!("  - {source}:"));
                for (key, target) in &cond.branches {
                    lines.push(format!("    - {key} -> {target}"));
                }
            }
        }
        Ok(lines.join("\n"))
    }
}
