use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::edge::{ConditionalEdge, Edge};
use crate::node::GraphNode;
use crate::state::SharedState;

/// Outgoing transition of a node in a compiled plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Unconditional move to the given node.
    Next(String),
    /// Pick a branch by the state's `next_node`; no match ends the walk.
    Branch(BTreeMap<String, String>),
    End,
}

/// Immutable, executable snapshot of a graph's structure.
///
/// Edges that reference missing nodes are dropped at compile time. A node
/// with conditional edges branches on them and ignores its plain edges;
/// otherwise it follows its first plain edge.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    entry: Option<String>,
    nodes: HashMap<String, GraphNode>,
    transitions: HashMap<String, Transition>,
}

impl ExecutionPlan {
    pub fn compile(
        order: &[String],
        nodes: &HashMap<String, GraphNode>,
        edges: &[Edge],
        conditional: &BTreeMap<String, ConditionalEdge>,
    ) -> Self {
        let mut transitions = HashMap::with_capacity(nodes.len());

        for id in order {
            let transition = match conditional.get(id) {
                Some(cond) => Transition::Branch(
                    cond.branches
                        .iter()
                        .filter(|(_, to)| nodes.contains_key(*to))
                        .map(|(k, to)| (k.clone(), to.clone()))
                        .collect(),
                ),
                None => {
                    let mut outgoing = edges
                        .iter()
                        .filter(|e| &e.from == id && nodes.contains_key(&e.to));
                    let first = outgoing.next();
                    if let Some(extra) = outgoing.next() {
                        warn!(
                            node_id = %id,
                            ignored = %extra.to,
                            "Node has several plain edges; only the first is followed"
                        );
                    }
                    match first {
                        Some(edge) => Transition::Next(edge.to.clone()),
                        None => Transition::End,
                    }
                }
            };
            transitions.insert(id.clone(), transition);
        }

        Self {
            entry: order.first().cloned(),
            nodes: nodes.clone(),
            transitions,
        }
    }

    /// First-added node, if the graph is not empty.
    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn transition(&self, from: &str) -> &Transition {
        self.transitions.get(from).unwrap_or(&Transition::End)
    }

    /// Node to run after `from`, given the state it left behind.
    pub fn next(&self, from: &str, state: &SharedState) -> Option<&str> {
        match self.transition(from) {
            Transition::Next(to) => Some(to),
            Transition::Branch(branches) => branches.get(state.next_node()).map(String::as_str),
            Transition::End => None,
        }
    }
}
