use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use dagwright_core::error::Result;
use dagwright_core::types::{ContextMap, NodeKind};

use crate::nodes::{
    CapabilityNode, DataSourceNode, PromptNode, RouterNode, StructuredRouterNode,
    StructuredSupportAgentNode,
};
use crate::state::SharedState;

/// Identity shared by every node variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique within a graph.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: ContextMap,
}

impl NodeInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            metadata: ContextMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Node: a unit of work in the graph.
pub trait Node: Send + Sync + 'static {
    fn info(&self) -> &NodeInfo;

    fn kind(&self) -> NodeKind;

    /// Run against the shared state. Errors are isolated by the graph walk
    /// and recorded under this node's result slot.
    fn execute<'a>(&'a self, state: &'a mut SharedState) -> BoxFuture<'a, Result<()>>;

    /// Variant-specific configuration merged into [`Node::describe`].
    fn config(&self) -> ContextMap {
        ContextMap::new()
    }

    /// Serializable configuration of this node.
    fn describe(&self) -> Value {
        let info = self.info();
        let mut map = ContextMap::new();
        map.insert("node_id".into(), json!(info.id));
        map.insert("node_type".into(), json!(self.kind().as_str()));
        map.insert("name".into(), json!(info.name));
        map.insert("description".into(), json!(info.description));
        map.insert("metadata".into(), Value::Object(info.metadata.clone()));
        map.extend(self.config());
        Value::Object(map)
    }
}

/// Node held by a graph, tagged by variant.
///
/// Status and export code matches on the tag; `Custom` carries nodes
/// implemented outside this crate.
#[derive(Clone)]
pub enum GraphNode {
    Prompt(Arc<PromptNode>),
    Router(Arc<RouterNode>),
    DataSource(Arc<DataSourceNode>),
    Capability(Arc<CapabilityNode>),
    StructuredRouter(Arc<StructuredRouterNode>),
    StructuredAgent(Arc<StructuredSupportAgentNode>),
    Custom(Arc<dyn Node>),
}

impl GraphNode {
    pub fn as_node(&self) -> &dyn Node {
        match self {
            Self::Prompt(n) => n.as_ref(),
            Self::Router(n) => n.as_ref(),
            Self::DataSource(n) => n.as_ref(),
            Self::Capability(n) => n.as_ref(),
            Self::StructuredRouter(n) => n.as_ref(),
            Self::StructuredAgent(n) => n.as_ref(),
            Self::Custom(n) => n.as_ref(),
        }
    }

    pub fn id(&self) -> &str {
        &self.as_node().info().id
    }

    pub fn name(&self) -> &str {
        &self.as_node().info().name
    }

    pub fn kind(&self) -> NodeKind {
        self.as_node().kind()
    }

    pub fn describe(&self) -> Value {
        self.as_node().describe()
    }

    pub fn execute<'a>(&'a self, state: &'a mut SharedState) -> BoxFuture<'a, Result<()>> {
        self.as_node().execute(state)
    }

    pub fn as_structured_agent(&self) -> Option<&Arc<StructuredSupportAgentNode>> {
        match self {
            Self::StructuredAgent(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}

macro_rules! graph_node_from {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for GraphNode {
                fn from(node: $ty) -> Self {
                    GraphNode::$variant(Arc::new(node))
                }
            }
        )*
    };
}

graph_node_from! {
    PromptNode => Prompt,
    RouterNode => Router,
    DataSourceNode => DataSource,
    CapabilityNode => Capability,
    StructuredRouterNode => StructuredRouter,
    StructuredSupportAgentNode => StructuredAgent,
}

impl From<Arc<dyn Node>> for GraphNode {
    fn from(node: Arc<dyn Node>) -> Self {
        GraphNode::Custom(node)
    }
}
