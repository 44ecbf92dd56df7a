use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tracing::debug;

use dagwright_core::error::Result;
use dagwright_core::traits::DataSource;
use dagwright_core::types::{ContextMap, NodeKind};

use crate::node::{Node, NodeInfo};
use crate::state::SharedState;

/// Context key holding documents found for the query.
pub const RELEVANT_DOCUMENTS_KEY: &str = "relevant_documents";

/// Looks up documents for the query in an external data source.
pub struct DataSourceNode {
    info: NodeInfo,
    source: Arc<dyn DataSource>,
    top_k: usize,
}

impl DataSourceNode {
    pub fn new(info: NodeInfo, source: Arc<dyn DataSource>, top_k: usize) -> Self {
        Self { info, source, top_k }
    }
}

impl Node for DataSourceNode {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn kind(&self) -> NodeKind {
        NodeKind::DataSource
    }

    fn execute<'a>(&'a self, state: &'a mut SharedState) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut docs = self.source.search(&state.current_query, self.top_k).await?;
            debug!(node_id = %self.info.id, source = %self.source.name(), found = docs.len(), "Data source searched");
            docs.truncate(self.top_k);
            let docs = serde_json::to_value(docs)?;
            state.context.insert(RELEVANT_DOCUMENTS_KEY.into(), docs.clone());
            state.set_result(&self.info.id, docs);
            state.push_message(
                &self.info.id,
                format!("Data source {} provided data", self.info.name),
            );
            Ok(())
        })
    }

    fn config(&self) -> ContextMap {
        let mut map = ContextMap::new();
        map.insert("data_source".into(), json!(self.source.name()));
        map.insert("top_k".into(), json!(self.top_k));
        map
    }
}
