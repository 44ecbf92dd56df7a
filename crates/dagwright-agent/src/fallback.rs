use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{debug, info};

use dagwright_core::error::{DagwrightError, Result};
use dagwright_core::traits::Capability;
use dagwright_core::types::ContextMap;

/// Answers a query without the graph.
pub trait DirectResponder: Send + Sync + 'static {
    fn respond<'a>(&'a self, query: &'a str, context: ContextMap) -> BoxFuture<'a, Result<String>>;
}

const KEYWORD_SCORE: f64 = 10.0;
const PATTERN_WORD_SCORE: f64 = 2.0;
const MIN_PATTERN_WORD_LEN: usize = 4;

/// How well `capability` matches `query`. Zero means no match.
pub fn match_score(capability: &dyn Capability, query: &str) -> f64 {
    let query = query.to_lowercase();
    let mut score = 0.0;

    for keyword in capability.delegation_keywords() {
        if query.contains(&keyword.to_lowercase()) {
            score += KEYWORD_SCORE;
        }
    }

    for pattern in capability.task_patterns() {
        for word in pattern.to_lowercase().split_whitespace() {
            if word.chars().count() >= MIN_PATTERN_WORD_LEN && query.contains(word) {
                score += PATTERN_WORD_SCORE;
            }
        }
    }

    score
}

/// Runs the single best-scoring capability directly, skipping routing and
/// prompt assembly.
pub struct CapabilityFallback {
    capabilities: Vec<Arc<dyn Capability>>,
}

impl CapabilityFallback {
    pub fn new(capabilities: Vec<Arc<dyn Capability>>) -> Self {
        Self { capabilities }
    }

    /// Highest-scoring capability; ties go to the one registered first.
    pub fn best_match(&self, query: &str) -> Option<&Arc<dyn Capability>> {
        let mut best: Option<(&Arc<dyn Capability>, f64)> = None;
        for cap in &self.capabilities {
            let score = match_score(cap.as_ref(), query);
            debug!(domain = %cap.domain(), score, "Fallback match score");
            if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((cap, score));
            }
        }
        best.map(|(cap, _)| cap)
    }
}

impl DirectResponder for CapabilityFallback {
    fn respond<'a>(&'a self, query: &'a str, context: ContextMap) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let cap = self.best_match(query).ok_or_else(|| {
                DagwrightError::DomainNotFound(format!("no capability matches '{query}'"))
            })?;
            info!(domain = %cap.domain(), "Answering directly");

            let mut context = context;
            context.entry("query").or_insert_with(|| json!(query));
            let enriched = cap.analyze(query, context).await?;
            let result = cap.perform(enriched).await?;
            Ok(match result {
                Value::String(s) => s,
                other => other.to_string(),
            })
        })
    }
}
