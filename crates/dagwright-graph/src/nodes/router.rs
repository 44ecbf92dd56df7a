use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use dagwright_core::error::Result;
use dagwright_core::hash::digest16;
use dagwright_core::traits::Capability;
use dagwright_core::types::{ContextMap, NodeKind};

use crate::node::{Node, NodeInfo};
use crate::state::{SharedState, DEFAULT_BRANCH};

/// Pattern words shorter than this are not used as routing keywords.
const MIN_PATTERN_WORD_LEN: usize = 4;

/// First rule whose keyword occurs in the lowercased query.
fn first_match<'r>(
    rules: impl IntoIterator<Item = (&'r String, &'r String)>,
    query: &str,
) -> Option<(&'r str, &'r str)> {
    let query = query.to_lowercase();
    rules
        .into_iter()
        .find(|(keyword, _)| query.contains(keyword.as_str()))
        .map(|(k, t)| (k.as_str(), t.as_str()))
}

/// Plain keyword router.
///
/// Rules are matched in sorted keyword order, so the decision for a query
/// is the same on every run.
pub struct RouterNode {
    info: NodeInfo,
    rules: Vec<(String, String)>,
}

impl RouterNode {
    pub fn new(info: NodeInfo, rules: impl IntoIterator<Item = (String, String)>) -> Self {
        let sorted: BTreeMap<String, String> = rules
            .into_iter()
            .map(|(k, t)| (k.to_lowercase(), t))
            .collect();
        Self {
            info,
            rules: sorted.into_iter().collect(),
        }
    }

    /// Router matching rules in the order given rather than sorted order.
    #[deprecated(note = "routing depends on caller ordering; use `RouterNode::new`")]
    pub fn with_insertion_order(info: NodeInfo, rules: Vec<(String, String)>) -> Self {
        Self {
            info,
            rules: rules
                .into_iter()
                .map(|(k, t)| (k.to_lowercase(), t))
                .collect(),
        }
    }

    pub fn rules(&self) -> &[(String, String)] {
        &self.rules
    }

    /// Distinct routing targets, in rule order.
    pub fn targets(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for (_, target) in &self.rules {
            if !seen.contains(&target.as_str()) {
                seen.push(target.as_str());
            }
        }
        seen
    }
}

impl Node for RouterNode {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Router
    }

    fn execute<'a>(&'a self, state: &'a mut SharedState) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let target = first_match(self.rules.iter().map(|(k, t)| (k, t)), &state.current_query)
                .map(|(_, t)| t)
                .unwrap_or(DEFAULT_BRANCH)
                .to_string();
            debug!(node_id = %self.info.id, target = %target, "Routed query");
            state.set_next_node(&target);
            state.set_result(&self.info.id, json!(format!("Routed to: {target}")));
            state.push_message(
                &self.info.id,
                format!("Router {} determined next path", self.info.name),
            );
            Ok(())
        })
    }

    fn config(&self) -> ContextMap {
        let rules: Vec<Value> = self.rules.iter().map(|(k, t)| json!([k, t])).collect();
        let mut map = ContextMap::new();
        map.insert("routing_logic".into(), Value::Array(rules));
        map
    }
}

/// Sorted keyword → target node id mapping used by the structured router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DelegationRuleSet {
    rules: BTreeMap<String, String>,
}

impl DelegationRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build rules from capability units. Each unit's delegation keywords and
    /// the significant words of its task patterns route to `target(domain)`.
    /// Units are visited in the order given; a later unit claiming the same
    /// keyword wins.
    pub fn from_capabilities<'a>(
        capabilities: impl IntoIterator<Item = &'a Arc<dyn Capability>>,
        target: impl Fn(&str) -> String,
    ) -> Self {
        let mut set = Self::new();
        for cap in capabilities {
            let node_id = target(cap.domain());
            for keyword in cap.delegation_keywords() {
                set.insert(keyword, &node_id);
            }
            for pattern in cap.task_patterns() {
                for word in pattern.to_lowercase().split_whitespace() {
                    if word.chars().count() >= MIN_PATTERN_WORD_LEN {
                        set.insert(word, &node_id);
                    }
                }
            }
        }
        set
    }

    pub fn insert(&mut self, keyword: &str, target: &str) {
        let keyword = keyword.trim().to_lowercase();
        if !keyword.is_empty() {
            self.rules.insert(keyword, target.to_string());
        }
    }

    /// Insert every rule of `other`; its targets win on shared keywords.
    pub fn merge(&mut self, other: &DelegationRuleSet) {
        for (keyword, target) in other.iter() {
            self.insert(keyword, target);
        }
    }

    /// Keep only rules whose target satisfies `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.rules.retain(|_, target| keep(target.as_str()));
    }

    /// Truncated SHA-256 of the canonical JSON mapping.
    pub fn hash(&self) -> Result<String> {
        digest16(&self.rules)
    }

    /// First `(keyword, target)` whose keyword occurs in `query`.
    pub fn route(&self, query: &str) -> Option<(&str, &str)> {
        first_match(&self.rules, query)
    }

    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.rules.get(keyword).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.rules.iter()
    }

    /// Distinct targets in keyword order.
    pub fn targets(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for target in self.rules.values() {
            if !seen.contains(&target.as_str()) {
                seen.push(target.as_str());
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<(String, String)> for DelegationRuleSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (k, t) in iter {
            set.insert(&k, &t);
        }
        set
    }
}

/// Deterministic router over a [`DelegationRuleSet`].
///
/// Records each decision under `metadata["{id}_routing"]` together with the
/// delegation hash so the choice can be verified later.
pub struct StructuredRouterNode {
    info: NodeInfo,
    rules: DelegationRuleSet,
    delegation_hash: String,
}

impl StructuredRouterNode {
    pub fn new(info: NodeInfo, rules: DelegationRuleSet) -> Result<Self> {
        let delegation_hash = rules.hash()?;
        Ok(Self {
            info,
            rules,
            delegation_hash,
        })
    }

    pub fn rules(&self) -> &DelegationRuleSet {
        &self.rules
    }

    pub fn delegation_hash(&self) -> &str {
        &self.delegation_hash
    }
}

impl Node for StructuredRouterNode {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn kind(&self) -> NodeKind {
        NodeKind::StructuredRouter
    }

    fn execute<'a>(&'a self, state: &'a mut SharedState) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let decision = self.rules.route(&state.current_query);
            let target = decision.map(|(_, t)| t).unwrap_or(DEFAULT_BRANCH).to_string();
            debug!(
                node_id = %self.info.id,
                target = %target,
                keyword = ?decision.map(|(k, _)| k),
                "Structured routing decision"
            );

            state.set_next_node(&target);
            state.set_result(&self.info.id, json!(format!("Routed to: {target}")));
            state.metadata.insert(
                format!("{}_routing", self.info.id),
                json!({
                    "delegation_hash": self.delegation_hash,
                    "matched_keyword": decision.map(|(k, _)| k),
                    "target_node": decision.map(|(_, t)| t),
                }),
            );
            state.push_message(
                &self.info.id,
                format!("Structured router {} determined path: {target}", self.info.name),
            );
            Ok(())
        })
    }

    fn config(&self) -> ContextMap {
        let mut map = ContextMap::new();
        map.insert(
            "delegation_rules".into(),
            serde_json::to_value(&self.rules).unwrap_or_default(),
        );
        map.insert("delegation_hash".into(), json!(self.delegation_hash));
        map
    }
}
