use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use dagwright_core::error::Result;
use dagwright_core::hash::canonical_json;
use dagwright_core::version::{NodeVersion, UpgradePolicy};
use dagwright_graph::Edge;

/// Audit view of one versioned node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub name: String,
    pub domain: String,
    pub version: NodeVersion,
    pub node_hash: String,
    pub upgrade_policy: UpgradePolicy,
}

/// Deterministic snapshot of a versioned graph.
///
/// Contains no timestamps and no insertion-order maps, so two processes
/// building the same graph export identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSnapshot {
    pub dag_name: String,
    pub dag_version: String,
    pub total_nodes: usize,
    pub structured_nodes: BTreeMap<String, NodeStatus>,
    pub delegation_hash: String,
    pub edges: Vec<Edge>,
    pub conditional_edges: Vec<String>,
}

impl AuditSnapshot {
    /// Canonical sorted-key JSON, see [`dagwright_core::hash`].
    pub fn to_canonical_json(&self) -> Result<String> {
        canonical_json(self)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Result of a pre-flight upgrade check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeValidation {
    pub valid: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<NodeVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_version: Option<NodeVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_policy: Option<UpgradePolicy>,
}

impl UpgradeValidation {
    pub fn not_found() -> Self {
        Self {
            valid: false,
            reason: "Node not found".to_string(),
            current_version: None,
            target_version: None,
            upgrade_policy: None,
        }
    }
}

/// Why an upgrade or rollback was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    DomainNotFound { domain: String },
    PolicyViolation { message: String },
    /// The replacement capability belongs to another domain.
    DomainMismatch { expected: String, found: String },
    /// Rollback target is newer than the current version.
    NotARollback { current: NodeVersion, target: NodeVersion },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DomainNotFound { domain } => write!(f, "Node not found for domain '{domain}'"),
            Self::PolicyViolation { message } => f.write_str(message),
            Self::DomainMismatch { expected, found } => {
                write!(f, "Capability domain '{found}' does not match '{expected}'")
            }
            Self::NotARollback { current, target } => {
                write!(f, "Rollback target {target} is newer than current {current}")
            }
        }
    }
}

/// Outcome of `upgrade_node` / `rollback_node`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpgradeOutcome {
    Applied {
        node_id: String,
        from: NodeVersion,
        to: NodeVersion,
        node_hash: String,
    },
    Rejected {
        reason: RejectReason,
    },
}

impl UpgradeOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            Self::Rejected { reason } => Some(reason),
            Self::Applied { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> AuditSnapshot {
        AuditSnapshot {
            dag_name: "d".into(),
            dag_version: "1.0.0".into(),
            total_nodes: 2,
            structured_nodes: BTreeMap::from([(
                "governance_agent".to_string(),
                NodeStatus {
                    name: "Governance Agent".into(),
                    domain: "governance".into(),
                    version: NodeVersion::INITIAL,
                    node_hash: "0123456789abcdef".into(),
                    upgrade_policy: UpgradePolicy::Compatible,
                },
            )]),
            delegation_hash: "fedcba9876543210".into(),
            edges: vec![Edge::new("main_prompt", "structured_router")],
            conditional_edges: vec!["structured_router".into()],
        }
    }

    #[test]
    fn canonical_export_shape() {
        let json = snapshot().to_canonical_json().unwrap();
        assert!(json.starts_with(r#"{"conditional_edges": ["structured_router"], "dag_name": "d""#));
        assert!(json.contains(r#""edges": [["main_prompt", "structured_router"]]"#));
        assert!(json.contains(r#""version": "1.0.0""#));
        assert!(json.contains(r#""upgrade_policy": "compatible""#));
    }

    #[test]
    fn not_found_validation_omits_versions() {
        let json = serde_json::to_value(UpgradeValidation::not_found()).unwrap();
        assert_eq!(json, serde_json::json!({"valid": false, "reason": "Node not found"}));
    }

    #[test]
    fn reject_reason_display() {
        let r = RejectReason::NotARollback {
            current: NodeVersion::new(1, 0, 0),
            target: NodeVersion::new(1, 1, 0),
        };
        assert_eq!(r.to_string(), "Rollback target 1.1.0 is newer than current 1.0.0");
    }
}
