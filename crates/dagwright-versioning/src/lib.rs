//! Versioned graphs.
//!
//! `VersionedGraphManager` builds the default topology with every capability
//! wrapped in a versioned, content-hashed node, keeps a domain → node
//! registry, and replaces nodes wholesale on upgrade or rollback. Status and
//! audit exports are canonical JSON so equal graphs export byte-identically.

pub mod audit;
pub mod manager;
pub mod registry;

pub use audit::{AuditSnapshot, NodeStatus, RejectReason, UpgradeOutcome, UpgradeValidation};
pub use manager::{VersionedGraphManager, STRUCTURED_ROUTER_ID};
pub use registry::NodeRegistry;
