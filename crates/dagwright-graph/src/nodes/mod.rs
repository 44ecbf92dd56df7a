//! Node variants.

mod capability;
mod data_source;
mod prompt;
mod router;
mod structured;

pub use capability::CapabilityNode;
pub use data_source::DataSourceNode;
pub use prompt::PromptNode;
pub use router::{DelegationRuleSet, RouterNode, StructuredRouterNode};
pub use structured::{StructuredSupportAgentNode, VersionedNode};
