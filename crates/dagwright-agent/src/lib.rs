//! Orchestration: build a graph from configuration, run queries through it,
//! and answer directly when the graph cannot.

pub mod fallback;
pub mod orchestrator;
pub mod response;

pub use fallback::{match_score, CapabilityFallback, DirectResponder};
pub use orchestrator::{Engine, Orchestrator};
pub use response::{render, Response, ResponseMode};
