use thiserror::Error;

#[derive(Debug, Error)]
pub enum DagwrightError {
    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Graph structure errors
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Graph has no nodes")]
    EmptyGraph,

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Domain not registered: {0}")]
    DomainNotFound(String),

    #[error("Graph did not terminate after {limit} steps (last node: {last_node})")]
    StepBudgetExceeded { limit: usize, last_node: String },

    // Collaborator errors
    #[error("Capability failed: {node}: {message}")]
    Capability { node: String, message: String },

    #[error("Capability timeout after {timeout_secs}s: {domain}")]
    CapabilityTimeout { domain: String, timeout_secs: u64 },

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    // Versioning errors
    #[error("Invalid version string: {0}")]
    InvalidVersion(String),

    #[error("Invalid upgrade policy: {0}")]
    InvalidPolicy(String),

    #[error("Graph lock poisoned")]
    LockPoisoned,

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DagwrightError>;
