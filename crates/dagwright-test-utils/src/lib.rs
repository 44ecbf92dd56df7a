//! Mocks and fixtures shared by dagwright tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tokio::sync::Notify;

use dagwright_core::error::{DagwrightError, Result};
use dagwright_core::traits::{Architecture, Capability, DataSource};
use dagwright_core::types::{ContextMap, Document};

/// Architecture with the three required sections, each holding one entry
/// derived from `domain`.
pub fn architecture(domain: &str) -> Architecture {
    Architecture::from([
        ("task_flow".to_string(), vec![format!("{domain}:analyze"), format!("{domain}:act")]),
        ("decision_points".to_string(), vec![format!("{domain}:confidence")]),
        ("capabilities".to_string(), vec![format!("{domain}:core")]),
    ])
}

/// Holds a capability inside `perform` until the test releases it.
#[derive(Default)]
pub struct Gate {
    /// Signalled once `perform` has started.
    pub entered: Notify,
    /// Signal to let `perform` finish.
    pub release: Notify,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

/// Capability double. `analyze` stamps the query into the context,
/// `perform` echoes it back, and both count their calls.
pub struct MockCapability {
    domain: String,
    description: String,
    architecture: Architecture,
    keywords: Vec<String>,
    patterns: Vec<String>,
    fail_with: Option<String>,
    gate: Option<Arc<Gate>>,
    pub analyze_calls: AtomicUsize,
    pub perform_calls: AtomicUsize,
}

impl MockCapability {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            description: format!("{domain} support"),
            architecture: architecture(domain),
            keywords: Vec::new(),
            patterns: Vec::new(),
            fail_with: None,
            gate: None,
            analyze_calls: AtomicUsize::new(0),
            perform_calls: AtomicUsize::new(0),
        }
    }

    pub fn keywords(mut self, kws: &[&str]) -> Self {
        self.keywords = kws.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn patterns(mut self, patterns: &[&str]) -> Self {
        self.patterns = patterns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn architecture_entry(mut self, section: &str, entries: &[&str]) -> Self {
        self.architecture.insert(
            section.to_string(),
            entries.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn without_section(mut self, section: &str) -> Self {
        self.architecture.remove(section);
        self
    }

    /// Make `perform` fail with `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    /// Park every `perform` call on `gate`.
    pub fn gated(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn shared(self) -> Arc<dyn Capability> {
        Arc::new(self)
    }
}

impl Capability for MockCapability {
    fn domain(&self) -> &str {
        &self.domain
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    fn delegation_keywords(&self) -> &[String] {
        &self.keywords
    }

    fn task_patterns(&self) -> &[String] {
        &self.patterns
    }

    fn analyze<'a>(&'a self, query: &'a str, mut ctx: ContextMap) -> BoxFuture<'a, Result<ContextMap>> {
        Box::pin(async move {
            self.analyze_calls.fetch_add(1, Ordering::SeqCst);
            ctx.insert("query".into(), json!(query));
            ctx.insert("analyzed_by".into(), json!(self.domain));
            Ok(ctx)
        })
    }

    fn perform(&self, ctx: ContextMap) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            self.perform_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
            if let Some(message) = &self.fail_with {
                return Err(DagwrightError::Capability {
                    node: self.domain.clone(),
                    message: message.clone(),
                });
            }
            let query = ctx.get("query").and_then(Value::as_str).unwrap_or("");
            Ok(json!(format!("{} handled: {}", self.domain, query)))
        })
    }
}

/// Data source returning a fixed document list.
pub struct MockDataSource {
    docs: Vec<Document>,
    fail: bool,
}

impl MockDataSource {
    pub fn new(contents: &[&str]) -> Self {
        Self {
            docs: contents.iter().map(|c| Document::new(*c)).collect(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            docs: Vec::new(),
            fail: true,
        }
    }
}

impl DataSource for MockDataSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn search<'a>(&'a self, _query: &'a str, k: usize) -> BoxFuture<'a, Result<Vec<Document>>> {
        Box::pin(async move {
            if self.fail {
                return Err(DagwrightError::DataSource("index offline".into()));
            }
            Ok(self.docs.iter().take(k).cloned().collect())
        })
    }
}

/// Governance capability keyed on "proposal" and "vote".
pub fn governance() -> MockCapability {
    MockCapability::new("governance").keywords(&["proposal", "vote"])
}

/// Analytics capability keyed on "data" and "report".
pub fn analytics() -> MockCapability {
    MockCapability::new("analytics").keywords(&["data", "report"])
}
