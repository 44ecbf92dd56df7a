use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use dagwright_core::config::AppConfig;
use dagwright_core::error::Result;
use dagwright_core::event::EventBus;
use dagwright_core::traits::{Capability, DataSource};
use dagwright_core::types::{ContextMap, GraphEvent, RunId};
use dagwright_graph::{Graph, GraphComponents, GraphManager, PromptLibrary, SharedState};
use dagwright_versioning::VersionedGraphManager;

use crate::fallback::{CapabilityFallback, DirectResponder};
use crate::response::Response;

/// The graph an orchestrator drives.
pub enum Engine {
    Plain(GraphManager),
    Versioned(VersionedGraphManager),
}

impl Engine {
    pub fn graph(&self) -> Option<&Arc<Graph>> {
        match self {
            Self::Plain(m) => m.current(),
            Self::Versioned(m) => Some(m.graph()),
        }
    }

    pub fn versioned(&self) -> Option<&VersionedGraphManager> {
        match self {
            Self::Versioned(m) => Some(m),
            Self::Plain(_) => None,
        }
    }

    pub fn visualize(&self) -> Result<String> {
        match self {
            Self::Plain(m) => m.visualize(),
            Self::Versioned(m) => m.graph().visualize(),
        }
    }

    async fn execute_run(
        &self,
        run_id: &RunId,
        query: &str,
        context: ContextMap,
    ) -> Result<SharedState> {
        match self {
            Self::Plain(m) => m.execute_run(run_id, query, context).await,
            Self::Versioned(m) => m.execute_run(run_id, query, context).await,
        }
    }
}

/// Runs queries through the graph and renders the outcome.
///
/// When the graph walk itself fails the query goes to the direct
/// responder instead, and the run is counted and published as degraded.
pub struct Orchestrator {
    engine: Engine,
    fallback: Option<Arc<dyn DirectResponder>>,
    events: Arc<EventBus>,
    preview_chars: usize,
    message_tail: usize,
    degraded_runs: AtomicU64,
}

impl Orchestrator {
    pub fn new(engine: Engine, events: Arc<EventBus>) -> Self {
        Self {
            engine,
            fallback: None,
            events,
            preview_chars: 200,
            message_tail: 5,
            degraded_runs: AtomicU64::new(0),
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn DirectResponder>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Characters of each result and number of trailing messages rendered.
    pub fn with_rendering(mut self, preview_chars: usize, message_tail: usize) -> Self {
        self.preview_chars = preview_chars;
        self.message_tail = message_tail;
        self
    }

    /// Build from config, loading capabilities from `[capabilities] dir`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let capabilities = match config.capabilities_dir() {
            Some(dir) => dagwright_skills::load_capabilities(
                &dir,
                config.capabilities.default_timeout_secs,
            ),
            None => Vec::new(),
        };
        Self::with_capabilities(config, capabilities, None)
    }

    /// Build from config with the given capability units and optional
    /// data source. Every capability is also available to the fallback.
    pub fn with_capabilities(
        config: &AppConfig,
        capabilities: Vec<Arc<dyn Capability>>,
        data_source: Option<Arc<dyn DataSource>>,
    ) -> Result<Self> {
        let events = Arc::new(EventBus::new(config.engine.event_capacity));
        let prompts = Arc::new(PromptLibrary::from_prompts(config.prompts.iter().cloned()));

        let mut components = GraphComponents::new(config.dag.name.clone(), prompts)
            .with_description(config.dag.description.clone())
            .with_prompt_selection(config.prompt_selection())
            .with_max_steps(config.engine.max_steps)
            .with_events(Arc::clone(&events));
        for cap in &capabilities {
            components = components.with_skill(Arc::clone(cap));
        }
        for (keyword, target) in &config.routing.rules {
            components = components.with_routing_rule(keyword.clone(), target.clone());
        }
        if let Some(source) = data_source {
            components = components.with_data_source(source, config.dag.top_k);
        }

        let engine = if config.engine.versioned {
            Engine::Versioned(VersionedGraphManager::build(
                &components,
                config.dag.default_policy,
                config.dag.version.clone(),
            )?)
        } else {
            let mut manager = GraphManager::new();
            manager.create_default_graph(&components)?;
            Engine::Plain(manager)
        };

        info!(
            dag = %config.dag.name,
            versioned = config.engine.versioned,
            capabilities = capabilities.len(),
            "Orchestrator ready"
        );

        Ok(Self::new(engine, events)
            .with_rendering(config.engine.result_preview_chars, config.engine.message_tail)
            .with_fallback(Arc::new(CapabilityFallback::new(capabilities))))
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Runs answered by the fallback since construction.
    pub fn degraded_runs(&self) -> u64 {
        self.degraded_runs.load(Ordering::Relaxed)
    }

    pub async fn run(&self, query: &str) -> Result<Response> {
        self.run_with_context(query, ContextMap::new()).await
    }

    /// Run `query` with a caller-supplied starting context.
    ///
    /// Fails only when the graph fails and the fallback is missing or fails
    /// too.
    pub async fn run_with_context(&self, query: &str, context: ContextMap) -> Result<Response> {
        let run_id = RunId::new();
        let fallback_context = context.clone();

        let err = match self.engine.execute_run(&run_id, query, context).await {
            Ok(state) => {
                return Ok(Response::from_state(
                    run_id,
                    state,
                    self.preview_chars,
                    self.message_tail,
                ))
            }
            Err(e) => e,
        };

        self.degraded_runs.fetch_add(1, Ordering::Relaxed);
        warn!(run_id = %run_id, error = %err, "Graph execution failed, answering in degraded mode");
        self.events.publish(GraphEvent::Degraded {
            run_id: run_id.clone(),
            error: err.to_string(),
        });

        let Some(fallback) = &self.fallback else {
            error!(run_id = %run_id, error = %err, "No fallback configured");
            return Err(err);
        };
        match fallback.respond(query, fallback_context).await {
            Ok(content) => Ok(Response::degraded(run_id, content)),
            Err(fallback_err) => {
                error!(
                    run_id = %run_id,
                    graph_error = %err,
                    error = %fallback_err,
                    "Fallback failed"
                );
                Err(fallback_err)
            }
        }
    }
}
