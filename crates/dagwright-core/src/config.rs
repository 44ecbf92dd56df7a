use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DagwrightError, Result};
use crate::prompt::PromptSelection;
use crate::types::Prompt;
use crate::version::UpgradePolicy;

/// Top-level dagwright configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub dag: DagConfig,
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub prompts: Vec<Prompt>,
    #[serde(default)]
    pub prompt_selection: Option<PromptSelection>,
}

/// Graph walk limits and response rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Nodes visited before a walk is aborted as non-terminating.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Characters of each node result shown in rendered responses.
    #[serde(default = "default_result_preview_chars")]
    pub result_preview_chars: usize,
    /// Trailing messages shown in rendered responses.
    #[serde(default = "default_message_tail")]
    pub message_tail: usize,
    /// Build the versioned (structured) graph instead of the plain one.
    #[serde(default = "default_versioned")]
    pub versioned: bool,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            result_preview_chars: default_result_preview_chars(),
            message_tail: default_message_tail(),
            versioned: default_versioned(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_max_steps() -> usize { 64 }
fn default_result_preview_chars() -> usize { 200 }
fn default_message_tail() -> usize { 5 }
fn default_versioned() -> bool { true }
fn default_event_capacity() -> usize { 256 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagConfig {
    #[serde(default = "default_dag_name")]
    pub name: String,
    #[serde(default = "default_dag_version")]
    pub version: String,
    #[serde(default = "default_dag_description")]
    pub description: String,
    /// Prompt templates applied by the entry node when no selection rule is set.
    #[serde(default = "default_prompt_names")]
    pub prompt_names: Vec<String>,
    /// Documents fetched by the data-source node.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Policy given to freshly registered versioned nodes.
    #[serde(default)]
    pub default_policy: UpgradePolicy,
}

impl Default for DagConfig {
    fn default() -> Self {
        Self {
            name: default_dag_name(),
            version: default_dag_version(),
            description: default_dag_description(),
            prompt_names: default_prompt_names(),
            top_k: default_top_k(),
            default_policy: UpgradePolicy::default(),
        }
    }
}

fn default_dag_name() -> String { "dagwright".to_string() }
fn default_dag_version() -> String { "1.0.0".to_string() }
fn default_dag_description() -> String { "Versioned agent graph".to_string() }
fn default_prompt_names() -> Vec<String> {
    vec!["main_agent_prompt".to_string(), "general_agent_prompt".to_string()]
}
fn default_top_k() -> usize { 5 }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    /// Directory of capability manifests. Default: none loaded.
    #[serde(default)]
    pub dir: Option<String>,
    /// Kill command-backed capabilities after this many seconds unless the
    /// manifest says otherwise.
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,
}

/// Extra keyword → node id rules for the plain router. The versioned engine
/// derives delegation from its capabilities alone and ignores these.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub rules: BTreeMap<String, String>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| DagwrightError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| DagwrightError::Config(e.to_string()))?;
        config.validate()?;
        debug!(path = %path.display(), dag = %config.dag.name, "Loaded config");
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.engine.max_steps == 0 {
            return Err(DagwrightError::Config("engine.max_steps must be > 0".into()));
        }
        if self.dag.name.trim().is_empty() {
            return Err(DagwrightError::Config("dag.name must not be empty".into()));
        }
        if self.dag.version.parse::<crate::version::NodeVersion>().is_err() {
            return Err(DagwrightError::Config(format!(
                "dag.version '{}' is not major.minor.patch",
                self.dag.version
            )));
        }
        Ok(())
    }

    /// Resolve the capability directory (expand ~).
    pub fn capabilities_dir(&self) -> Option<PathBuf> {
        let dir = self.capabilities.dir.as_deref()?;
        if let Some(rest) = dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return Some(home.join(rest));
            }
        }
        Some(PathBuf::from(dir))
    }

    /// Selection rule for the prompt node: the configured one, or the static
    /// `dag.prompt_names` list.
    pub fn prompt_selection(&self) -> PromptSelection {
        self.prompt_selection
            .clone()
            .unwrap_or_else(|| PromptSelection::fixed(self.dag.prompt_names.clone()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Unset variables stay literal
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptSelector;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_DAGWRIGHT_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_DAGWRIGHT_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_DAGWRIGHT_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_DAGWRIGHT_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_DAGWRIGHT_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.max_steps, 64);
        assert_eq!(config.engine.result_preview_chars, 200);
        assert_eq!(config.engine.message_tail, 5);
        assert!(config.engine.versioned);
        assert_eq!(config.dag.version, "1.0.0");
        assert_eq!(config.dag.top_k, 5);
        assert_eq!(config.dag.default_policy, UpgradePolicy::Compatible);
        assert_eq!(
            config.dag.prompt_names,
            vec!["main_agent_prompt", "general_agent_prompt"]
        );
        assert!(config.capabilities_dir().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_prompt_selection_falls_back_to_names() {
        let config: AppConfig = toml::from_str(
            r#"
[dag]
prompt_names = ["only"]
"#,
        )
        .unwrap();
        match config.prompt_selection().selector {
            PromptSelector::Static { prompt_names } => assert_eq!(prompt_names, vec!["only"]),
            other => panic!("unexpected selector: {other:?}"),
        }
    }

    #[test]
    fn test_full_config() {
        let toml_str = r#"
[engine]
max_steps = 10
versioned = false

[dag]
name = "talon"
default_policy = "exact"

[routing.rules]
"deploy" = "deploy_service"

[[prompts]]
name = "main_agent_prompt"
template = "You are {role}."
input_variables = ["role"]

[prompt_selection]
selector = { mode = "static", prompt_names = ["main_agent_prompt"] }
variables = { role = "an auditor" }
transformations = { role = "uppercase" }
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.max_steps, 10);
        assert!(!config.engine.versioned);
        assert_eq!(config.dag.default_policy, UpgradePolicy::Exact);
        assert_eq!(config.routing.rules["deploy"], "deploy_service");
        assert_eq!(config.prompts[0].input_variables, vec!["role"]);
        assert!(config.prompt_selection.is_some());
    }

    #[test]
    fn test_validate_rejects_zero_steps() {
        let mut config = AppConfig::default();
        config.engine.max_steps = 0;
        assert!(matches!(config.validate(), Err(DagwrightError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_dag_version() {
        let mut config = AppConfig::default();
        config.dag.version = "one".into();
        assert!(config.validate().is_err());
    }
}
