use std::io::Write;

use dagwright_core::config::AppConfig;
use dagwright_core::prompt::PromptSelector;
use dagwright_core::version::UpgradePolicy;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
max_steps = 12
result_preview_chars = 80
message_tail = 3
versioned = true

[dag]
name = "talos"
version = "2.1.0"
description = "Protocol steward graph"
prompt_names = ["main_agent_prompt"]
top_k = 3
default_policy = "exact"

[capabilities]
dir = "/opt/dagwright/capabilities"
default_timeout_secs = 10

[routing.rules]
sentiment = "twitter_sentiment_skill"

[[prompts]]
name = "main_agent_prompt"
template = "You steward {protocol}."
input_variables = ["protocol"]

[prompt_selection.selector]
mode = "conditional"
default_prompt = "main_agent_prompt"

[[prompt_selection.selector.conditions]]
key = "is_voting"
prompt = "voting_prompt"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.max_steps, 12);
    assert_eq!(config.engine.message_tail, 3);
    assert_eq!(config.dag.name, "talos");
    assert_eq!(config.dag.version, "2.1.0");
    assert_eq!(config.dag.default_policy, UpgradePolicy::Exact);
    assert_eq!(config.capabilities.default_timeout_secs, Some(10));
    assert_eq!(
        config.routing.rules.get("sentiment").map(String::as_str),
        Some("twitter_sentiment_skill")
    );
    assert_eq!(config.prompts.len(), 1);
    assert_eq!(config.prompts[0].input_variables, vec!["protocol"]);

    let selection = config.prompt_selection();
    assert!(matches!(selection.selector, PromptSelector::Conditional { .. }));
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("DAGWRIGHT_TEST_DAG_NAME", "from-env");

    let toml_content = r#"
[dag]
name = "${DAGWRIGHT_TEST_DAG_NAME}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.dag.name, "from-env");

    std::env::remove_var("DAGWRIGHT_TEST_DAG_NAME");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"").expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.engine.max_steps, 64);
    assert!(config.engine.versioned);
    assert_eq!(config.dag.version, "1.0.0");
    assert_eq!(config.dag.default_policy, UpgradePolicy::Compatible);
    assert_eq!(
        config.prompt_selection().prompt_names(&Default::default()),
        vec!["main_agent_prompt", "general_agent_prompt"]
    );
}

#[test]
fn test_missing_file_is_not_found() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/dagwright.toml")).unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_invalid_policy_is_rejected() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[dag]\ndefault_policy = \"sometimes\"\n")
        .expect("write toml");
    assert!(AppConfig::load(tmp.path()).is_err());
}
