//! Declarative prompt selection.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::traits::PromptSource;
use crate::types::{ContextMap, Prompt};

/// A conditional selection rule: pick `prompt` when context key `key` is truthy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptCondition {
    pub key: String,
    pub prompt: String,
}

/// How prompt names are chosen for a prompt node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PromptSelector {
    /// Always the same names.
    Static { prompt_names: Vec<String> },
    /// First condition whose key is truthy in the context, else the default.
    Conditional {
        #[serde(default)]
        conditions: Vec<PromptCondition>,
        #[serde(default)]
        default_prompt: Option<String>,
    },
}

impl PromptSelector {
    pub fn select(&self, ctx: &ContextMap) -> Vec<String> {
        match self {
            Self::Static { prompt_names } => prompt_names.clone(),
            Self::Conditional {
                conditions,
                default_prompt,
            } => conditions
                .iter()
                .find(|c| ctx.get(&c.key).is_some_and(is_truthy))
                .map(|c| vec![c.prompt.clone()])
                .or_else(|| default_prompt.clone().map(|p| vec![p]))
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transformation {
    Uppercase,
    Lowercase,
}

/// Selector plus the variables substituted into the resolved template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSelection {
    pub selector: PromptSelector,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub transformations: BTreeMap<String, Transformation>,
}

impl PromptSelection {
    pub fn fixed(names: Vec<String>) -> Self {
        Self {
            selector: PromptSelector::Static { prompt_names: names },
            variables: BTreeMap::new(),
            transformations: BTreeMap::new(),
        }
    }

    pub fn prompt_names(&self, ctx: &ContextMap) -> Vec<String> {
        self.selector.select(ctx)
    }

    /// Select and resolve a prompt from `source`, filling `{name}`
    /// placeholders from the context overlaid with configured variables.
    pub fn resolve(&self, source: &dyn PromptSource, ctx: &ContextMap) -> Option<Prompt> {
        let names = self.prompt_names(ctx);
        if names.is_empty() {
            return None;
        }
        let base = source.get_prompt(&names)?;
        if self.variables.is_empty() && self.transformations.is_empty() {
            return Some(base);
        }

        let mut vars: BTreeMap<String, String> = ctx
            .iter()
            .map(|(k, v)| (k.clone(), display_value(v)))
            .collect();
        for (k, v) in &self.variables {
            vars.insert(k.clone(), display_value(v));
        }
        for (k, t) in &self.transformations {
            if let Some(v) = vars.get_mut(k) {
                *v = match t {
                    Transformation::Uppercase => v.to_uppercase(),
                    Transformation::Lowercase => v.to_lowercase(),
                };
            }
        }

        Some(Prompt {
            name: format!("configured_{}", base.name),
            template: substitute(&base.template, &vars),
            input_variables: base.input_variables,
        })
    }
}

/// Replace `{name}` placeholders; unknown placeholders are left as written.
pub fn substitute(template: &str, vars: &BTreeMap<String, String>) -> String {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").ok())
        .as_ref()
    else {
        return template.to_string();
    };
    re.replace_all(template, |caps: &Captures| match vars.get(&caps[1]) {
        Some(v) => v.clone(),
        None => caps[0].to_string(),
    })
    .into_owned()
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct OnePrompt;

    impl PromptSource for OnePrompt {
        fn get_prompt(&self, names: &[String]) -> Option<Prompt> {
            names
                .iter()
                .any(|n| n == "greeting")
                .then(|| Prompt::new("greeting", "Hello {user}, network {chain}."))
        }
    }

    fn ctx(value: serde_json::Value) -> ContextMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn conditional_picks_first_truthy_key() {
        let selector = PromptSelector::Conditional {
            conditions: vec![
                PromptCondition { key: "is_trade".into(), prompt: "trade".into() },
                PromptCondition { key: "is_vote".into(), prompt: "vote".into() },
            ],
            default_prompt: Some("general".into()),
        };
        assert_eq!(selector.select(&ctx(json!({"is_trade": false, "is_vote": 1}))), vec!["vote"]);
        assert_eq!(selector.select(&ctx(json!({}))), vec!["general"]);
    }

    #[test]
    fn conditional_without_default_selects_nothing() {
        let selector = PromptSelector::Conditional {
            conditions: vec![],
            default_prompt: None,
        };
        assert!(selector.select(&ContextMap::new()).is_empty());
    }

    #[test]
    fn resolve_applies_variables_and_transformations() {
        let mut selection = PromptSelection::fixed(vec!["greeting".into()]);
        selection.variables.insert("chain".into(), json!("Ethereum"));
        selection
            .transformations
            .insert("chain".into(), Transformation::Uppercase);

        let prompt = selection
            .resolve(&OnePrompt, &ctx(json!({"user": "ada"})))
            .unwrap();
        assert_eq!(prompt.name, "configured_greeting");
        assert_eq!(prompt.template, "Hello ada, network ETHEREUM.");
    }

    #[test]
    fn unknown_placeholders_survive() {
        let vars = BTreeMap::from([("a".to_string(), "1".to_string())]);
        assert_eq!(substitute("{a} {b}", &vars), "1 {b}");
    }

    #[test]
    fn selector_deserializes_from_toml() {
        let toml_str = r#"
mode = "conditional"
default_prompt = "general"

[[conditions]]
key = "urgent"
prompt = "triage"
"#;
        let selector: PromptSelector = toml::from_str(toml_str).unwrap();
        assert_eq!(
            selector.select(&ctx(json!({"urgent": "yes"}))),
            vec!["triage"]
        );
    }
}
