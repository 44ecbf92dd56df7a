use std::collections::{BTreeMap, BTreeSet};

use dagwright_core::traits::PromptSource;
use dagwright_core::types::Prompt;

/// In-memory prompt templates keyed by name.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    prompts: BTreeMap<String, Prompt>,
}

impl PromptLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_prompts(prompts: impl IntoIterator<Item = Prompt>) -> Self {
        let mut lib = Self::new();
        for p in prompts {
            lib.insert(p);
        }
        lib
    }

    /// Insert or replace a template.
    pub fn insert(&mut self, prompt: Prompt) {
        self.prompts.insert(prompt.name.clone(), prompt);
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}

impl PromptSource for PromptLibrary {
    fn get_prompt(&self, names: &[String]) -> Option<Prompt> {
        let found: Vec<&Prompt> = names.iter().filter_map(|n| self.prompts.get(n)).collect();
        match found.as_slice() {
            [] => None,
            [single] if names.len() == 1 => Some((*single).clone()),
            many => {
                let template: String = many.iter().map(|p| p.template.as_str()).collect();
                let input_variables: BTreeSet<&String> =
                    many.iter().flat_map(|p| p.input_variables.iter()).collect();
                Some(Prompt {
                    name: "concatenated_prompt".to_string(),
                    template,
                    input_variables: input_variables.into_iter().cloned().collect(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lib() -> PromptLibrary {
        PromptLibrary::from_prompts([
            Prompt {
                name: "a".into(),
                template: "A{x}".into(),
                input_variables: vec!["x".into()],
            },
            Prompt {
                name: "b".into(),
                template: "B{y}{x}".into(),
                input_variables: vec!["y".into(), "x".into()],
            },
        ])
    }

    #[test]
    fn single_name_returns_prompt() {
        let p = lib().get_prompt(&["a".into()]).unwrap();
        assert_eq!(p.name, "a");
    }

    #[test]
    fn several_names_concatenate_and_skip_unknown() {
        let p = lib()
            .get_prompt(&["b".into(), "missing".into(), "a".into()])
            .unwrap();
        assert_eq!(p.name, "concatenated_prompt");
        assert_eq!(p.template, "B{y}{x}A{x}");
        assert_eq!(p.input_variables, vec!["x", "y"]);
    }

    #[test]
    fn nothing_found() {
        assert!(lib().get_prompt(&["zzz".into()]).is_none());
        assert!(lib().get_prompt(&[]).is_none());
    }
}
