use serde::Deserialize;

use dagwright_core::traits::Architecture;

/// Environment a capability needs before it is loaded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Prerequisites {
    /// Binaries that must be on PATH.
    #[serde(default)]
    pub required_binaries: Vec<String>,
    #[serde(default)]
    pub required_env: Vec<String>,
    /// "linux", "macos" or "windows".
    #[serde(default)]
    pub required_os: Option<String>,
}

/// `capability.toml` describing a command-backed capability unit.
///
/// Lives at `<capabilities dir>/<name>/capability.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityManifest {
    /// Domain name; the versioned graph names the node `{domain}_agent`.
    pub domain: String,

    #[serde(default)]
    pub description: String,

    /// Shell command run by `perform`. `$CAPABILITY_DIR` is replaced with
    /// the manifest's directory. The context arrives as JSON on stdin.
    pub command: String,

    /// Falls back to `[capabilities] default_timeout_secs`, then 30s.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Must contain `task_flow`, `decision_points` and `capabilities`.
    #[serde(default)]
    pub architecture: Architecture,

    #[serde(default)]
    pub delegation_keywords: Vec<String>,

    #[serde(default)]
    pub task_patterns: Vec<String>,

    #[serde(default)]
    pub prerequisites: Prerequisites,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_manifest() {
        let toml_str = r#"
domain = "governance"
description = "Analyze DAO proposals"
command = "python3 $CAPABILITY_DIR/analyze.py"
timeout_secs = 15
delegation_keywords = ["proposal", "vote"]
task_patterns = ["Summarize governance proposals"]

[architecture]
task_flow = ["fetch", "summarize"]
decision_points = ["quorum"]
capabilities = ["proposal_summary"]

[prerequisites]
required_binaries = ["python3"]
required_env = ["SNAPSHOT_API_KEY"]
"#;
        let manifest: CapabilityManifest = toml::from_str(toml_str).unwrap();
        assert_eq!(manifest.domain, "governance");
        assert_eq!(manifest.timeout_secs, Some(15));
        assert_eq!(manifest.delegation_keywords, vec!["proposal", "vote"]);
        assert_eq!(manifest.architecture["task_flow"], vec!["fetch", "summarize"]);
        assert_eq!(manifest.prerequisites.required_binaries, vec!["python3"]);
        assert!(manifest.prerequisites.required_os.is_none());
    }

    #[test]
    fn parse_minimal_manifest() {
        let toml_str = r#"
domain = "echo"
command = "cat"
"#;
        let manifest: CapabilityManifest = toml::from_str(toml_str).unwrap();
        assert_eq!(manifest.timeout_secs, None);
        assert!(manifest.architecture.is_empty());
        assert!(manifest.description.is_empty());
    }
}
