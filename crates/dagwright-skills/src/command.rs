use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use dagwright_core::error::{DagwrightError, Result};
use dagwright_core::traits::{validate_architecture, Architecture, Capability};
use dagwright_core::types::ContextMap;

use crate::manifest::CapabilityManifest;

/// A capability unit backed by a shell command.
///
/// `perform` writes the context as JSON to the command's stdin. Stdout is
/// parsed as JSON when possible and returned as a string otherwise.
pub struct CommandCapability {
    manifest: CapabilityManifest,
    dir: PathBuf,
    timeout_secs: u64,
}

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

impl CommandCapability {
    /// Fails when the manifest's architecture lacks a required section.
    pub fn new(manifest: CapabilityManifest, dir: impl Into<PathBuf>) -> Result<Self> {
        let capability = Self {
            timeout_secs: manifest.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            manifest,
            dir: dir.into(),
        };
        validate_architecture(&capability)?;
        Ok(capability)
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub fn manifest(&self) -> &CapabilityManifest {
        &self.manifest
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn command_line(&self) -> String {
        self.manifest
            .command
            .replace("$CAPABILITY_DIR", &self.dir.display().to_string())
    }
}

impl Capability for CommandCapability {
    fn domain(&self) -> &str {
        &self.manifest.domain
    }

    fn description(&self) -> &str {
        &self.manifest.description
    }

    fn architecture(&self) -> &Architecture {
        &self.manifest.architecture
    }

    fn delegation_keywords(&self) -> &[String] {
        &self.manifest.delegation_keywords
    }

    fn task_patterns(&self) -> &[String] {
        &self.manifest.task_patterns
    }

    fn perform(&self, ctx: ContextMap) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let command = self.command_line();
            let domain = self.manifest.domain.clone();
            let timeout_secs = self.timeout_secs;
            let input = serde_json::to_vec(&ctx)?;

            debug!(domain = %domain, command = %command, "Running capability command");

            let run = async {
                let mut cmd = if cfg!(windows) {
                    let mut c = tokio::process::Command::new("cmd");
                    c.arg("/C").arg(&command);
                    c
                } else {
                    let mut c = tokio::process::Command::new("bash");
                    c.arg("-c").arg(&command);
                    c
                };
                let mut child = cmd
                    .current_dir(&self.dir)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true)
                    .spawn()?;

                if let Some(mut stdin) = child.stdin.take() {
                    // A command that ignores stdin may close it early.
                    stdin.write_all(&input).await.ok();
                }
                child.wait_with_output().await
            };

            let output = tokio::time::timeout(Duration::from_secs(timeout_secs), run)
                .await
                .map_err(|_| DagwrightError::CapabilityTimeout {
                    domain: domain.clone(),
                    timeout_secs,
                })?
                .map_err(|e| DagwrightError::Capability {
                    node: domain.clone(),
                    message: e.to_string(),
                })?;

            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let detail = if stderr.is_empty() { stdout } else { stderr };
                return Err(DagwrightError::Capability {
                    node: domain,
                    message: format!("exit code {}: {detail}", output.status.code().unwrap_or(-1)),
                });
            }

            Ok(serde_json::from_str(&stdout).unwrap_or(Value::String(stdout)))
        })
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(command: &str) -> CapabilityManifest {
        toml::from_str(&format!(
            r#"
domain = "echo"
command = '{command}'
timeout_secs = 5

[architecture]
task_flow = ["read"]
decision_points = []
capabilities = ["echo"]
"#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn echoes_context_as_json() {
        let cap = CommandCapability::new(manifest("cat"), std::env::temp_dir()).unwrap();
        let mut ctx = ContextMap::new();
        ctx.insert("query".into(), json!("hello"));
        let result = cap.perform(ctx).await.unwrap();
        assert_eq!(result, json!({"query": "hello"}));
    }

    #[tokio::test]
    async fn plain_output_is_a_string() {
        let cap = CommandCapability::new(manifest("echo done"), std::env::temp_dir()).unwrap();
        assert_eq!(cap.perform(ContextMap::new()).await.unwrap(), json!("done"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_capability_error() {
        let cap = CommandCapability::new(manifest("echo broken >&2; exit 42"), std::env::temp_dir())
            .unwrap();
        let err = cap.perform(ContextMap::new()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit code 42"), "{msg}");
        assert!(msg.contains("broken"), "{msg}");
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let cap = CommandCapability::new(manifest("sleep 5"), std::env::temp_dir())
            .unwrap()
            .with_timeout(1);
        let err = cap.perform(ContextMap::new()).await.unwrap_err();
        assert!(matches!(err, DagwrightError::CapabilityTimeout { timeout_secs: 1, .. }));
    }

    #[test]
    fn capability_dir_is_substituted() {
        let cap = CommandCapability::new(manifest("$CAPABILITY_DIR/run.sh"), "/opt/caps/echo").unwrap();
        assert_eq!(cap.command_line(), "/opt/caps/echo/run.sh");
    }

    #[test]
    fn missing_architecture_is_rejected() {
        let bare: CapabilityManifest = toml::from_str("domain = \"x\"\ncommand = \"cat\"").unwrap();
        let err = CommandCapability::new(bare, std::env::temp_dir()).err().unwrap();
        assert!(matches!(err, DagwrightError::Config(_)));
    }
}
