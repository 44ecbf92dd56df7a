//! Drop-in capability units.
//!
//! Each subdirectory of the capabilities directory holding a
//! `capability.toml` becomes a [`CommandCapability`].

pub mod command;
pub mod manifest;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use dagwright_core::error::{DagwrightError, Result};
use dagwright_core::traits::Capability;

pub use command::CommandCapability;
pub use manifest::{CapabilityManifest, Prerequisites};

pub const MANIFEST_FILE: &str = "capability.toml";

/// Load one capability from `dir/capability.toml`.
pub fn load_capability(dir: &Path) -> Result<CommandCapability> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let content = std::fs::read_to_string(&manifest_path)?;
    let manifest: CapabilityManifest = toml::from_str(&content).map_err(|e| {
        DagwrightError::Config(format!("{}: {e}", manifest_path.display()))
    })?;
    check_prerequisites(&manifest.prerequisites).map_err(|reason| {
        DagwrightError::Config(format!("capability '{}': {reason}", manifest.domain))
    })?;
    CommandCapability::new(manifest, dir)
}

/// Load every capability under `dir`, sorted by domain.
///
/// Unreadable, malformed or unsatisfiable manifests are skipped with a
/// warning. A missing directory yields an empty list.
pub fn load_capabilities(dir: &Path, default_timeout_secs: Option<u64>) -> Vec<Arc<dyn Capability>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            debug!(path = %dir.display(), error = %e, "Cannot read capabilities directory");
            return Vec::new();
        }
    };

    let mut loaded: Vec<CommandCapability> = Vec::new();
    for entry in entries.flatten() {
        let cap_dir = entry.path();
        if !cap_dir.is_dir() {
            continue;
        }
        if !cap_dir.join(MANIFEST_FILE).exists() {
            debug!(path = %cap_dir.display(), "No capability.toml, skipping");
            continue;
        }
        match load_capability(&cap_dir) {
            Ok(cap) => {
                let cap = match (cap.manifest().timeout_secs, default_timeout_secs) {
                    (None, Some(secs)) => cap.with_timeout(secs),
                    _ => cap,
                };
                info!(domain = %cap.domain(), path = %cap_dir.display(), "Loaded capability");
                loaded.push(cap);
            }
            Err(e) => warn!(path = %cap_dir.display(), error = %e, "Skipping capability"),
        }
    }

    loaded.sort_by(|a, b| a.domain().cmp(b.domain()));
    loaded
        .into_iter()
        .map(|c| Arc::new(c) as Arc<dyn Capability>)
        .collect()
}

fn check_prerequisites(prereqs: &Prerequisites) -> std::result::Result<(), String> {
    for bin in &prereqs.required_binaries {
        if which(bin).is_none() {
            return Err(format!("required binary '{bin}' not found on PATH"));
        }
    }

    for var in &prereqs.required_env {
        if std::env::var(var).is_err() {
            return Err(format!("required env var '{var}' is not set"));
        }
    }

    if let Some(required_os) = &prereqs.required_os {
        let current_os = std::env::consts::OS;
        let matches = match required_os.as_str() {
            "linux" => current_os == "linux",
            "macos" | "darwin" => current_os == "macos",
            "windows" => current_os == "windows",
            other => return Err(format!("unknown required_os value: '{other}'")),
        };
        if !matches {
            return Err(format!("requires OS '{required_os}', running on '{current_os}'"));
        }
    }

    Ok(())
}

fn which(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const ARCH: &str = r#"
[architecture]
task_flow = ["read"]
decision_points = ["none"]
capabilities = ["echo"]
"#;

    fn write_capability(root: &Path, name: &str, body: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE), body).unwrap();
    }

    #[test]
    fn loads_sorted_by_domain() {
        let tmp = tempfile::tempdir().unwrap();
        write_capability(tmp.path(), "b", &format!("domain = \"trading\"\ncommand = \"cat\"\n{ARCH}"));
        write_capability(tmp.path(), "a", &format!("domain = \"social\"\ncommand = \"cat\"\n{ARCH}"));

        let caps = load_capabilities(tmp.path(), Some(5));
        let domains: Vec<&str> = caps.iter().map(|c| c.domain()).collect();
        assert_eq!(domains, vec!["social", "trading"]);
    }

    #[test]
    fn skips_invalid_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        write_capability(tmp.path(), "bad", "not valid toml {{{");
        write_capability(tmp.path(), "no_arch", "domain = \"x\"\ncommand = \"cat\"");
        write_capability(tmp.path(), "ok", &format!("domain = \"ok\"\ncommand = \"cat\"\n{ARCH}"));

        let caps = load_capabilities(tmp.path(), None);
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].domain(), "ok");
    }

    #[test]
    fn skips_missing_dir() {
        assert!(load_capabilities(Path::new("/nonexistent/dagwright/caps"), None).is_empty());
    }

    #[test]
    fn skips_capability_with_missing_binary() {
        let tmp = tempfile::tempdir().unwrap();
        write_capability(
            tmp.path(),
            "needs_bin",
            &format!(
                "domain = \"x\"\ncommand = \"cat\"\n\n[prerequisites]\nrequired_binaries = [\"_dagwright_missing_bin_xyz\"]\n{ARCH}"
            ),
        );
        assert!(load_capabilities(tmp.path(), None).is_empty());

        let err = load_capability(&tmp.path().join("needs_bin")).err().unwrap();
        assert!(err.to_string().contains("_dagwright_missing_bin_xyz"));
    }

    #[test]
    fn unknown_os_is_unsatisfiable() {
        let prereqs = Prerequisites {
            required_os: Some("plan9".into()),
            ..Default::default()
        };
        assert!(check_prerequisites(&prereqs).unwrap_err().contains("plan9"));
    }
}
