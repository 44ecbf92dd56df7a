use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{DagwrightError, Result};

/// Semantic version of a graph node.
///
/// Ordering is lexicographic on `(major, minor, patch)`. Serialized as the
/// `major.minor.patch` string so it round-trips through audit exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl NodeVersion {
    pub const INITIAL: NodeVersion = NodeVersion::new(1, 0, 0);

    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    /// Same major component.
    pub fn compatible(&self, other: &NodeVersion) -> bool {
        self.major == other.major
    }

    /// Strict semver precedence.
    pub fn newer_than(&self, other: &NodeVersion) -> bool {
        self.cmp(other) == Ordering::Greater
    }
}

impl Default for NodeVersion {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for NodeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for NodeVersion {
    type Err = DagwrightError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(DagwrightError::InvalidVersion(s.to_string()));
        }
        let parse = |p: &str| {
            p.parse::<u64>()
                .map_err(|_| DagwrightError::InvalidVersion(s.to_string()))
        };
        Ok(Self::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

impl Serialize for NodeVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Rule governing which version transitions a node accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradePolicy {
    Exact,
    #[default]
    Compatible,
    Any,
}

/// Outcome of checking a transition against an [`UpgradePolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: String,
}

impl UpgradePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Compatible => "compatible",
            Self::Any => "any",
        }
    }

    pub fn can_upgrade(&self, current: &NodeVersion, target: &NodeVersion) -> bool {
        self.evaluate(current, target).allowed
    }

    pub fn evaluate(&self, current: &NodeVersion, target: &NodeVersion) -> PolicyDecision {
        let deny = |reason: String| PolicyDecision {
            allowed: false,
            reason,
        };
        match self {
            Self::Exact if target != current => deny(format!(
                "Incompatible version: policy 'exact' pins {current}, got {target}"
            )),
            Self::Compatible if !target.compatible(current) => deny(format!(
                "Incompatible version: major version {} differs from current major {}",
                target.major, current.major
            )),
            Self::Compatible if !target.newer_than(current) => deny(format!(
                "Incompatible version: {target} is not newer than {current}"
            )),
            _ => PolicyDecision {
                allowed: true,
                reason: "Compatible upgrade".to_string(),
            },
        }
    }
}

impl fmt::Display for UpgradePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpgradePolicy {
    type Err = DagwrightError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "compatible" => Ok(Self::Compatible),
            "any" => Ok(Self::Any),
            _ => Err(DagwrightError::InvalidPolicy(s.to_string())),
        }
    }
}
