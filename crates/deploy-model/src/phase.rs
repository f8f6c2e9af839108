//! Pipeline phase identifiers

use serde::{Deserialize, Serialize};

/// One of the five pipeline phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Dependency fetch (framework)
    Restore,
    /// Compilation / artifact production (framework)
    Build,
    /// Canonical package creation (framework, then target)
    Package,
    /// Push to the host provider's intermediate store (target)
    Publish,
    /// Activation on the target resource (target)
    Deploy,
}

impl Phase {
    /// Lower-case phase name as used in event edges and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Restore => "restore",
            Phase::Build => "build",
            Phase::Package => "package",
            Phase::Publish => "publish",
            Phase::Deploy => "deploy",
        }
    }

    /// The phase executed immediately before this one, if any
    pub fn previous(&self) -> Option<Phase> {
        match self {
            Phase::Restore => None,
            Phase::Build => Some(Phase::Restore),
            Phase::Package => Some(Phase::Build),
            Phase::Publish => Some(Phase::Package),
            Phase::Deploy => Some(Phase::Publish),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
