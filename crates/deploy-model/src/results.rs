//! Heterogeneous phase result records

use crate::{ArtifactCollection, Phase};
use serde::{Deserialize, Serialize};

/// Result of the restore phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoreResult {
    /// Artifacts contributed by restore
    pub artifacts: ArtifactCollection,
}

/// Result of the build phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildResult {
    /// Artifacts contributed by build
    pub artifacts: ArtifactCollection,
}

/// Result of the package phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageResult {
    /// Artifacts contributed by package
    pub artifacts: ArtifactCollection,
}

/// Result of the publish phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishResult {
    /// Artifacts contributed by publish
    pub artifacts: ArtifactCollection,
}

/// Result of the deploy phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployResult {
    /// Artifacts contributed by deploy (resource + one endpoint per URL)
    pub artifacts: ArtifactCollection,
    /// Resource id of the deployed target
    pub target_resource_id: String,
    /// Host kind string of the target
    pub kind: String,
    /// Discovered endpoint URLs, in discovery order
    pub endpoints: Vec<String>,
    /// Provider-specific detail payload, if any
    pub details: Option<serde_json::Value>,
}

/// A phase result of any phase, as stored in the operation cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PhaseResult {
    /// Restore phase result
    Restore(RestoreResult),
    /// Build phase result
    Build(BuildResult),
    /// Package phase result
    Package(PackageResult),
    /// Publish phase result
    Publish(PublishResult),
    /// Deploy phase result
    Deploy(DeployResult),
}

impl PhaseResult {
    /// The phase this result belongs to
    pub fn phase(&self) -> Phase {
        match self {
            PhaseResult::Restore(_) => Phase::Restore,
            PhaseResult::Build(_) => Phase::Build,
            PhaseResult::Package(_) => Phase::Package,
            PhaseResult::Publish(_) => Phase::Publish,
            PhaseResult::Deploy(_) => Phase::Deploy,
        }
    }

    /// The artifacts carried by this result
    pub fn artifacts(&self) -> &ArtifactCollection {
        match self {
            PhaseResult::Restore(r) => &r.artifacts,
            PhaseResult::Build(r) => &r.artifacts,
            PhaseResult::Package(r) => &r.artifacts,
            PhaseResult::Publish(r) => &r.artifacts,
            PhaseResult::Deploy(r) => &r.artifacts,
        }
    }
}

/// What a framework needs from earlier phases before `package` can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRequirements {
    /// Whether restore must have run before packaging
    pub require_restore: bool,
    /// Whether build must have run before packaging
    pub require_build: bool,
    /// Whether the framework opts out of package entirely (target handles it)
    pub skip_package: bool,
}

impl Default for PackageRequirements {
    fn default() -> Self {
        Self {
            require_restore: true,
            require_build: true,
            skip_package: false,
        }
    }
}

/// Framework capability report consumed by the Service Manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkRequirements {
    /// Requirements for the package phase
    pub package: PackageRequirements,
}

/// Reference to an external tool a plug-in needs on the PATH
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRef {
    /// Binary name looked up on the PATH
    pub name: String,
    /// Human-readable tool name
    pub display_name: String,
    /// Where to get the tool, if known
    pub install_hint: Option<String>,
}

impl ToolRef {
    /// Create a tool reference
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            install_hint: None,
        }
    }

    /// Attach an install hint
    pub fn with_install_hint(mut self, hint: impl Into<String>) -> Self {
        self.install_hint = Some(hint.into());
        self
    }
}

/// Union tool requirements, deduplicated by binary name, order preserved
pub fn dedupe_tools(tools: impl IntoIterator<Item = ToolRef>) -> Vec<ToolRef> {
    let mut seen = std::collections::HashSet::new();
    tools
        .into_iter()
        .filter(|tool| seen.insert(tool.name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_tools_by_name() {
        let tools = dedupe_tools([
            ToolRef::new("docker", "Docker"),
            ToolRef::new("kubectl", "Kubectl"),
            ToolRef::new("docker", "Docker CLI"),
        ]);

        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "docker");
        assert_eq!(tools[0].display_name, "Docker");
        assert_eq!(tools[1].name, "kubectl");
    }

    #[test]
    fn test_phase_result_accessors() {
        let result = PhaseResult::Build(BuildResult::default());
        assert_eq!(result.phase(), Phase::Build);
        assert!(result.artifacts().is_empty());
    }
}
