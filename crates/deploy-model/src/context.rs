//! Accumulating artifact record for one service pipeline

use crate::{ArtifactCollection, Phase};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Artifacts accumulated over one service pipeline run.
///
/// Created when the pipeline starts, appended only with the result of each
/// successfully completed phase, and discarded when the pipeline ends. The
/// collection for phase *p* is populated iff *p* has completed successfully.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceContext {
    /// Artifacts produced by the restore phase
    pub restore: ArtifactCollection,
    /// Artifacts produced by the build phase
    pub build: ArtifactCollection,
    /// Artifacts produced by the package phase
    pub package: ArtifactCollection,
    /// Artifacts produced by the publish phase
    pub publish: ArtifactCollection,
    /// Artifacts produced by the deploy phase
    pub deploy: ArtifactCollection,
    /// Free-form plug-in carry-through values
    #[serde(default)]
    pub extras: HashMap<String, String>,
}

impl ServiceContext {
    /// Create an empty context for a fresh pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// The collection for the given phase
    pub fn collection(&self, phase: Phase) -> &ArtifactCollection {
        match phase {
            Phase::Restore => &self.restore,
            Phase::Build => &self.build,
            Phase::Package => &self.package,
            Phase::Publish => &self.publish,
            Phase::Deploy => &self.deploy,
        }
    }

    /// Record the artifacts of a successfully completed phase.
    ///
    /// Replaces the phase's collection so that re-running a phase through the
    /// cache leaves the context identical instead of duplicating artifacts.
    pub fn record(&mut self, phase: Phase, artifacts: &ArtifactCollection) {
        let collection = match phase {
            Phase::Restore => &mut self.restore,
            Phase::Build => &mut self.build,
            Phase::Package => &mut self.package,
            Phase::Publish => &mut self.publish,
            Phase::Deploy => &mut self.deploy,
        };
        *collection = artifacts.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Artifact, ArtifactKind};

    #[test]
    fn test_record_populates_only_the_given_phase() {
        let mut ctx = ServiceContext::new();
        let artifacts: ArtifactCollection =
            Artifact::local(ArtifactKind::Directory, "/tmp/build-out")
                .unwrap()
                .into();

        ctx.record(Phase::Build, &artifacts);

        assert_eq!(ctx.collection(Phase::Build).len(), 1);
        assert!(ctx.collection(Phase::Restore).is_empty());
        assert!(ctx.collection(Phase::Package).is_empty());
    }
}
