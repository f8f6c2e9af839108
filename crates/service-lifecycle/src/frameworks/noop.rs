//! Identity framework for services with no language toolchain

use super::FrameworkService;
use crate::{OperationContext, Result};
use async_trait::async_trait;
use deploy_model::{
    Artifact, ArtifactKind, BuildResult, FrameworkRequirements, PackageRequirements,
    PackageResult, ProgressSink, ProjectConfig, RestoreResult, ServiceConfig, ServiceContext,
    ToolRef,
};

/// Framework that performs no toolchain work
#[derive(Debug, Default)]
pub struct NoneFramework;

impl NoneFramework {
    /// Create the identity framework
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FrameworkService for NoneFramework {
    fn requirements(&self) -> FrameworkRequirements {
        FrameworkRequirements {
            package: PackageRequirements {
                require_restore: false,
                require_build: false,
                skip_package: false,
            },
        }
    }

    fn required_tools(&self, _project: &ProjectConfig, _config: &ServiceConfig) -> Vec<ToolRef> {
        Vec::new()
    }

    async fn initialize(
        &self,
        _ctx: &OperationContext,
        _project: &ProjectConfig,
        _config: &ServiceConfig,
    ) -> Result<()> {
        Ok(())
    }

    async fn restore(
        &self,
        _ctx: &OperationContext,
        _project: &ProjectConfig,
        _config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        _progress: &ProgressSink,
    ) -> Result<RestoreResult> {
        Ok(RestoreResult::default())
    }

    async fn build(
        &self,
        _ctx: &OperationContext,
        _project: &ProjectConfig,
        _config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        _progress: &ProgressSink,
    ) -> Result<BuildResult> {
        Ok(BuildResult::default())
    }

    async fn package(
        &self,
        _ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        _progress: &ProgressSink,
    ) -> Result<PackageResult> {
        let service_dir = project.service_path(config);
        Ok(PackageResult {
            artifacts: Artifact::local(ArtifactKind::Directory, service_dir.to_string_lossy())?
                .into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deploy_model::{ServiceHost, ServiceLanguage, progress_channel};
    use std::sync::Arc;
    use toolchain_exec::CancelToken;
    use toolchain_exec::testing::RecordingRunner;

    #[smol_potat::test]
    async fn test_package_emits_the_service_path() {
        let mut project = ProjectConfig::new("store", "/work/store");
        project.add_service(ServiceConfig::new(
            "proxy",
            "src/proxy",
            ServiceLanguage::None,
            ServiceHost::ContainerApp,
        ));
        let config = project.services["proxy"].clone();

        let ctx = OperationContext::new(
            Arc::new(RecordingRunner::new()),
            crate::EnvironmentManager::ephemeral("dev"),
            CancelToken::none(),
        );
        let (progress, _rx) = progress_channel();
        let framework = NoneFramework::new();

        let restored = framework
            .restore(&ctx, &project, &config, &ServiceContext::new(), &progress)
            .await
            .unwrap();
        assert!(restored.artifacts.is_empty());

        let packaged = framework
            .package(&ctx, &project, &config, &ServiceContext::new(), &progress)
            .await
            .unwrap();
        assert_eq!(
            packaged.artifacts.primary_location(),
            Some("/work/store/src/proxy")
        );
    }
}
