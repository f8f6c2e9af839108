//! Container-publish wrapper around the dotnet framework
//!
//! Reuses the dotnet framework for restore and build, but packages through
//! the SDK's container publish target so the package carries a local
//! container image alongside the service source folder.

use super::{FrameworkService, InnerSlot, require_inner};
use crate::{OperationContext, Result};
use async_trait::async_trait;
use deploy_model::{
    Artifact, ArtifactKind, BuildResult, FrameworkRequirements, PackageResult, ProgressSink,
    ProjectConfig, RestoreResult, ServiceConfig, ServiceContext, ToolRef,
};
use toolchain_exec::ToolCommand;
use tracing::info;

/// Composite framework publishing dotnet services as container images.
///
/// Two-phase construction: the registry creates the wrapper with an empty
/// inner slot and must inject the dotnet framework before any phase runs.
pub struct DotnetContainerFramework {
    inner: InnerSlot,
}

impl DotnetContainerFramework {
    /// Create the wrapper; the inner framework is injected by the registry
    pub fn new(inner: InnerSlot) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl FrameworkService for DotnetContainerFramework {
    fn requirements(&self) -> FrameworkRequirements {
        require_inner(&self.inner).requirements()
    }

    fn required_tools(&self, project: &ProjectConfig, config: &ServiceConfig) -> Vec<ToolRef> {
        let mut tools = require_inner(&self.inner).required_tools(project, config);
        tools.push(
            ToolRef::new("docker", "Docker").with_install_hint("https://docs.docker.com/engine/"),
        );
        tools
    }

    async fn initialize(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
    ) -> Result<()> {
        require_inner(&self.inner)
            .initialize(ctx, project, config)
            .await
    }

    async fn restore(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
        service_ctx: &ServiceContext,
        progress: &ProgressSink,
    ) -> Result<RestoreResult> {
        require_inner(&self.inner)
            .restore(ctx, project, config, service_ctx, progress)
            .await
    }

    async fn build(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
        service_ctx: &ServiceContext,
        progress: &ProgressSink,
    ) -> Result<BuildResult> {
        require_inner(&self.inner)
            .build(ctx, project, config, service_ctx, progress)
            .await
    }

    async fn package(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        progress: &ProgressSink,
    ) -> Result<PackageResult> {
        let service_dir = project.service_path(config);
        let repository = format!("{}/{}", project.name, config.name);
        let tag = chrono::Utc::now().timestamp().to_string();

        info!(
            "Publishing container image {}:{} for service '{}'",
            repository, tag, config.name
        );

        let mut cmd = ToolCommand::new("dotnet");
        cmd.arg("publish")
            .args(["--configuration", "Release", "/t:PublishContainer"])
            .arg(format!("-p:ContainerRepository={}", repository))
            .arg(format!("-p:ContainerImageTag={}", tag))
            .current_dir(&service_dir);
        ctx.run_streaming(cmd, progress).await?;

        // The package path stays a local source folder; the image rides
        // alongside it for container targets to push.
        let mut result = PackageResult::default();
        result.artifacts.push(Artifact::local(
            ArtifactKind::ContainerImage,
            format!("{}:{}", repository, tag),
        )?);
        result.artifacts.push(Artifact::local(
            ArtifactKind::Directory,
            service_dir.to_string_lossy(),
        )?);
        Ok(result)
    }
}
