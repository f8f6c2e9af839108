//! Docker framework: container image builds
//!
//! Used standalone when the language framework is bypassed (`language: none`
//! with a configured image) and as a composite wrapping a language framework
//! for containerised deployment.

use super::{FrameworkService, InnerSlot, require_inner};
use crate::{Error, OperationContext, Result, container::image_reference_registry};
use async_trait::async_trait;
use deploy_model::{
    Artifact, ArtifactKind, BuildResult, DockerOptions, FrameworkRequirements,
    PackageRequirements, PackageResult, ProgressSink, ProjectConfig, RestoreResult,
    ServiceConfig, ServiceContext, ToolRef, kind_eq,
};
use toolchain_exec::ToolCommand;
use tracing::info;

/// Framework that shells out to the container CLI for image builds
pub struct DockerFramework {
    inner: InnerSlot,
}

impl DockerFramework {
    /// Create the docker framework; the inner framework is injected by the
    /// registry before use
    pub fn new(inner: InnerSlot) -> Self {
        Self { inner }
    }

    fn local_tag(project: &ProjectConfig, config: &ServiceConfig) -> String {
        format!(
            "{}/{}:cloudlift-deploy-{}",
            project.name,
            config.name,
            chrono::Utc::now().timestamp()
        )
    }
}

#[async_trait]
impl FrameworkService for DockerFramework {
    fn requirements(&self) -> FrameworkRequirements {
        let inner = require_inner(&self.inner).requirements();
        FrameworkRequirements {
            package: PackageRequirements {
                require_restore: inner.package.require_restore,
                // The image build is the build step; it can never be skipped.
                require_build: true,
                skip_package: false,
            },
        }
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
        let mut artifacts = require_inner(&self.inner)
            .build(ctx, project, config, service_ctx, progress)
            .await?
            .artifacts;

        // A pre-built image with no Dockerfile: reference it, build nothing.
        if let (Some(image), None) = (&config.image, &config.docker) {
            let reference = image.resolve(ctx.resolver())?;
            let artifact = if image_reference_registry(&reference).is_some() {
                Artifact::remote(ArtifactKind::ContainerImage, reference)?
            } else {
                Artifact::local(ArtifactKind::ContainerImage, reference)?
            };
            artifacts.push(artifact);
            return Ok(BuildResult { artifacts });
        }

        let service_dir = project.service_path(config);
        let options = config.docker.clone().unwrap_or_else(DockerOptions::default);
        let resolver = ctx.resolver();

        let dockerfile = options.path.resolve(&resolver)?;
        let context_dir = options.context.resolve(&resolver)?;
        let tag = Self::local_tag(project, config);

        info!("Building image {} for service '{}'", tag, config.name);

        let mut cmd = ToolCommand::new("docker");
        cmd.arg("build")
            .args(["--file", &dockerfile])
            .args(["--tag", &tag]);
        if let Some(platform) = &options.platform {
            cmd.args(["--platform", &platform.resolve(&resolver)?]);
        }
        if let Some(target) = &options.target {
            cmd.args(["--target", &target.resolve(&resolver)?]);
        }
        for build_arg in &options.build_args {
            cmd.args(["--build-arg", &build_arg.resolve(&resolver)?]);
        }
        cmd.arg(&context_dir).current_dir(&service_dir);

        ctx.run_streaming(cmd, progress).await?;

        artifacts.push(Artifact::local(ArtifactKind::ContainerImage, tag)?);
        Ok(BuildResult { artifacts })
    }

    async fn package(
        &self,
        _ctx: &OperationContext,
        _project: &ProjectConfig,
        config: &ServiceConfig,
        service_ctx: &ServiceContext,
        _progress: &ProgressSink,
    ) -> Result<PackageResult> {
        // The build phase produced the image; package passes it through.
        let image = service_ctx
            .build
            .find_first(kind_eq(ArtifactKind::ContainerImage))
            .ok_or_else(|| {
                Error::config(format!(
                    "no container image was built for service '{}'",
                    config.name
                ))
            })?;

        Ok(PackageResult {
            artifacts: image.clone().into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frameworks::{NoneFramework, inner_slot};
    use deploy_model::{Expandable, LocationKind, ServiceHost, ServiceLanguage, progress_channel};
    use std::sync::Arc;
    use toolchain_exec::CancelToken;
    use toolchain_exec::testing::RecordingRunner;

    fn docker_with_none_inner() -> DockerFramework {
        let slot = inner_slot();
        *slot.lock().unwrap() = Some(Arc::new(NoneFramework::new()) as Arc<dyn FrameworkService>);
        DockerFramework::new(slot)
    }

    fn ctx_with(runner: Arc<RecordingRunner>) -> OperationContext {
        OperationContext::new(
            runner,
            crate::EnvironmentManager::ephemeral("dev"),
            CancelToken::none(),
        )
    }

    fn project_and_service() -> (tempfile::TempDir, ProjectConfig) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/worker")).unwrap();
        let mut project = ProjectConfig::new("store", dir.path());
        project.add_service(ServiceConfig::new(
            "worker",
            "src/worker",
            ServiceLanguage::None,
            ServiceHost::ContainerApp,
        ));
        (dir, project)
    }

    #[smol_potat::test]
    async fn test_prebuilt_image_skips_docker_build() {
        let (_dir, mut project) = project_and_service();
        let service = project.services.get_mut("worker").unwrap();
        service.image = Some(Expandable::new("myreg.io/store/worker:v1"));
        let config = project.services["worker"].clone();

        let runner = Arc::new(RecordingRunner::new());
        let ctx = ctx_with(runner.clone());
        let (progress, _rx) = progress_channel();

        let built = docker_with_none_inner()
            .build(&ctx, &project, &config, &ServiceContext::new(), &progress)
            .await
            .unwrap();

        assert_eq!(runner.call_count(), 0);
        let image = built
            .artifacts
            .find_first(kind_eq(ArtifactKind::ContainerImage))
            .unwrap();
        assert_eq!(image.location, "myreg.io/store/worker:v1");
        assert_eq!(image.location_kind, LocationKind::Remote);
    }

    #[smol_potat::test]
    async fn test_dockerfile_build_argv() {
        let (_dir, mut project) = project_and_service();
        let service = project.services.get_mut("worker").unwrap();
        service.language = ServiceLanguage::Docker;
        service.docker = Some(DockerOptions {
            platform: Some(Expandable::new("linux/amd64")),
            target: Some(Expandable::new("final")),
            build_args: vec![Expandable::new("MODE=release")],
            ..DockerOptions::default()
        });
        let config = project.services["worker"].clone();

        let runner = Arc::new(RecordingRunner::new());
        let ctx = ctx_with(runner.clone());
        let (progress, _rx) = progress_channel();

        let built = docker_with_none_inner()
            .build(&ctx, &project, &config, &ServiceContext::new(), &progress)
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "docker");
        let args = &calls[0].args;
        assert_eq!(args[0], "build");
        assert!(args.windows(2).any(|w| w == ["--file", "Dockerfile"]));
        assert!(args.windows(2).any(|w| w == ["--platform", "linux/amd64"]));
        assert!(args.windows(2).any(|w| w == ["--target", "final"]));
        assert!(args.windows(2).any(|w| w == ["--build-arg", "MODE=release"]));
        assert_eq!(args.last().unwrap(), ".");

        let image = built
            .artifacts
            .find_first(kind_eq(ArtifactKind::ContainerImage))
            .unwrap();
        assert!(image.location.starts_with("store/worker:cloudlift-deploy-"));
    }

    #[smol_potat::test]
    async fn test_package_requires_a_built_image() {
        let (_dir, project) = project_and_service();
        let config = project.services["worker"].clone();
        let runner = Arc::new(RecordingRunner::new());
        let ctx = ctx_with(runner);
        let (progress, _rx) = progress_channel();

        let err = docker_with_none_inner()
            .package(&ctx, &project, &config, &ServiceContext::new(), &progress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    #[should_panic(expected = "composite framework used before set_inner")]
    fn test_phase_before_set_inner_panics() {
        let framework = DockerFramework::new(inner_slot());
        let _ = framework.requirements();
    }
}
