//! Maven framework: Java services

use super::FrameworkService;
use crate::{Error, OperationContext, Result};
use async_trait::async_trait;
use deploy_model::{
    Artifact, ArtifactKind, BuildResult, FrameworkRequirements, PackageRequirements,
    PackageResult, ProgressSink, ProjectConfig, RestoreResult, ServiceConfig, ServiceContext,
    ToolRef,
};
use std::path::{Path, PathBuf};
use toolchain_exec::ToolCommand;
use tracing::debug;

/// Framework for Java services built with Maven
#[derive(Debug, Default)]
pub struct MavenFramework;

impl MavenFramework {
    /// Create the maven framework
    pub fn new() -> Self {
        Self
    }

    /// Prefer a project-local `mvnw` wrapper (service dir, then project
    /// root) over the system `mvn`
    pub fn maven_command(project: &ProjectConfig, service_dir: &Path) -> PathBuf {
        let service_wrapper = service_dir.join("mvnw");
        if service_wrapper.is_file() {
            return service_wrapper;
        }
        let root_wrapper = project.root.join("mvnw");
        if root_wrapper.is_file() {
            return root_wrapper;
        }
        PathBuf::from("mvn")
    }

    fn find_jar(target_dir: &Path) -> Result<PathBuf> {
        let mut jars = Vec::new();
        if let Ok(entries) = std::fs::read_dir(target_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("jar") {
                    jars.push(path);
                }
            }
        }
        jars.sort();
        jars.into_iter().next().ok_or_else(|| {
            Error::Package(format!("no jar produced under {}", target_dir.display()))
        })
    }
}

#[async_trait]
impl FrameworkService for MavenFramework {
    fn requirements(&self) -> FrameworkRequirements {
        FrameworkRequirements {
            package: PackageRequirements {
                require_restore: true,
                require_build: false,
                skip_package: false,
            },
        }
    }

    fn required_tools(&self, project: &ProjectConfig, config: &ServiceConfig) -> Vec<ToolRef> {
        let service_dir = project.service_path(config);
        let command = Self::maven_command(project, &service_dir);
        // A discovered wrapper needs no system install
        if command == Path::new("mvn") {
            vec![ToolRef::new("mvn", "Maven").with_install_hint("https://maven.apache.org/")]
        } else {
            Vec::new()
        }
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
        ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        progress: &ProgressSink,
    ) -> Result<RestoreResult> {
        let service_dir = project.service_path(config);
        let mut cmd = ToolCommand::new(Self::maven_command(project, &service_dir));
        cmd.arg("dependency:resolve").current_dir(&service_dir);
        ctx.run_streaming(cmd, progress).await?;

        Ok(RestoreResult::default())
    }

    async fn build(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        progress: &ProgressSink,
    ) -> Result<BuildResult> {
        let service_dir = project.service_path(config);
        let mut cmd = ToolCommand::new(Self::maven_command(project, &service_dir));
        cmd.arg("compile").current_dir(&service_dir);
        ctx.run_streaming(cmd, progress).await?;

        Ok(BuildResult {
            artifacts: Artifact::local(ArtifactKind::Directory, service_dir.to_string_lossy())?
                .into(),
        })
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
        let mut cmd = ToolCommand::new(Self::maven_command(project, &service_dir));
        cmd.args(["package", "-DskipTests"]).current_dir(&service_dir);
        ctx.run_streaming(cmd, progress).await?;

        let jar = Self::find_jar(&service_dir.join("target"))?;
        debug!("Maven produced {}", jar.display());

        Ok(PackageResult {
            artifacts: Artifact::local(ArtifactKind::Archive, jar.to_string_lossy())?.into(),
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

    fn project_with_service() -> (tempfile::TempDir, ProjectConfig) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/reports")).unwrap();

        let mut project = ProjectConfig::new("store", dir.path());
        project.add_service(ServiceConfig::new(
            "reports",
            "src/reports",
            ServiceLanguage::Java,
            ServiceHost::SpringApp,
        ));
        (dir, project)
    }

    fn ctx_with(runner: Arc<RecordingRunner>) -> OperationContext {
        OperationContext::new(
            runner,
            crate::EnvironmentManager::ephemeral("dev"),
            CancelToken::none(),
        )
    }

    #[smol_potat::test]
    async fn test_maven_pipeline_argv() {
        let (dir, project) = project_with_service();
        // A jar for the package step to discover
        let target = dir.path().join("src/reports/target");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("reports-1.0.jar"), b"jar").unwrap();

        let config = project.services["reports"].clone();
        let runner = Arc::new(RecordingRunner::new());
        let ctx = ctx_with(runner.clone());
        let (progress, _rx) = progress_channel();
        let framework = MavenFramework::new();

        framework
            .restore(&ctx, &project, &config, &ServiceContext::new(), &progress)
            .await
            .unwrap();
        framework
            .build(&ctx, &project, &config, &ServiceContext::new(), &progress)
            .await
            .unwrap();
        let packaged = framework
            .package(&ctx, &project, &config, &ServiceContext::new(), &progress)
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].program, "mvn");
        assert_eq!(calls[0].args, vec!["dependency:resolve"]);
        assert_eq!(calls[1].args, vec!["compile"]);
        assert_eq!(calls[2].args, vec!["package", "-DskipTests"]);

        let location = packaged.artifacts.primary_location().unwrap();
        assert!(location.ends_with(".jar"));
    }

    #[test]
    fn test_wrapper_is_preferred_over_system_maven() {
        let (dir, project) = project_with_service();
        let service_dir = dir.path().join("src/reports");

        assert_eq!(
            MavenFramework::maven_command(&project, &service_dir),
            PathBuf::from("mvn")
        );

        std::fs::write(dir.path().join("mvnw"), "#!/bin/sh\n").unwrap();
        assert_eq!(
            MavenFramework::maven_command(&project, &service_dir),
            dir.path().join("mvnw")
        );

        std::fs::write(service_dir.join("mvnw"), "#!/bin/sh\n").unwrap();
        assert_eq!(
            MavenFramework::maven_command(&project, &service_dir),
            service_dir.join("mvnw")
        );
    }
}
