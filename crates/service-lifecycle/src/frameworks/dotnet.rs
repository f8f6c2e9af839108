//! Dotnet framework: project-file driven restore/build/publish

use super::FrameworkService;
use crate::{Error, OperationContext, Result};
use async_trait::async_trait;
use deploy_model::{
    Artifact, ArtifactKind, BuildResult, FrameworkRequirements, PackageRequirements,
    PackageResult, ProgressSink, ProjectConfig, RestoreResult, ServiceConfig, ServiceContext,
    ToolRef,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use toolchain_exec::{CancelToken, ToolCommand};
use tracing::{debug, info, warn};

/// Framework for .NET (dotnet/csharp/fsharp) services
#[derive(Debug, Default)]
pub struct DotnetFramework;

impl DotnetFramework {
    /// Create the dotnet framework
    pub fn new() -> Self {
        Self
    }

    /// Resolve the single project file for a service.
    ///
    /// Errors when the directory contains no `*proj` file, or several with
    /// no explicit `projectFile` configured.
    pub fn resolve_project_file(config: &ServiceConfig, service_dir: &Path) -> Result<PathBuf> {
        if let Some(explicit) = &config.project_file {
            return Ok(service_dir.join(explicit));
        }

        let mut candidates = Vec::new();
        for entry in std::fs::read_dir(service_dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_project = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.ends_with("proj"));
            if is_project {
                candidates.push(path);
            }
        }
        candidates.sort();

        match candidates.len() {
            0 => Err(Error::config(format!(
                "no project file found in {} for service '{}'",
                service_dir.display(),
                config.name
            ))),
            1 => Ok(candidates.remove(0)),
            _ => Err(Error::config(format!(
                "multiple project files found in {} for service '{}'; set an explicit project file",
                service_dir.display(),
                config.name
            ))),
        }
    }

    /// Discover the build output directory: `bin/Release/<framework-id>`
    /// when that directory has a sole subdirectory, `bin/Release` otherwise
    fn discover_build_output(config: &ServiceConfig, project_dir: &Path) -> PathBuf {
        if let Some(output) = &config.output_path {
            return project_dir.join(output);
        }

        let release = project_dir.join("bin").join("Release");
        let mut subdirs = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&release) {
            for entry in entries.flatten() {
                if entry.path().is_dir() {
                    subdirs.push(entry.path());
                }
            }
        }

        if subdirs.len() == 1 {
            subdirs.remove(0)
        } else {
            release
        }
    }
}

#[async_trait]
impl FrameworkService for DotnetFramework {
    fn requirements(&self) -> FrameworkRequirements {
        // `dotnet publish` restores and builds on its own.
        FrameworkRequirements {
            package: PackageRequirements {
                require_restore: false,
                require_build: false,
                skip_package: false,
            },
        }
    }

    fn required_tools(&self, _project: &ProjectConfig, _config: &ServiceConfig) -> Vec<ToolRef> {
        vec![
            ToolRef::new("dotnet", ".NET SDK")
                .with_install_hint("https://dotnet.microsoft.com/download"),
        ]
    }

    async fn initialize(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
    ) -> Result<()> {
        let service_dir = project.service_path(config);
        let project_file = Self::resolve_project_file(config, &service_dir)?;

        // Prepare the user-secret store so environment outputs have
        // somewhere to land.
        let mut init = ToolCommand::new("dotnet");
        init.args(["user-secrets", "init", "--project"])
            .arg(&project_file);
        if let Err(e) = ctx.runner.run_checked(init, &ctx.cancel, None).await {
            warn!(
                "Could not prepare user secrets for service '{}': {}",
                config.name, e
            );
        }

        // Push environment updates (IaC outputs) into user secrets, with the
        // double-underscore key separator mapped to the dotnet convention.
        let runner = ctx.runner.clone();
        let service_name = config.name.clone();
        ctx.environment.on_update(Arc::new(move |update| {
            let runner = runner.clone();
            let project_file = project_file.clone();
            let service_name = service_name.clone();
            Box::pin(async move {
                for (key, value) in update.values {
                    let secret_key = key.replace("__", ":");
                    debug!(
                        "Pushing secret '{}' for service '{}'",
                        secret_key, service_name
                    );
                    let mut set = ToolCommand::new("dotnet");
                    set.args(["user-secrets", "set", &secret_key, &value, "--project"])
                        .arg(&project_file);
                    runner
                        .run_checked(set, &CancelToken::none(), None)
                        .await
                        .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> {
                            e.to_string().into()
                        })?;
                }
                Ok(())
            })
        }));

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
        let project_file = Self::resolve_project_file(config, &service_dir)?;

        let mut cmd = ToolCommand::new("dotnet");
        cmd.arg("restore").arg(&project_file);
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
        let project_file = Self::resolve_project_file(config, &service_dir)?;

        let mut cmd = ToolCommand::new("dotnet");
        cmd.arg("build")
            .arg(&project_file)
            .args(["--configuration", "Release"]);
        ctx.run_streaming(cmd, progress).await?;

        let project_dir = project_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(service_dir);
        let output = Self::discover_build_output(config, &project_dir);
        Ok(BuildResult {
            artifacts: Artifact::local(ArtifactKind::Directory, output.to_string_lossy())?.into(),
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
        let project_file = Self::resolve_project_file(config, &service_dir)?;

        let publish_root = std::env::temp_dir().join(format!(
            "cloudlift-publish-{}-{}",
            config.name,
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&publish_root)?;
        info!(
            "Publishing service '{}' to {}",
            config.name,
            publish_root.display()
        );

        let mut cmd = ToolCommand::new("dotnet");
        cmd.arg("publish")
            .arg(&project_file)
            .args(["--configuration", "Release", "--output"])
            .arg(&publish_root);

        if let Err(e) = ctx.run_streaming(cmd, progress).await {
            // Do not leave a partial publish root behind
            let _ = std::fs::remove_dir_all(&publish_root);
            return Err(e);
        }

        Ok(PackageResult {
            artifacts: Artifact::local(ArtifactKind::Directory, publish_root.to_string_lossy())?
                .into(),
        })
    }
}
