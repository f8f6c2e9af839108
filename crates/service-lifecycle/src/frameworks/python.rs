//! Python framework: virtual-env driven services

use super::FrameworkService;
use crate::{OperationContext, Result, packaging::copy_package_dir};
use async_trait::async_trait;
use deploy_model::{
    Artifact, ArtifactKind, BuildResult, FrameworkRequirements, PackageRequirements,
    PackageResult, ProgressSink, ProjectConfig, RestoreResult, ServiceConfig, ServiceContext,
    ToolRef,
};
use std::path::{Path, PathBuf};
use toolchain_exec::ToolCommand;
use tracing::{debug, info};

/// Framework for Python services
#[derive(Debug, Default)]
pub struct PythonFramework;

impl PythonFramework {
    /// Create the python framework
    pub fn new() -> Self {
        Self
    }

    /// The service's virtual-env directory: `<dir>/<basename>_env`
    pub fn venv_dir(service_dir: &Path) -> PathBuf {
        let basename = service_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "service".to_string());
        service_dir.join(format!("{}_env", basename))
    }

    fn output_dir(project: &ProjectConfig, config: &ServiceConfig) -> PathBuf {
        let service_dir = project.service_path(config);
        match &config.output_path {
            Some(output) => service_dir.join(output),
            None => service_dir,
        }
    }
}

/// Whether a directory is a python virtual environment
fn is_venv_dir(dir: &Path) -> bool {
    dir.join("pyvenv.cfg").is_file()
}

#[async_trait]
impl FrameworkService for PythonFramework {
    fn requirements(&self) -> FrameworkRequirements {
        FrameworkRequirements {
            package: PackageRequirements {
                require_restore: true,
                require_build: false,
                skip_package: false,
            },
        }
    }

    fn required_tools(&self, _project: &ProjectConfig, _config: &ServiceConfig) -> Vec<ToolRef> {
        vec![ToolRef::new("python3", "Python").with_install_hint("https://www.python.org/")]
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
        let venv = Self::venv_dir(&service_dir);

        if !is_venv_dir(&venv) {
            info!(
                "Creating virtual environment for service '{}' at {}",
                config.name,
                venv.display()
            );
            let mut create = ToolCommand::new("python3");
            create
                .args(["-m", "venv"])
                .arg(venv.file_name().unwrap_or_default())
                .current_dir(&service_dir);
            ctx.run_streaming(create, progress).await?;
        }

        if service_dir.join("requirements.txt").is_file() {
            debug!("Installing requirements for service '{}'", config.name);
            let mut install = ToolCommand::new(venv.join("bin").join("python"));
            install
                .args(["-m", "pip", "install", "-r", "requirements.txt"])
                .current_dir(&service_dir);
            ctx.run_streaming(install, progress).await?;
        }

        Ok(RestoreResult::default())
    }

    async fn build(
        &self,
        _ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        _progress: &ProgressSink,
    ) -> Result<BuildResult> {
        // Python has no build step; the source tree is the build output.
        let output = Self::output_dir(project, config);
        Ok(BuildResult {
            artifacts: Artifact::local(ArtifactKind::Directory, output.to_string_lossy())?.into(),
        })
    }

    async fn package(
        &self,
        _ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        _progress: &ProgressSink,
    ) -> Result<PackageResult> {
        let source = Self::output_dir(project, config);
        let staging = std::env::temp_dir().join(format!(
            "cloudlift-pkg-{}-{}",
            config.name,
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&staging)?;

        copy_package_dir(&source, &staging, &["__pycache__/"], &is_venv_dir)?;

        Ok(PackageResult {
            artifacts: Artifact::local(ArtifactKind::Directory, staging.to_string_lossy())?
                .into(),
        })
    }
}
