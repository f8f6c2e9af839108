//! Node framework: npm/pnpm/yarn driven services

use super::FrameworkService;
use crate::{Error, OperationContext, Result, packaging::copy_package_dir};
use async_trait::async_trait;
use deploy_model::{
    Artifact, ArtifactKind, BuildResult, FrameworkRequirements, PackageRequirements,
    PackageResult, ProgressSink, ProjectConfig, RestoreResult, ServiceConfig, ServiceContext,
    ToolRef,
};
use std::path::Path;
use toolchain_exec::ToolCommand;
use tracing::{debug, info};

/// The package manager driving a node service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    /// npm (the default)
    Npm,
    /// pnpm
    Pnpm,
    /// yarn
    Yarn,
}

impl PackageManager {
    /// The binary name
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Yarn => "yarn",
        }
    }

    fn install_args(&self) -> &'static [&'static str] {
        match self {
            PackageManager::Npm => &["install", "--no-audit", "--no-fund", "--prefer-offline"],
            PackageManager::Pnpm => &["install", "--prefer-offline"],
            PackageManager::Yarn => &["install"],
        }
    }

    fn build_args(&self) -> &'static [&'static str] {
        match self {
            // yarn has no --if-present
            PackageManager::Yarn => &["run", "build"],
            _ => &["run", "build", "--if-present"],
        }
    }
}

/// Framework for JavaScript and TypeScript services
#[derive(Debug, Default)]
pub struct NodeFramework;

impl NodeFramework {
    /// Create the node framework
    pub fn new() -> Self {
        Self
    }

    /// Resolve the package manager: explicit config override first, then
    /// lock-file sniffing, then npm
    pub fn resolve_package_manager(
        config: &ServiceConfig,
        service_dir: &Path,
    ) -> Result<PackageManager> {
        if let Some(value) = config.config_value("packageManager") {
            return match value {
                "npm" => Ok(PackageManager::Npm),
                "pnpm" => Ok(PackageManager::Pnpm),
                "yarn" => Ok(PackageManager::Yarn),
                other => Err(Error::config(format!(
                    "invalid packageManager config value '{}' for service '{}' (expected npm, pnpm or yarn)",
                    other, config.name
                ))),
            };
        }

        if service_dir.join("package-lock.json").is_file() {
            Ok(PackageManager::Npm)
        } else if service_dir.join("pnpm-lock.yaml").is_file() {
            Ok(PackageManager::Pnpm)
        } else if service_dir.join("yarn.lock").is_file() {
            Ok(PackageManager::Yarn)
        } else {
            Ok(PackageManager::Npm)
        }
    }

    fn output_dir(project: &ProjectConfig, config: &ServiceConfig) -> std::path::PathBuf {
        let service_dir = project.service_path(config);
        match &config.output_path {
            Some(output) => service_dir.join(output),
            None => service_dir,
        }
    }
}

#[async_trait]
impl FrameworkService for NodeFramework {
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
        let manager = Self::resolve_package_manager(config, &service_dir)
            .unwrap_or(PackageManager::Npm);
        vec![
            ToolRef::new(manager.as_str(), manager.as_str())
                .with_install_hint("https://nodejs.org/"),
        ]
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
        let manager = Self::resolve_package_manager(config, &service_dir)?;
        info!(
            "Restoring node service '{}' with {}",
            config.name,
            manager.as_str()
        );

        let mut cmd = ToolCommand::new(manager.as_str());
        cmd.args(manager.install_args()).current_dir(&service_dir);
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
        let manager = Self::resolve_package_manager(config, &service_dir)?;

        let mut cmd = ToolCommand::new(manager.as_str());
        cmd.args(manager.build_args()).current_dir(&service_dir);
        ctx.run_streaming(cmd, progress).await?;

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

        debug!(
            "Staging node package for '{}' in {}",
            config.name,
            staging.display()
        );
        copy_package_dir(&source, &staging, &["node_modules/"], &|_| false)?;

        Ok(PackageResult {
            artifacts: Artifact::local(ArtifactKind::Directory, staging.to_string_lossy())?
                .into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deploy_model::{ServiceHost, ServiceLanguage, progress_channel};
    use std::sync::Arc;
    use toolchain_exec::testing::RecordingRunner;
    use toolchain_exec::CancelToken;

    fn project_with_service(config_values: &[(&str, &str)]) -> (tempfile::TempDir, ProjectConfig) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/api")).unwrap();

        let mut project = ProjectConfig::new("store", dir.path());
        let mut service = ServiceConfig::new(
            "api",
            "src/api",
            ServiceLanguage::TypeScript,
            ServiceHost::AppService,
        );
        for (key, value) in config_values {
            service.config.insert(key.to_string(), value.to_string());
        }
        project.add_service(service);
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
    async fn test_restore_defaults_to_npm_with_offline_flags() {
        let (_dir, project) = project_with_service(&[]);
        let config = project.services["api"].clone();
        let runner = Arc::new(RecordingRunner::new());
        let ctx = ctx_with(runner.clone());
        let (progress, _rx) = progress_channel();

        NodeFramework::new()
            .restore(&ctx, &project, &config, &ServiceContext::new(), &progress)
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "npm");
        assert_eq!(
            calls[0].args,
            vec!["install", "--no-audit", "--no-fund", "--prefer-offline"]
        );
        assert_eq!(
            calls[0].cwd.as_deref(),
            Some(project.service_path(&config).as_path())
        );
    }

    #[smol_potat::test]
    async fn test_package_manager_override_beats_lock_file() {
        let (dir, project) = project_with_service(&[("packageManager", "pnpm")]);
        // A package-lock.json would normally sniff npm
        std::fs::write(dir.path().join("src/api/package-lock.json"), "{}").unwrap();

        let config = project.services["api"].clone();
        let runner = Arc::new(RecordingRunner::new());
        let ctx = ctx_with(runner.clone());
        let (progress, _rx) = progress_channel();

        NodeFramework::new()
            .restore(&ctx, &project, &config, &ServiceContext::new(), &progress)
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].program, "pnpm");
        assert_eq!(calls[0].args, vec!["install", "--prefer-offline"]);
    }

    #[smol_potat::test]
    async fn test_invalid_package_manager_value_is_rejected() {
        let (_dir, project) = project_with_service(&[("packageManager", "bun")]);
        let config = project.services["api"].clone();
        let runner = Arc::new(RecordingRunner::new());
        let ctx = ctx_with(runner.clone());
        let (progress, _rx) = progress_channel();

        let err = NodeFramework::new()
            .restore(&ctx, &project, &config, &ServiceContext::new(), &progress)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("invalid packageManager config value"));
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn test_lock_file_sniffing() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::new(
            "api",
            ".",
            ServiceLanguage::JavaScript,
            ServiceHost::AppService,
        );

        assert_eq!(
            NodeFramework::resolve_package_manager(&config, dir.path()).unwrap(),
            PackageManager::Npm
        );

        std::fs::write(dir.path().join("yarn.lock"), "").unwrap();
        assert_eq!(
            NodeFramework::resolve_package_manager(&config, dir.path()).unwrap(),
            PackageManager::Yarn
        );

        std::fs::write(dir.path().join("pnpm-lock.yaml"), "").unwrap();
        assert_eq!(
            NodeFramework::resolve_package_manager(&config, dir.path()).unwrap(),
            PackageManager::Pnpm
        );

        std::fs::write(dir.path().join("package-lock.json"), "{}").unwrap();
        assert_eq!(
            NodeFramework::resolve_package_manager(&config, dir.path()).unwrap(),
            PackageManager::Npm
        );
    }

    #[smol_potat::test]
    async fn test_yarn_build_omits_if_present() {
        let (_dir, project) = project_with_service(&[("packageManager", "yarn")]);
        let config = project.services["api"].clone();
        let runner = Arc::new(RecordingRunner::new());
        let ctx = ctx_with(runner.clone());
        let (progress, _rx) = progress_channel();

        NodeFramework::new()
            .build(&ctx, &project, &config, &ServiceContext::new(), &progress)
            .await
            .unwrap();

        assert_eq!(runner.calls()[0].args, vec!["run", "build"]);
    }
}
