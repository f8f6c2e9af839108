//! Spring-app target: jar upload and deploy-artifact activation

use super::{TargetService, deploy_result};
use crate::{Error, OperationContext, Result, provider::SpringClient};
use async_trait::async_trait;
use deploy_model::{
    ArtifactKind, DeployResult, ProgressSink, ProjectConfig, ServiceConfig, ServiceContext,
    TargetResource, kind_eq, report,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Deployment name used when the service configures none
const DEFAULT_DEPLOYMENT: &str = "default";

/// Target for spring apps
pub struct SpringAppTarget {
    spring: Arc<dyn SpringClient>,
}

impl SpringAppTarget {
    /// Create the spring-app target
    pub fn new(spring: Arc<dyn SpringClient>) -> Self {
        Self { spring }
    }

    /// Locate the jar to deploy: a packaged `.jar` archive directly, or the
    /// sole `.jar` inside a packaged directory
    fn locate_jar(config: &ServiceConfig, service_ctx: &ServiceContext) -> Result<PathBuf> {
        if let Some(archive) = service_ctx
            .package
            .find_first(kind_eq(ArtifactKind::Archive))
            && archive.location.ends_with(".jar")
        {
            return Ok(PathBuf::from(&archive.location));
        }

        if let Some(directory) = service_ctx
            .package
            .primary_location_by_kind(ArtifactKind::Directory)
        {
            let mut jars = Vec::new();
            if let Ok(entries) = std::fs::read_dir(Path::new(directory)) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) == Some("jar") {
                        jars.push(path);
                    }
                }
            }
            jars.sort();
            if let Some(jar) = jars.into_iter().next() {
                return Ok(jar);
            }
        }

        Err(Error::config(format!(
            "service '{}' produced no jar to deploy",
            config.name
        )))
    }
}

#[async_trait]
impl TargetService for SpringAppTarget {
    fn expected_resource_type(&self) -> Option<&'static str> {
        Some("Microsoft.AppPlatform/Spring")
    }

    async fn deploy(
        &self,
        ctx: &OperationContext,
        _project: &ProjectConfig,
        config: &ServiceConfig,
        service_ctx: &ServiceContext,
        target: &TargetResource,
        progress: &ProgressSink,
    ) -> Result<DeployResult> {
        let jar = Self::locate_jar(config, service_ctx)?;

        report(progress, format!("Uploading {}", jar.display())).await;
        let relative_path = self.spring.upload_artifact(target, &jar, &ctx.cancel).await?;

        let deployment = config
            .spring
            .as_ref()
            .and_then(|s| s.deployment_name.as_deref())
            .unwrap_or(DEFAULT_DEPLOYMENT);

        report(progress, format!("Activating deployment '{}'", deployment)).await;
        self.spring
            .deploy_artifact(target, deployment, &relative_path, &ctx.cancel)
            .await?;

        info!(
            "Deployed service '{}' to spring deployment '{}'",
            config.name, deployment
        );

        let endpoints = self.spring.app_urls(target, &ctx.cancel).await?;
        deploy_result(
            target,
            config.host.key(),
            endpoints,
            Default::default(),
            None,
        )
    }

    async fn endpoints(
        &self,
        ctx: &OperationContext,
        _config: &ServiceConfig,
        target: &TargetResource,
    ) -> Result<Vec<String>> {
        self.spring.app_urls(target, &ctx.cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSpringClient;
    use deploy_model::{Artifact, ServiceHost, ServiceLanguage, SpringOptions, progress_channel};
    use toolchain_exec::CancelToken;
    use toolchain_exec::testing::RecordingRunner;

    fn ctx() -> OperationContext {
        OperationContext::new(
            Arc::new(RecordingRunner::new()),
            crate::EnvironmentManager::ephemeral("dev"),
            CancelToken::none(),
        )
    }

    fn target() -> TargetResource {
        TargetResource::new("sub", "rg", "reports", "Microsoft.AppPlatform/Spring")
    }

    #[smol_potat::test]
    async fn test_deploy_uploads_jar_and_uses_default_deployment() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("reports-1.0.jar");
        std::fs::write(&jar, b"jar").unwrap();

        let spring = Arc::new(FakeSpringClient::new());
        let service = SpringAppTarget::new(spring.clone());

        let project = ProjectConfig::new("store", "/work/store");
        let config = ServiceConfig::new(
            "reports",
            "src/reports",
            ServiceLanguage::Java,
            ServiceHost::SpringApp,
        );
        let mut service_ctx = ServiceContext::new();
        service_ctx.package.push(
            Artifact::local(ArtifactKind::Archive, jar.to_string_lossy()).unwrap(),
        );

        let (progress, _rx) = progress_channel();
        service
            .deploy(&ctx(), &project, &config, &service_ctx, &target(), &progress)
            .await
            .unwrap();

        let deployments = spring.deployments();
        assert_eq!(deployments.len(), 1);
        assert_eq!(deployments[0].0, "default");
    }

    #[smol_potat::test]
    async fn test_deploy_finds_jar_in_package_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.jar"), b"jar").unwrap();

        let spring = Arc::new(FakeSpringClient::new());
        let service = SpringAppTarget::new(spring.clone());

        let project = ProjectConfig::new("store", "/work/store");
        let mut config = ServiceConfig::new(
            "reports",
            "src/reports",
            ServiceLanguage::Java,
            ServiceHost::SpringApp,
        );
        config.spring = Some(SpringOptions {
            deployment_name: Some("staging".to_string()),
        });

        let mut service_ctx = ServiceContext::new();
        service_ctx.package.push(
            Artifact::local(ArtifactKind::Directory, dir.path().to_string_lossy()).unwrap(),
        );

        let (progress, _rx) = progress_channel();
        service
            .deploy(&ctx(), &project, &config, &service_ctx, &target(), &progress)
            .await
            .unwrap();

        let uploads = spring.uploads();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].ends_with("app.jar"));
        assert_eq!(spring.deployments()[0].0, "staging");
    }

    #[smol_potat::test]
    async fn test_missing_jar_is_a_config_error() {
        let spring = Arc::new(FakeSpringClient::new());
        let service = SpringAppTarget::new(spring);

        let project = ProjectConfig::new("store", "/work/store");
        let config = ServiceConfig::new(
            "reports",
            "src/reports",
            ServiceLanguage::Java,
            ServiceHost::SpringApp,
        );

        let (progress, _rx) = progress_channel();
        let err = service
            .deploy(
                &ctx(),
                &project,
                &config,
                &ServiceContext::new(),
                &target(),
                &progress,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
